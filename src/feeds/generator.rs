//! Procedural generator: synthesizes flight telemetry without hardware

use chrono::Utc;
use rand::prelude::*;
use std::f64::consts::PI;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::trace;

use crate::Result;
use crate::feed::{Feed, FeedAction, FeedKind};

/// Apogee of the synthetic trajectory, metres.
const PEAK_ALTITUDE_M: f64 = 700.0;

/// Length of one synthetic flight, seconds.
const FLIGHT_PERIOD_S: f64 = 240.0;

/// Below this altitude the vehicle is reported on the pad.
const PAD_THRESHOLD_M: f64 = 5.0;

const SEA_LEVEL_KPA: f64 = 101.325;
const BASE_LATITUDE: f64 = 13.7563;
const BASE_LONGITUDE: f64 = 100.5018;

/// Standard-atmosphere pressure at `altitude_m`, in kPa.
pub fn barometric_pressure_kpa(altitude_m: f64) -> f64 {
    SEA_LEVEL_KPA * (1.0 - 2.25577e-5 * altitude_m).powf(5.25588)
}

/// Flight state by altitude and direction of travel.
pub fn classify_state(altitude_m: f64, previous_m: f64) -> &'static str {
    if altitude_m < PAD_THRESHOLD_M {
        "LAUNCH_PAD"
    } else if altitude_m >= previous_m {
        "ASCENT"
    } else {
        "DESCENT"
    }
}

/// `hh:mm:ss` elapsed mission time.
fn mission_time(seconds: u64) -> String {
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

/// Generator feed producing one line per period in the flight schema layout.
pub struct GeneratorFeed {
    team_id: u16,
    rng: StdRng,
    period: Duration,
    interval: Option<Interval>,
    packet_count: u64,
    previous_altitude: f64,
}

impl GeneratorFeed {
    /// Create a generator. A fixed seed makes the jitter reproducible.
    pub fn new(team_id: u16, period: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { team_id, rng, period, interval: None, packet_count: 0, previous_altitude: 0.0 }
    }

    /// Packets generated so far
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Build the next line and advance the counters.
    pub fn next_line(&mut self) -> String {
        self.packet_count += 1;
        let count = self.packet_count;
        let t = count as f64;

        let trajectory = (PEAK_ALTITUDE_M * (2.0 * PI * t / FLIGHT_PERIOD_S).sin()).max(0.0);
        let altitude = (trajectory + self.rng.gen_range(-0.5..=0.5)).max(0.0);
        let pressure = barometric_pressure_kpa(altitude);
        let temperature = 25.0 - 0.0065 * altitude;
        let voltage = (8.4 - 0.001 * t).max(6.0);
        let current = 0.2 + self.rng.gen_range(0.0..0.1);
        let state = classify_state(altitude, self.previous_altitude);
        self.previous_altitude = altitude;

        let gyro: [f64; 3] = std::array::from_fn(|_| self.rng.gen_range(-2.0..=2.0));
        let accel: [f64; 3] = std::array::from_fn(|_| self.rng.gen_range(-0.5..=0.5));
        let lat = BASE_LATITUDE + self.rng.gen_range(-0.0005..=0.0005);
        let lon = BASE_LONGITUDE + self.rng.gen_range(-0.0005..=0.0005);
        let sats: u8 = self.rng.gen_range(8..=12);
        let heading = self.rng.gen_range(0.0..360.0);

        format!(
            "{:04},{},{},S,{},{:.2},{:.2},{:.3},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{},{:.2},{:.5},{:.5},{},CXON,{:.2}",
            self.team_id,
            mission_time(count),
            count,
            state,
            altitude,
            temperature,
            pressure,
            voltage,
            current,
            gyro[0],
            gyro[1],
            gyro[2],
            accel[0],
            accel[1],
            accel[2],
            Utc::now().format("%H:%M:%S"),
            altitude,
            lat,
            lon,
            sats,
            heading,
        )
    }
}

#[async_trait::async_trait]
impl Feed for GeneratorFeed {
    async fn next_action(&mut self) -> Result<Option<FeedAction>> {
        let period = self.period;
        let ticker = self.interval.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ticker.tick().await;

        let line = self.next_line();
        trace!(packet = self.packet_count, "Generated line");
        Ok(Some(FeedAction::Downlink(line)))
    }

    fn kind(&self) -> FeedKind {
        FeedKind::Generator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::types::Schema;

    #[test]
    fn pressure_follows_standard_atmosphere() {
        assert!((barometric_pressure_kpa(0.0) - 101.325).abs() < 1e-9);
        let at_1km = barometric_pressure_kpa(1000.0);
        assert!((at_1km - 89.87).abs() < 0.05, "got {at_1km}");
        assert!(barometric_pressure_kpa(500.0) > at_1km);
    }

    #[test]
    fn state_classification() {
        assert_eq!(classify_state(1.0, 0.0), "LAUNCH_PAD");
        assert_eq!(classify_state(100.0, 50.0), "ASCENT");
        assert_eq!(classify_state(100.0, 150.0), "DESCENT");
    }

    #[test]
    fn mission_time_format() {
        assert_eq!(mission_time(0), "00:00:00");
        assert_eq!(mission_time(3725), "01:02:05");
    }

    #[test]
    fn lines_fit_the_flight_schema() {
        let schema = Schema::flight();
        let mut feed = GeneratorFeed::new(1043, Duration::from_secs(1), Some(7));

        for expected in 1..=5i64 {
            let line = feed.next_line();
            let parsed = parse(&schema, &line).expect("generated line must parse");
            assert_eq!(parsed.sequence, expected);
            assert_eq!(parsed.canonical, line, "generated lines are already canonical");
            assert_eq!(parsed.fields.len(), schema.columns().len());
        }
        assert_eq!(feed.packet_count(), 5);
    }

    #[test]
    fn trajectory_climbs_then_falls() {
        let mut feed = GeneratorFeed::new(1, Duration::from_secs(1), Some(42));
        let schema = Schema::flight();
        let states: Vec<String> = (0..200)
            .map(|_| {
                let parsed = parse(&schema, &feed.next_line()).unwrap();
                parsed.fields[4].value.as_text().unwrap_or_default().to_string()
            })
            .collect();

        assert_eq!(states[10], "ASCENT");
        assert_eq!(states[90], "DESCENT");
        assert!(states[150..].iter().all(|s| s == "LAUNCH_PAD"));
    }

    #[test]
    fn seeded_generators_agree_on_jitter() {
        let mut a = GeneratorFeed::new(1043, Duration::from_secs(1), Some(9));
        let mut b = GeneratorFeed::new(1043, Duration::from_secs(1), Some(9));
        let strip_gps_time = |line: String| {
            let mut parts: Vec<String> = line.split(',').map(str::to_string).collect();
            parts[16].clear();
            parts.join(",")
        };
        assert_eq!(strip_gps_time(a.next_line()), strip_gps_time(b.next_line()));
    }
}
