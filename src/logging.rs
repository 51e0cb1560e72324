//! Tracing subscriber setup for binaries and tests.
//!
//! The library only emits `tracing` events; it never installs a subscriber on
//! its own. Hosts call one of these once at startup.

use tracing::Level;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::builder().with_default_directive(Level::INFO.into()).from_env_lossy();
    let _ = Registry::default().with(filter).with(fmt::layer()).try_init();
}

/// Install a fmt subscriber with an explicit filter directive
/// (e.g. `"groundlink=debug"`), ignoring `RUST_LOG`.
pub fn init_with_directive(directive: &str) {
    let filter = EnvFilter::new(directive);
    let _ = Registry::default().with(filter).with(fmt::layer().with_target(true)).try_init();
}
