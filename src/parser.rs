//! Schema-driven frame parsing and canonical formatting
//!
//! Parsing is a pure function of `(schema, line)`. A line is rejected only
//! when it is shorter than the schema's required columns; a single bad field
//! never rejects the line, it just becomes the type's zero value.
//!
//! ```rust
//! use groundlink::parser;
//! use groundlink::types::{Column, ColumnType, Schema};
//!
//! let schema = Schema::new(
//!     vec![
//!         Column::new("TEAM", "team", ColumnType::Int),
//!         Column::new("SEQ", "seq", ColumnType::Int),
//!         Column::new("ALT", "alt", ColumnType::Float),
//!     ],
//!     "seq",
//!     ',',
//! )
//! .unwrap();
//!
//! let frame = parser::parse(&schema, "1, 2, 10.456").unwrap();
//! assert_eq!(frame.sequence, 2);
//! assert_eq!(frame.canonical, "1,2,10.46");
//! ```

use std::sync::Arc;

use crate::RejectReason;
use crate::types::{ColumnType, Field, Schema, Value};

/// Output of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    /// One field per non-skip column, in schema order
    pub fields: Vec<Field>,
    /// Normalized re-serialization; this is what gets persisted
    pub canonical: String,
    /// Value of the schema's sequence column
    pub sequence: i64,
}

/// Parse one raw line against the schema.
pub fn parse(schema: &Schema, raw: &str) -> Result<ParsedFrame, RejectReason> {
    let parts: Vec<&str> = raw.split(schema.delimiter()).collect();
    let required = schema.min_required();
    if parts.len() < required {
        return Err(RejectReason::TooShort { found: parts.len(), required });
    }

    let mut fields = Vec::with_capacity(schema.columns().len());
    let mut canonical = String::with_capacity(raw.len() + 8);
    let mut sequence = 0;

    for (index, column) in schema.columns().iter().enumerate() {
        if index > 0 {
            canonical.push(schema.delimiter());
        }

        // Short lines leave trailing optional columns empty
        let text = parts.get(index).copied().unwrap_or("");
        let Some(value) = Value::coerce(text, column.kind) else {
            debug_assert_eq!(column.kind, ColumnType::Skip);
            continue;
        };

        canonical.push_str(&value.canonical(column));
        if index == schema.sequence_index() {
            sequence = value.as_int().unwrap_or(0);
        }
        fields.push(Field { key: column.key.clone(), value });
    }

    Ok(ParsedFrame { fields, canonical, sequence })
}

/// Re-serialize typed fields with the schema's fixed-precision rules.
///
/// Columns missing from `fields` (and skip columns) are written empty.
pub fn format_canonical(schema: &Schema, fields: &[Field]) -> String {
    let mut line = String::new();
    for (index, column) in schema.columns().iter().enumerate() {
        if index > 0 {
            line.push(schema.delimiter());
        }
        if column.kind == ColumnType::Skip {
            continue;
        }
        if let Some(field) = fields.iter().find(|f| f.key == column.key) {
            line.push_str(&field.value.canonical(column));
        }
    }
    line
}

/// Parser bound to one shared schema.
#[derive(Debug, Clone)]
pub struct FrameParser {
    schema: Arc<Schema>,
}

impl FrameParser {
    /// Create a parser for the given schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Parse one raw line.
    pub fn parse(&self, raw: &str) -> Result<ParsedFrame, RejectReason> {
        parse(&self.schema, raw)
    }

    /// The schema this parser uses.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scenario_schema;
    use crate::types::Column;
    use proptest::prelude::*;

    #[test]
    fn short_line_is_rejected() {
        let schema = scenario_schema();
        assert_eq!(parse(&schema, "1,1"), Err(RejectReason::TooShort { found: 2, required: 3 }));
    }

    #[test]
    fn bad_fields_default_to_zero() {
        let schema = scenario_schema();
        let frame = parse(&schema, "x,,abc").unwrap();
        assert_eq!(frame.fields[0].value, Value::Int(0));
        assert_eq!(frame.fields[1].value, Value::Int(0));
        assert_eq!(frame.fields[2].value, Value::Float(0.0));
        assert_eq!(frame.sequence, 0);
        assert_eq!(frame.canonical, "0,0,0.00");
    }

    #[test]
    fn extra_fields_are_ignored() {
        let schema = scenario_schema();
        let frame = parse(&schema, "1,2,3.0,extra,more").unwrap();
        assert_eq!(frame.fields.len(), 3);
        assert_eq!(frame.canonical, "1,2,3.00");
    }

    #[test]
    fn skip_and_optional_columns() {
        let schema = Schema::new(
            vec![
                Column::new("SEQ", "seq", ColumnType::Int),
                Column::new("RAW", "raw", ColumnType::Skip),
                Column::new("LAT", "gps_lat", ColumnType::Float),
                Column::optional("P", "pressure", ColumnType::Float),
            ],
            "seq",
            ',',
        )
        .unwrap();

        let frame = parse(&schema, "5,garbage,13.75").unwrap();
        assert_eq!(frame.fields.len(), 3);
        assert!(frame.fields.iter().all(|f| f.key != "raw"));
        assert_eq!(frame.canonical, "5,,13.75000,0.000");
    }

    #[test]
    fn flight_line_parses() {
        let schema = Schema::flight();
        let line = "1043,00:01:05,65,F,ASCENT,120.456,24.1,99.876543,8.31,0.42,1.0,2.0,3.0,0.1,0.2,9.81,12:00:05,121.0,13.756331,100.501765,9,CXON";
        let frame = parse(&schema, line).unwrap();
        assert_eq!(frame.sequence, 65);
        assert_eq!(frame.fields.len(), 23);
        assert!(frame.canonical.contains(",120.46,"));
        assert!(frame.canonical.contains(",99.877,"));
        assert!(frame.canonical.contains(",13.75633,100.50177,"));
        assert!(frame.canonical.ends_with(",CXON,0.00"));
    }

    #[test]
    fn format_matches_parse_output() {
        let schema = Schema::flight();
        let line = "1043,00:00:01,1,S,LAUNCH_PAD,0.5,25,101.3,8.4,0.3,0,0,0,0,0,0,12:00:00,0,13.7,100.5,8,CXON,90";
        let frame = parse(&schema, line).unwrap();
        assert_eq!(format_canonical(&schema, &frame.fields), frame.canonical);
    }

    #[test]
    fn parser_is_pure() {
        let parser = FrameParser::new(Arc::new(scenario_schema()));
        let a = parser.parse("1,5,50.0").unwrap();
        let b = parser.parse("1,5,50.0").unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn never_rejects_long_enough_lines(fields in prop::collection::vec("[^,\r\n]{0,12}", 3..8)) {
            let schema = scenario_schema();
            let line = fields.join(",");
            let frame = parse(&schema, &line).unwrap();
            prop_assert_eq!(frame.fields.len(), 3);

            for (text, field) in fields.iter().zip(frame.fields.iter()) {
                match &field.value {
                    Value::Int(v) => {
                        let expected = text.trim().parse::<i64>().unwrap_or(0);
                        prop_assert_eq!(*v, expected);
                    }
                    Value::Float(v) => {
                        let expected = text.trim().parse::<f64>().ok().filter(|f| f.is_finite()).unwrap_or(0.0);
                        prop_assert_eq!(*v, expected);
                    }
                    Value::Text(_) => prop_assert!(false, "scenario schema has no text columns"),
                }
            }
        }

        #[test]
        fn canonical_is_idempotent(
            team in any::<i32>(),
            seq in any::<i64>(),
            alt in -1.0e9f64..1.0e9f64,
            state in "[A-Z_]{0,10}",
        ) {
            let schema = Schema::new(
                vec![
                    Column::new("TEAM", "team", ColumnType::Int),
                    Column::new("SEQ", "seq", ColumnType::Int),
                    Column::new("ALT", "alt", ColumnType::Float),
                    Column::new("LAT", "gps_lat", ColumnType::Float),
                    Column::new("STATE", "state", ColumnType::String),
                    Column::optional("P", "pressure", ColumnType::Float),
                ],
                "seq",
                ',',
            )
            .unwrap();
            let line = format!("{},{},{},{},{}", team, seq, alt, alt / 7.0, state);
            let first = parse(&schema, &line).unwrap();
            let second = parse(&schema, &first.canonical).unwrap();
            prop_assert_eq!(&first.canonical, &second.canonical);
        }

        #[test]
        fn too_short_counts_fields(fields in prop::collection::vec("[0-9]{0,3}", 1..3)) {
            let schema = scenario_schema();
            let line = fields.join(",");
            let rejected = parse(&schema, &line);
            prop_assert_eq!(rejected, Err(RejectReason::TooShort { found: fields.len(), required: 3 }));
        }
    }
}
