//! Typed field values

use serde::Serialize;

use super::{Column, ColumnType};

/// Typed value of one parsed column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Coerce trimmed wire text to the column's type.
    ///
    /// Empty or unparsable numbers become zero; non-finite floats count as
    /// unparsable. Returns `None` for skip columns.
    pub fn coerce(text: &str, kind: ColumnType) -> Option<Self> {
        let text = text.trim();
        match kind {
            ColumnType::Int => Some(Value::Int(text.parse::<i64>().unwrap_or(0))),
            ColumnType::Float => {
                let value = text.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0);
                Some(Value::Float(value))
            }
            ColumnType::String => Some(Value::Text(text.to_string())),
            ColumnType::Skip => None,
        }
    }

    /// Integer view, if this is an int.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view, if this is a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view, if this is a string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical wire text for this value in the given column.
    pub fn canonical(&self, column: &Column) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format!("{:.*}", column.float_precision(), v),
            Value::Text(v) => v.clone(),
        }
    }
}

/// A keyed value inside a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_numbers_become_zero() {
        assert_eq!(Value::coerce("abc", ColumnType::Int), Some(Value::Int(0)));
        assert_eq!(Value::coerce("", ColumnType::Int), Some(Value::Int(0)));
        assert_eq!(Value::coerce("1.5", ColumnType::Int), Some(Value::Int(0)));
        assert_eq!(Value::coerce("x", ColumnType::Float), Some(Value::Float(0.0)));
        assert_eq!(Value::coerce("NaN", ColumnType::Float), Some(Value::Float(0.0)));
        assert_eq!(Value::coerce("inf", ColumnType::Float), Some(Value::Float(0.0)));
    }

    #[test]
    fn values_are_trimmed() {
        assert_eq!(Value::coerce(" 42 ", ColumnType::Int), Some(Value::Int(42)));
        assert_eq!(Value::coerce(" -1.25", ColumnType::Float), Some(Value::Float(-1.25)));
        assert_eq!(Value::coerce("  ASCENT ", ColumnType::String), Some(Value::Text("ASCENT".into())));
        assert_eq!(Value::coerce("whatever", ColumnType::Skip), None);
    }

    #[test]
    fn canonical_precision() {
        let lat = Column::new("LAT", "gps_lat", ColumnType::Float);
        let pressure = Column::new("P", "pressure_kpa", ColumnType::Float);
        let alt = Column::new("A", "altitude_m", ColumnType::Float);
        assert_eq!(Value::Float(13.7).canonical(&lat), "13.70000");
        assert_eq!(Value::Float(101.325).canonical(&pressure), "101.325");
        assert_eq!(Value::Float(10.0).canonical(&alt), "10.00");
        assert_eq!(Value::Int(-7).canonical(&alt), "-7");
    }
}
