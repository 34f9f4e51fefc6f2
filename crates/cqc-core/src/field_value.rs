//! Typed driver field values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data type of a driver field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Card,
    Int,
    Float,
    String,
}

impl FieldType {
    /// Does this type support ordered numeric comparison
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Card | FieldType::Int | FieldType::Float)
    }
}

/// The current value of a driver field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Card(u64),
    Int(i64),
    Float(f64),
    String(String),
}

impl FieldValue {
    /// The type of this value
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Card(_) => FieldType::Card,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::String(_) => FieldType::String,
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Card(v) => Some(*v as f64),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Boolean(_) | FieldValue::String(_) => None,
        }
    }

    /// Boolean view of the value, if it has one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The default value for a field of the given type
    pub fn default_for(ty: FieldType) -> Self {
        match ty {
            FieldType::Boolean => FieldValue::Boolean(false),
            FieldType::Card => FieldValue::Card(0),
            FieldType::Int => FieldValue::Int(0),
            FieldType::Float => FieldValue::Float(0.0),
            FieldType::String => FieldValue::String(String::new()),
        }
    }

    /// Parse a formatted value as the given type
    pub fn parse_as(ty: FieldType, text: &str) -> Option<Self> {
        let text = text.trim();
        match ty {
            FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(FieldValue::Boolean(true)),
                "false" | "0" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
            FieldType::Card => text.parse().ok().map(FieldValue::Card),
            FieldType::Int => text.parse().ok().map(FieldValue::Int),
            FieldType::Float => text.parse().ok().map(FieldValue::Float),
            FieldType::String => Some(FieldValue::String(text.to_string())),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(true) => f.write_str("True"),
            FieldValue::Boolean(false) => f.write_str("False"),
            FieldValue::Card(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Boolean(true).to_string(), "True");
        assert_eq!(FieldValue::Card(12).to_string(), "12");
        assert_eq!(FieldValue::Int(-3).to_string(), "-3");
        assert_eq!(FieldValue::from("idle").to_string(), "idle");
    }

    #[test]
    fn test_untagged_deserialize() {
        let v: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, FieldValue::Boolean(true));
        let v: FieldValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, FieldValue::Card(42));
        let v: FieldValue = serde_json::from_str("-42").unwrap();
        assert_eq!(v, FieldValue::Int(-42));
        let v: FieldValue = serde_json::from_str("71.5").unwrap();
        assert_eq!(v, FieldValue::Float(71.5));
        let v: FieldValue = serde_json::from_str(r#""on""#).unwrap();
        assert_eq!(v, FieldValue::from("on"));
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(
            FieldValue::parse_as(FieldType::Boolean, "True"),
            Some(FieldValue::Boolean(true))
        );
        assert_eq!(FieldValue::parse_as(FieldType::Card, "-1"), None);
        assert_eq!(
            FieldValue::parse_as(FieldType::Int, " -1 "),
            Some(FieldValue::Int(-1))
        );
        assert!(FieldType::Float.is_numeric());
        assert!(!FieldType::String.is_numeric());
    }
}
