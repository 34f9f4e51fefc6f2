//! Field path type representing a moniker.field pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid field paths
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldPathError {
    #[error("field path must be of the form 'moniker.field'")]
    MissingSeparator,

    #[error("moniker cannot be empty")]
    EmptyMoniker,

    #[error("field name cannot be empty")]
    EmptyField,
}

/// A driver field address (e.g. "LivingRoomLight.Switch")
///
/// The moniker is everything before the first `.`; the field name is the
/// remainder, which may itself contain dots (V2 field names such as
/// `LGT#Kitchen` or `Light.Kitchen` are passed through untouched).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    moniker: String,
    field: String,
}

impl FieldPath {
    /// Create a new FieldPath from moniker and field parts
    pub fn new(
        moniker: impl Into<String>,
        field: impl Into<String>,
    ) -> Result<Self, FieldPathError> {
        let moniker = moniker.into();
        let field = field.into();

        if moniker.is_empty() {
            return Err(FieldPathError::EmptyMoniker);
        }
        if field.is_empty() {
            return Err(FieldPathError::EmptyField);
        }

        Ok(Self { moniker, field })
    }

    /// Driver moniker
    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    /// Field name
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (moniker, field) = s.split_once('.').ok_or(FieldPathError::MissingSeparator)?;
        Self::new(moniker, field)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = FieldPathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> String {
        path.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.moniker, self.field)
    }
}

/// Moniker portion of a source path (everything before the first `.`)
///
/// A bare moniker is returned unchanged.
pub fn moniker_of(source: &str) -> &str {
    source.split_once('.').map_or(source, |(moniker, _)| moniker)
}

/// Field portion of a source path, if it has one
pub fn field_of(source: &str) -> Option<&str> {
    source.split_once('.').map(|(_, field)| field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_field_path() {
        let path = FieldPath::new("Thermo", "CurTemp").unwrap();
        assert_eq!(path.moniker(), "Thermo");
        assert_eq!(path.field(), "CurTemp");
        assert_eq!(path.to_string(), "Thermo.CurTemp");
    }

    #[test]
    fn test_parse_splits_on_first_dot() {
        let path: FieldPath = "Lights.LGT#Kitchen.Main".parse().unwrap();
        assert_eq!(path.moniker(), "Lights");
        assert_eq!(path.field(), "LGT#Kitchen.Main");
    }

    #[test]
    fn test_invalid_paths() {
        assert_eq!(
            "NoSeparator".parse::<FieldPath>().unwrap_err(),
            FieldPathError::MissingSeparator
        );
        assert_eq!(
            ".Field".parse::<FieldPath>().unwrap_err(),
            FieldPathError::EmptyMoniker
        );
        assert_eq!(
            "Moniker.".parse::<FieldPath>().unwrap_err(),
            FieldPathError::EmptyField
        );
    }

    #[test]
    fn test_moniker_and_field_of() {
        assert_eq!(moniker_of("LivingRoomLight.Switch"), "LivingRoomLight");
        assert_eq!(moniker_of("LivingRoomLight"), "LivingRoomLight");
        assert_eq!(field_of("LivingRoomLight.Switch"), Some("Switch"));
        assert_eq!(field_of("LivingRoomLight"), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let path: FieldPath = serde_json::from_str(r#""Mon.Fld""#).unwrap();
        assert_eq!(path.moniker(), "Mon");
        assert_eq!(serde_json::to_string(&path).unwrap(), r#""Mon.Fld""#);
        assert!(serde_json::from_str::<FieldPath>(r#""Mon""#).is_err());
    }
}
