//! Event script lines
//!
//! A script is JSON lines. Each line raises an event, writes a field or
//! changes a driver's state. Blank lines and lines starting with `#` are
//! skipped.

use cqc_core::{DriverState, Event, FieldPath, FieldValue};
use serde::Deserialize;

/// One step of an event script
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptLine {
    /// Fire an event on the bus as given
    Event(Event),

    /// Write a field through the field store
    Write { field: FieldPath, value: FieldValue },

    /// Set a driver's state
    Driver { moniker: String, state: DriverState },
}

impl ScriptLine {
    /// Parse one line, `None` for blanks and comments
    pub fn parse(line: &str) -> serde_json::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        let line = ScriptLine::parse(
            r#"{"event": {"class": "cqsl.motion", "source": "Hall", "payload": {"MotionType": "start"}}}"#,
        )
        .unwrap()
        .unwrap();

        let ScriptLine::Event(event) = line else {
            panic!("expected an event line");
        };
        assert_eq!(event.class(), "cqsl.motion");
        assert_eq!(event.source(), "Hall");
        let expected = Event {
            time_fired: event.time_fired,
            ..Event::motion("Hall", true)
        };
        assert_eq!(event, expected);
    }

    #[test]
    fn test_parse_write_and_driver() {
        assert_eq!(
            ScriptLine::parse(r#"{"write": {"field": "Thermo.Temp", "value": 72}}"#).unwrap(),
            Some(ScriptLine::Write {
                field: "Thermo.Temp".parse().unwrap(),
                value: FieldValue::Card(72),
            })
        );
        assert_eq!(
            ScriptLine::parse(r#"{"driver": {"moniker": "Thermo", "state": "wait_connect"}}"#)
                .unwrap(),
            Some(ScriptLine::Driver {
                moniker: "Thermo".to_string(),
                state: DriverState::WaitConnect,
            })
        );
    }

    #[test]
    fn test_skip_blank_and_comments() {
        assert_eq!(ScriptLine::parse("   ").unwrap(), None);
        assert_eq!(ScriptLine::parse("# warm up").unwrap(), None);
    }

    #[test]
    fn test_bad_lines() {
        assert!(ScriptLine::parse("{not json").is_err());
        assert!(ScriptLine::parse(r#"{"write": {"field": "NoDot", "value": 1}}"#).is_err());
        assert!(ScriptLine::parse(r#"{"reboot": {}}"#).is_err());
    }
}
