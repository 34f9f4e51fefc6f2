//! Event types raised by drivers and field storage

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{literals, paths, SOURCE_PREFIXES};

/// Standard driver event kinds
///
/// Each kind has a fixed class string and a primary payload key holding the
/// value that `Event::is_this_driver_event` compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdDriverEvent {
    FieldChange,
    LoadChange,
    Motion,
    LockStatus,
    Presence,
    ZoneAlarm,
    UserAction,
}

impl StdDriverEvent {
    /// All standard kinds, in declaration order
    pub const ALL: [StdDriverEvent; 7] = [
        StdDriverEvent::FieldChange,
        StdDriverEvent::LoadChange,
        StdDriverEvent::Motion,
        StdDriverEvent::LockStatus,
        StdDriverEvent::Presence,
        StdDriverEvent::ZoneAlarm,
        StdDriverEvent::UserAction,
    ];

    /// The event class string for this kind
    pub fn class(self) -> &'static str {
        match self {
            StdDriverEvent::FieldChange => "cqsl.fieldchange",
            StdDriverEvent::LoadChange => "cqsl.loadchange",
            StdDriverEvent::Motion => "cqsl.motion",
            StdDriverEvent::LockStatus => "cqsl.lockstatus",
            StdDriverEvent::Presence => "cqsl.presence",
            StdDriverEvent::ZoneAlarm => "cqsl.zonealarm",
            StdDriverEvent::UserAction => "cqsl.useraction",
        }
    }

    /// The payload key compared by `Event::is_this_driver_event`
    pub fn primary_key(self) -> &'static str {
        match self {
            StdDriverEvent::FieldChange => paths::FLD_VALUE,
            StdDriverEvent::LoadChange => paths::LOAD_STATE,
            StdDriverEvent::Motion => paths::MOTION_TYPE,
            StdDriverEvent::LockStatus => paths::LOCK_STATE,
            StdDriverEvent::Presence => paths::PRES_TYPE,
            StdDriverEvent::ZoneAlarm => paths::ZONE_STATUS,
            StdDriverEvent::UserAction => paths::ACT_TYPE,
        }
    }

    /// Look up the kind for a class string
    pub fn from_class(class: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.class() == class)
    }
}

impl fmt::Display for StdDriverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class())
    }
}

/// Something that happened in the system
///
/// An event carries a dotted class, the path of the entity that raised it
/// (`moniker.field` for field events, a bare moniker for driver events) and
/// a map of string payload values addressed by the keys in [`crate::paths`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Classification, e.g. `cqsl.loadchange`
    pub class: String,

    /// Originating entity path
    pub source: String,

    /// Type-specific payload
    #[serde(default)]
    pub payload: HashMap<String, String>,

    /// When the event was raised
    #[serde(default = "Utc::now")]
    pub time_fired: DateTime<Utc>,
}

impl Event {
    /// Create an event with an empty payload
    pub fn new(class: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            source: source.into(),
            payload: HashMap::new(),
            time_fired: Utc::now(),
        }
    }

    /// Create a standard driver event with an empty payload
    pub fn driver(kind: StdDriverEvent, source: impl Into<String>) -> Self {
        Self::new(kind.class(), source)
    }

    /// Add a payload value
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// A field changed to `value`
    pub fn field_change(moniker: &str, field: &str, value: impl Into<String>) -> Self {
        Self::driver(StdDriverEvent::FieldChange, format!("{moniker}.{field}"))
            .with_value(paths::FLD_VALUE, value)
    }

    /// A load turned on or off
    pub fn load_change(source: impl Into<String>, on: bool) -> Self {
        let state = if on {
            literals::LOAD_ON
        } else {
            literals::LOAD_OFF
        };
        Self::driver(StdDriverEvent::LoadChange, source).with_value(paths::LOAD_STATE, state)
    }

    /// Motion started or ended
    pub fn motion(source: impl Into<String>, start: bool) -> Self {
        let ty = if start {
            literals::MOTION_START
        } else {
            literals::MOTION_END
        };
        Self::driver(StdDriverEvent::Motion, source).with_value(paths::MOTION_TYPE, ty)
    }

    /// A lock was locked or unlocked, optionally with the user code used
    pub fn lock_status(
        source: impl Into<String>,
        locked: bool,
        lock_id: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        let state = if locked {
            literals::LOCKED
        } else {
            literals::UNLOCKED
        };
        Self::driver(StdDriverEvent::LockStatus, source)
            .with_value(paths::LOCK_STATE, state)
            .with_value(paths::LOCK_ID, lock_id)
            .with_value(paths::LOCK_CODE, code)
    }

    /// Someone entered or left an area
    pub fn presence(source: impl Into<String>, enter: bool, area: impl Into<String>) -> Self {
        let ty = if enter {
            literals::PRES_ENTER
        } else {
            literals::PRES_EXIT
        };
        Self::driver(StdDriverEvent::Presence, source)
            .with_value(paths::PRES_TYPE, ty)
            .with_value(paths::PRES_AREA, area)
    }

    /// An alarm zone changed status
    pub fn zone_alarm(
        source: impl Into<String>,
        status: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self::driver(StdDriverEvent::ZoneAlarm, source)
            .with_value(paths::ZONE_STATUS, status)
            .with_value(paths::ZONE_NUM, zone)
    }

    /// A user performed an action (button press, keypad entry, ...)
    pub fn user_action(
        source: impl Into<String>,
        act_type: impl Into<String>,
        act_data: impl Into<String>,
    ) -> Self {
        Self::driver(StdDriverEvent::UserAction, source)
            .with_value(paths::ACT_TYPE, act_type)
            .with_value(paths::ACT_DATA, act_data)
    }

    /// Event class
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Full source, including any prefix
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Source with a known `cqsl.*:` prefix removed
    ///
    /// Returns `None` if the event has no source at all.
    pub fn query_source(&self) -> Option<&str> {
        if self.source.is_empty() {
            return None;
        }
        let stripped = SOURCE_PREFIXES
            .iter()
            .find_map(|prefix| self.source.strip_prefix(prefix))
            .unwrap_or(&self.source);
        Some(stripped)
    }

    /// Payload value, or the empty string if absent
    pub fn value(&self, key: &str) -> &str {
        self.payload.get(key).map(String::as_str).unwrap_or("")
    }

    /// Payload value if present
    pub fn value_exists(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }

    /// Is this a standard driver event of the given kind
    pub fn is_driver_event(&self, kind: StdDriverEvent) -> bool {
        self.class == kind.class()
    }

    /// Is this a standard driver event of the given kind whose primary payload
    /// value equals `literal`
    pub fn is_this_driver_event(&self, kind: StdDriverEvent, literal: &str) -> bool {
        self.is_driver_event(kind) && self.value(kind.primary_key()) == literal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FIELD_SOURCE_PREFIX;

    #[test]
    fn test_class_round_trip() {
        for kind in StdDriverEvent::ALL {
            assert_eq!(StdDriverEvent::from_class(kind.class()), Some(kind));
        }
        assert_eq!(StdDriverEvent::from_class("cqsl.unknown"), None);
    }

    #[test]
    fn test_is_this_driver_event() {
        let ev = Event::load_change("Lights.Kitchen", true);
        assert!(ev.is_driver_event(StdDriverEvent::LoadChange));
        assert!(ev.is_this_driver_event(StdDriverEvent::LoadChange, "on"));
        assert!(!ev.is_this_driver_event(StdDriverEvent::LoadChange, "off"));
        assert!(!ev.is_this_driver_event(StdDriverEvent::Motion, "on"));
    }

    #[test]
    fn test_query_source_strips_prefix() {
        let ev = Event::new("cqsl.fieldchange", format!("{FIELD_SOURCE_PREFIX}Mon.Fld"));
        assert_eq!(ev.query_source(), Some("Mon.Fld"));
        assert_eq!(ev.source(), "cqsl.field:Mon.Fld");

        let bare = Event::new("cqsl.motion", "Mon");
        assert_eq!(bare.query_source(), Some("Mon"));

        let empty = Event::new("cqsl.motion", "");
        assert_eq!(empty.query_source(), None);
    }

    #[test]
    fn test_value_defaults_to_empty() {
        let ev = Event::field_change("Thermo", "Temp", "72");
        assert_eq!(ev.value(paths::FLD_VALUE), "72");
        assert_eq!(ev.value("Missing"), "");
        assert_eq!(ev.value_exists("Missing"), None);
        assert_eq!(ev.source(), "Thermo.Temp");
    }

    #[test]
    fn test_event_deserialize() {
        let json = r#"{
            "class": "cqsl.zonealarm",
            "source": "Panel",
            "payload": {"ZoneStatus": "violated", "ZoneNum": "4"}
        }"#;
        let ev: Event = serde_json::from_str(json).unwrap();
        assert!(ev.is_this_driver_event(StdDriverEvent::ZoneAlarm, "violated"));
    }
}
