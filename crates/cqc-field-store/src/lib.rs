//! Driver field storage
//!
//! This crate provides the FieldStore, which holds the current value of
//! every defined driver field along with the field's trigger. Writes are
//! serialized per field: the cell stays locked while its trigger is
//! evaluated, so the latch state moves in step with the stored value.
//!
//! The store also tracks driver states and answers the live queries made by
//! `FldValEquals` and `IsDevReady` filters.

use std::sync::Arc;
use std::time::Duration;

use cqc_core::{DriverState, Event, FieldPath, FieldType, FieldValue};
use cqc_event_bus::EventBus;
use cqc_trigger::{
    DriverQuery, ExpressionError, FieldReading, FieldTrigger, FieldTriggerConfig, LatchState,
    RemoteError,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Class of the event sent when a field trigger fires
pub const FIELD_TRIGGER_CLASS: &str = "cqsl.fieldtrigger";

/// Field store errors
#[derive(Debug, Error)]
pub enum FieldStoreError {
    #[error("Field not defined: {0}")]
    UnknownField(String),

    #[error("Field already defined: {0}")]
    DuplicateField(String),

    #[error("Field {field} holds {expected:?} values, got {actual:?}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("Invalid trigger for {field}: {source}")]
    Trigger {
        field: String,
        #[source]
        source: ExpressionError,
    },
}

/// Result type for field store operations
pub type FieldStoreResult<T> = Result<T, FieldStoreError>;

/// A field declaration from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field address ("moniker.field")
    pub field: FieldPath,

    /// Value type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Initial value; the type's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,

    /// Field trigger
    #[serde(default)]
    pub trigger: FieldTriggerConfig,
}

/// What a write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The stored value changed
    pub changed: bool,
    /// The field trigger fired
    pub triggered: bool,
}

/// One stored field
#[derive(Debug, Clone)]
struct FieldCell {
    path: FieldPath,
    value: FieldValue,
    field_type: FieldType,
    trigger: FieldTrigger,
}

/// The field store tracks all driver fields
pub struct FieldStore {
    /// Field cells keyed by "moniker.field"
    fields: DashMap<String, FieldCell>,
    /// Driver states keyed by moniker
    drivers: DashMap<String, DriverState>,
    /// Event bus for field change and field trigger events
    event_bus: Arc<EventBus>,
}

impl FieldStore {
    /// Create a new field store with the given event bus
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            fields: DashMap::new(),
            drivers: DashMap::new(),
            event_bus,
        }
    }

    /// Define a field
    ///
    /// The trigger starts with its latch at `First`. A driver seen for the
    /// first time is marked connected.
    pub fn define_field(&self, def: &FieldDefinition) -> FieldStoreResult<()> {
        let key = def.field.to_string();
        if self.fields.contains_key(&key) {
            return Err(FieldStoreError::DuplicateField(key));
        }

        let value = match &def.value {
            Some(v) => coerce(&key, def.field_type, v.clone())?,
            None => FieldValue::default_for(def.field_type),
        };
        let mut trigger =
            FieldTrigger::from_config(&def.trigger).map_err(|source| FieldStoreError::Trigger {
                field: key.clone(),
                source,
            })?;
        trigger.reset_latch();

        debug!(field = %key, field_type = ?def.field_type, "Defined field");
        self.drivers
            .entry(def.field.moniker().to_string())
            .or_insert(DriverState::Connected);
        self.fields.insert(
            key,
            FieldCell {
                path: def.field.clone(),
                value,
                field_type: def.field_type,
                trigger,
            },
        );
        Ok(())
    }

    /// Write a field value
    ///
    /// Sends a field change event if the value changed and, separately, a
    /// field trigger event if the trigger fired. A trigger expression that
    /// fails to evaluate is logged and counts as not fired.
    #[instrument(skip(self, value), fields(field = %path))]
    pub fn write(&self, path: &FieldPath, value: FieldValue) -> FieldStoreResult<WriteOutcome> {
        let key = path.to_string();

        let (outcome, events) = {
            let mut cell = self
                .fields
                .get_mut(&key)
                .ok_or_else(|| FieldStoreError::UnknownField(key.clone()))?;

            let value = coerce(&key, cell.field_type, value)?;
            let changed = cell.value != value;
            cell.value = value;

            let cell = &mut *cell;
            let triggered = match cell.trigger.evaluate(&cell.value, changed) {
                Ok(fired) => fired,
                Err(e) => {
                    warn!(error = %e, "Field trigger evaluation failed");
                    false
                }
            };
            trace!(changed, triggered, latch = ?cell.trigger.latch_state(), "Field written");

            let text = cell.value.to_string();
            let mut events = Vec::with_capacity(2);
            if changed {
                events.push(Event::field_change(
                    cell.path.moniker(),
                    cell.path.field(),
                    text.clone(),
                ));
            }
            if triggered {
                events.push(
                    Event::new(FIELD_TRIGGER_CLASS, key.clone())
                        .with_value(cqc_core::paths::FLD_VALUE, text),
                );
            }
            (WriteOutcome { changed, triggered }, events)
        };

        for event in events {
            self.event_bus.fire(event);
        }
        Ok(outcome)
    }

    /// Replace a field's trigger configuration, keeping its latch state
    pub fn set_trigger(&self, path: &FieldPath, config: &FieldTriggerConfig) -> FieldStoreResult<()> {
        let key = path.to_string();
        let mut cell = self
            .fields
            .get_mut(&key)
            .ok_or_else(|| FieldStoreError::UnknownField(key.clone()))?;

        cell.trigger
            .set_config(config)
            .map_err(|source| FieldStoreError::Trigger {
                field: key.clone(),
                source,
            })?;
        debug!(field = %key, "Field trigger reconfigured");
        Ok(())
    }

    /// Current trigger configuration of a field
    pub fn trigger(&self, path: &FieldPath) -> Option<FieldTriggerConfig> {
        self.fields.get(&path.to_string()).map(|c| c.trigger.config())
    }

    /// Current latch state of a field's trigger
    pub fn latch_state(&self, path: &FieldPath) -> Option<LatchState> {
        self.fields
            .get(&path.to_string())
            .map(|c| c.trigger.latch_state())
    }

    /// Current value of a field
    pub fn get(&self, path: &FieldPath) -> Option<FieldValue> {
        self.fields.get(&path.to_string()).map(|c| c.value.clone())
    }

    /// Type of a field
    pub fn field_type(&self, path: &FieldPath) -> Option<FieldType> {
        self.fields.get(&path.to_string()).map(|c| c.field_type)
    }

    /// Number of defined fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Set a driver's state
    pub fn set_driver_state(&self, moniker: impl Into<String>, state: DriverState) {
        let moniker = moniker.into();
        debug!(moniker = %moniker, state = %state, "Driver state changed");
        self.drivers.insert(moniker, state);
    }

    /// State of a driver, if known
    pub fn driver(&self, moniker: &str) -> Option<DriverState> {
        self.drivers.get(moniker).map(|s| *s)
    }
}

impl DriverQuery for FieldStore {
    fn read_field(
        &self,
        moniker: &str,
        field: &str,
        _timeout: Duration,
    ) -> Result<FieldReading, RemoteError> {
        let state = self
            .driver(moniker)
            .ok_or_else(|| RemoteError::DriverNotFound(moniker.to_string()))?;
        if !state.is_ready() {
            return Err(RemoteError::Offline {
                moniker: moniker.to_string(),
            });
        }

        let key = format!("{moniker}.{field}");
        self.fields
            .get(&key)
            .map(|c| FieldReading {
                value: c.value.clone(),
                field_type: c.field_type,
            })
            .ok_or(RemoteError::FieldNotFound(key))
    }

    fn driver_state(&self, moniker: &str, _timeout: Duration) -> Result<DriverState, RemoteError> {
        self.driver(moniker)
            .ok_or_else(|| RemoteError::DriverNotFound(moniker.to_string()))
    }
}

/// Thread-safe wrapper for FieldStore
pub type SharedFieldStore = Arc<FieldStore>;

/// Convert a written value to the field's type
///
/// Formatted strings are parsed and whole numbers widen to float; any other
/// mismatch is an error.
fn coerce(field: &str, ty: FieldType, value: FieldValue) -> FieldStoreResult<FieldValue> {
    let actual = value.field_type();
    if actual == ty {
        return Ok(value);
    }

    let converted = match (&value, ty) {
        (FieldValue::String(s), _) => FieldValue::parse_as(ty, s),
        (FieldValue::Card(v), FieldType::Float) => Some(FieldValue::Float(*v as f64)),
        (FieldValue::Int(v), FieldType::Float) => Some(FieldValue::Float(*v as f64)),
        (FieldValue::Card(v), FieldType::Int) => i64::try_from(*v).ok().map(FieldValue::Int),
        (FieldValue::Int(v), FieldType::Card) => u64::try_from(*v).ok().map(FieldValue::Card),
        _ => None,
    };

    converted.ok_or_else(|| FieldStoreError::TypeMismatch {
        field: field.to_string(),
        expected: ty,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce() {
        assert_eq!(
            coerce("m.f", FieldType::Float, FieldValue::Int(3)).unwrap(),
            FieldValue::Float(3.0)
        );
        assert_eq!(
            coerce("m.f", FieldType::Boolean, FieldValue::from("True")).unwrap(),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            coerce("m.f", FieldType::Card, FieldValue::Int(7)).unwrap(),
            FieldValue::Card(7)
        );
        assert!(matches!(
            coerce("m.f", FieldType::Card, FieldValue::Int(-1)),
            Err(FieldStoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            coerce("m.f", FieldType::Boolean, FieldValue::Float(1.0)),
            Err(FieldStoreError::TypeMismatch { .. })
        ));
    }
}
