//! Evaluation context and the remote query seam
//!
//! Everything a filter needs beyond the event itself is supplied by the
//! caller through [`EvalContext`]: the ambient night flag, the wall clock,
//! and the [`DriverQuery`] service used by the two predicates that have to
//! ask a driver server for live data.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use cqc_core::{DriverState, FieldType, FieldValue};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult, RemoteError};
use crate::filter::FilterKind;

/// Live field value returned by a remote read
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReading {
    pub value: FieldValue,
    pub field_type: FieldType,
}

impl FieldReading {
    pub fn new(value: FieldValue) -> Self {
        let field_type = value.field_type();
        Self { value, field_type }
    }
}

/// Out-of-band queries against driver servers
///
/// Calls block the evaluating thread. Implementations decide how the
/// timeouts are enforced; the engine passes them through and never retries.
pub trait DriverQuery: Send + Sync {
    /// Read the current value of `moniker.field`
    fn read_field(
        &self,
        moniker: &str,
        field: &str,
        timeout: Duration,
    ) -> Result<FieldReading, RemoteError>;

    /// Query the connection state of a driver
    fn driver_state(&self, moniker: &str, timeout: Duration) -> Result<DriverState, RemoteError>;
}

/// Timeouts handed to [`DriverQuery`] calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTimeouts {
    /// Used by `FldValEquals`
    #[serde(with = "millis")]
    pub field_read: Duration,

    /// Used by `IsDevReady`
    #[serde(with = "millis")]
    pub driver_state: Duration,
}

impl Default for RemoteTimeouts {
    fn default() -> Self {
        Self {
            field_read: Duration::from_millis(5000),
            driver_state: Duration::from_millis(2500),
        }
    }
}

/// Context for filter evaluation
#[derive(Clone)]
pub struct EvalContext {
    /// Is it currently night
    pub is_night: bool,

    /// Current wall-clock time
    pub now: DateTime<Local>,

    /// Current hour, 0-23
    pub hour: u32,

    /// Current minute, 0-59
    pub minute: u32,

    /// Service for `FldValEquals` and `IsDevReady`
    pub remote: Option<Arc<dyn DriverQuery>>,

    /// Timeouts passed to the remote service
    pub timeouts: RemoteTimeouts,
}

impl EvalContext {
    /// Context for a given instant, with hour and minute taken from it
    pub fn at(now: DateTime<Local>) -> Self {
        Self {
            is_night: false,
            hour: now.hour(),
            minute: now.minute(),
            now,
            remote: None,
            timeouts: RemoteTimeouts::default(),
        }
    }

    /// Context for the current local time
    pub fn now() -> Self {
        Self::at(Local::now())
    }

    /// Set the night flag
    pub fn with_night(mut self, is_night: bool) -> Self {
        self.is_night = is_night;
        self
    }

    /// Override the hour and minute (for testing)
    pub fn with_hour_minute(mut self, hour: u32, minute: u32) -> Self {
        self.hour = hour;
        self.minute = minute;
        self
    }

    /// Attach the remote query service
    pub fn with_remote(mut self, remote: Arc<dyn DriverQuery>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Set remote query timeouts
    pub fn with_timeouts(mut self, timeouts: RemoteTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub(crate) fn remote_for(&self, kind: FilterKind) -> EvalResult<&dyn DriverQuery> {
        self.remote
            .as_deref()
            .ok_or(EvalError::NoDriverQuery(kind))
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("is_night", &self.is_night)
            .field("now", &self.now)
            .field("hour", &self.hour)
            .field("minute", &self.minute)
            .field("remote", &self.remote.is_some())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_at_takes_hour_and_minute() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 21, 47, 0).unwrap();
        let ctx = EvalContext::at(now);
        assert_eq!(ctx.hour, 21);
        assert_eq!(ctx.minute, 47);
        assert!(!ctx.is_night);
        assert!(ctx.remote.is_none());
    }

    #[test]
    fn test_missing_remote_is_an_error() {
        let ctx = EvalContext::now();
        let err = ctx.remote_for(FilterKind::IsDevReady).err().unwrap();
        assert!(matches!(err, EvalError::NoDriverQuery(FilterKind::IsDevReady)));
    }

    #[test]
    fn test_timeouts_deserialize_from_millis() {
        let t: RemoteTimeouts =
            serde_json::from_str(r#"{"field_read": 1500, "driver_state": 250}"#).unwrap();
        assert_eq!(t.field_read, Duration::from_millis(1500));
        assert_eq!(t.driver_state, Duration::from_millis(250));
    }
}
