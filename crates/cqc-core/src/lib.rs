//! Core types for the CQC trigger engine
//!
//! This crate provides the value types shared by every other crate in the
//! workspace: the [`Event`] raised by drivers, the standard driver event
//! kinds, [`FieldPath`] (`moniker.field`), [`FieldValue`] and
//! [`DriverState`].

mod driver;
mod event;
mod field_path;
mod field_value;

pub use driver::DriverState;
pub use event::{Event, StdDriverEvent};
pub use field_path::{field_of, moniker_of, FieldPath, FieldPathError};
pub use field_value::{FieldType, FieldValue};

/// Prefixes a source may carry to mark whether it names a field or a driver.
///
/// `Event::query_source` strips these before any comparison.
pub const SOURCE_PREFIXES: &[&str] = &[FIELD_SOURCE_PREFIX, DRIVER_SOURCE_PREFIX];

/// Source prefix for field-sourced events
pub const FIELD_SOURCE_PREFIX: &str = "cqsl.field:";

/// Source prefix for driver-sourced events
pub const DRIVER_SOURCE_PREFIX: &str = "cqsl.driver:";

/// Well-known payload path keys
pub mod paths {
    /// New value of a changed field
    pub const FLD_VALUE: &str = "FldValue";

    /// Load state, "on" or "off"
    pub const LOAD_STATE: &str = "LoadState";

    /// Load number within the driver
    pub const LOAD_NUM: &str = "LoadNum";

    /// Lock state, "locked" or "unlocked"
    pub const LOCK_STATE: &str = "LockState";

    /// Identifier of the lock that changed
    pub const LOCK_ID: &str = "LockId";

    /// User code entered at the lock
    pub const LOCK_CODE: &str = "LockCode";

    /// Motion type, "start" or "end"
    pub const MOTION_TYPE: &str = "MotionType";

    /// Motion sensor number within the driver
    pub const MOTION_NUM: &str = "MotionNum";

    /// Presence type, "enter" or "exit"
    pub const PRES_TYPE: &str = "PresType";

    /// Presence area identifier
    pub const PRES_AREA: &str = "PresArea";

    /// Presence identity (who entered or left)
    pub const PRES_ID: &str = "PresId";

    /// Zone status, "violated", "secure" or "notready"
    pub const ZONE_STATUS: &str = "ZoneStatus";

    /// Zone number within the alarm panel
    pub const ZONE_NUM: &str = "ZoneNum";

    /// User action type
    pub const ACT_TYPE: &str = "ActType";

    /// User action data
    pub const ACT_DATA: &str = "ActData";
}

/// Fixed payload literals tested by the standard driver event predicates
pub mod literals {
    pub const LOAD_ON: &str = "on";
    pub const LOAD_OFF: &str = "off";
    pub const LOCKED: &str = "locked";
    pub const UNLOCKED: &str = "unlocked";
    pub const MOTION_START: &str = "start";
    pub const MOTION_END: &str = "end";
    pub const PRES_ENTER: &str = "enter";
    pub const PRES_EXIT: &str = "exit";
    pub const ZONE_VIOLATED: &str = "violated";
    pub const ZONE_SECURE: &str = "secure";
    pub const ZONE_NOT_READY: &str = "notready";
}
