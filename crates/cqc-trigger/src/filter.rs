//! Event filter clauses
//!
//! A filter is one predicate of a triggered event. Its [`FilterKind`] picks
//! the test; the field and comparison operands feed it. Which operands a
//! kind uses, requires, and allows as regex is fixed in the table returned
//! by [`FilterKind::rules`], and [`EventFilter::set`] enforces it.

use std::fmt;

use chrono::{Datelike, Weekday};
use cqc_core::{literals, paths, Event, FieldPath, StdDriverEvent};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::context::EvalContext;
use crate::error::{EvalError, EvalResult, FilterError, FilterResult, Operand};
use crate::matcher::ValueMatcher;

/// Whether a kind uses an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Must be empty
    Unused,
    /// May be empty; an empty value matches anything
    Optional,
    /// Must be non-empty
    Required,
}

/// Validation rule for one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandRule {
    pub usage: Usage,
    pub regex: bool,
}

impl OperandRule {
    const NONE: Self = Self::new(Usage::Unused, false);
    const OPT_RX: Self = Self::new(Usage::Optional, true);
    const REQ: Self = Self::new(Usage::Required, false);
    const REQ_RX: Self = Self::new(Usage::Required, true);

    const fn new(usage: Usage, regex: bool) -> Self {
        Self { usage, regex }
    }
}

/// Operand rules for a filter kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterRules {
    pub field: OperandRule,
    pub comp: OperandRule,
}

/// The predicate a filter applies
///
/// The discriminants are the persisted ordinals and must never be reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FilterKind {
    #[default]
    Unused = 0,
    Arbitrary = 1,
    FldValEquals = 2,
    IsDevReady = 3,
    IsFieldChange = 4,
    IsFieldChangeFor = 5,
    IsFromSource = 6,
    IsInTimeRange = 7,
    IsLoadChange = 8,
    IsLoadChangeFor = 9,
    IsLoadChangeFrom = 10,
    IsLoadChangeOn = 11,
    IsLoadChangeOff = 12,
    IsLockStatus = 13,
    IsLockStatusFrom = 14,
    IsLockStatusCode = 15,
    IsMotionEv = 16,
    IsMotionEvFor = 17,
    IsMotionEvFrom = 18,
    IsMotionStartEv = 19,
    IsMotionEndEv = 20,
    IsNewFldValFor = 21,
    IsNight = 22,
    IsOfClass = 23,
    IsPresenceEv = 24,
    IsPresenceEvFor = 25,
    IsPresenceEnter = 26,
    IsPresenceExit = 27,
    IsUserAction = 28,
    IsUserActionFor = 29,
    IsWeekDay = 30,
    IsZoneAlarm = 31,
    IsZoneAlarmFor = 32,
    IsZoneAlarmFrom = 33,
    IsZoneViolated = 34,
    IsZoneSecured = 35,
}

impl FilterKind {
    /// Every kind, in ordinal order
    pub const ALL: [FilterKind; 36] = [
        FilterKind::Unused,
        FilterKind::Arbitrary,
        FilterKind::FldValEquals,
        FilterKind::IsDevReady,
        FilterKind::IsFieldChange,
        FilterKind::IsFieldChangeFor,
        FilterKind::IsFromSource,
        FilterKind::IsInTimeRange,
        FilterKind::IsLoadChange,
        FilterKind::IsLoadChangeFor,
        FilterKind::IsLoadChangeFrom,
        FilterKind::IsLoadChangeOn,
        FilterKind::IsLoadChangeOff,
        FilterKind::IsLockStatus,
        FilterKind::IsLockStatusFrom,
        FilterKind::IsLockStatusCode,
        FilterKind::IsMotionEv,
        FilterKind::IsMotionEvFor,
        FilterKind::IsMotionEvFrom,
        FilterKind::IsMotionStartEv,
        FilterKind::IsMotionEndEv,
        FilterKind::IsNewFldValFor,
        FilterKind::IsNight,
        FilterKind::IsOfClass,
        FilterKind::IsPresenceEv,
        FilterKind::IsPresenceEvFor,
        FilterKind::IsPresenceEnter,
        FilterKind::IsPresenceExit,
        FilterKind::IsUserAction,
        FilterKind::IsUserActionFor,
        FilterKind::IsWeekDay,
        FilterKind::IsZoneAlarm,
        FilterKind::IsZoneAlarmFor,
        FilterKind::IsZoneAlarmFrom,
        FilterKind::IsZoneViolated,
        FilterKind::IsZoneSecured,
    ];

    /// Persisted ordinal
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Kind for a persisted ordinal
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    /// Operand rules for this kind
    pub fn rules(self) -> FilterRules {
        use FilterKind::*;

        let (field, comp) = match self {
            Unused | IsFieldChange | IsNight | IsWeekDay => (OperandRule::NONE, OperandRule::NONE),

            Arbitrary => (OperandRule::REQ, OperandRule::OPT_RX),
            FldValEquals => (OperandRule::REQ, OperandRule::REQ_RX),
            IsDevReady => (OperandRule::REQ, OperandRule::NONE),
            IsInTimeRange => (OperandRule::NONE, OperandRule::REQ),

            IsFromSource | IsOfClass => (OperandRule::NONE, OperandRule::REQ_RX),

            IsLoadChange | IsLockStatus | IsMotionEv | IsPresenceEv | IsUserAction
            | IsZoneAlarm => (OperandRule::NONE, OperandRule::OPT_RX),

            IsLoadChangeFor | IsLockStatusFrom | IsMotionEvFor | IsPresenceEvFor
            | IsUserActionFor | IsZoneAlarmFor => (OperandRule::REQ_RX, OperandRule::OPT_RX),

            IsFieldChangeFor | IsLoadChangeFrom | IsMotionEvFrom | IsZoneAlarmFrom => {
                (OperandRule::REQ_RX, OperandRule::NONE)
            }

            IsLockStatusCode | IsNewFldValFor => (OperandRule::REQ_RX, OperandRule::REQ_RX),

            IsLoadChangeOn | IsLoadChangeOff | IsMotionStartEv | IsMotionEndEv
            | IsPresenceEnter | IsPresenceExit | IsZoneViolated | IsZoneSecured => {
                (OperandRule::OPT_RX, OperandRule::NONE)
            }
        };
        FilterRules { field, comp }
    }

    /// Human readable description for configuration tooling
    pub fn label(self) -> &'static str {
        use FilterKind::*;

        match self {
            Unused => "Unused",
            Arbitrary => "Event value matches",
            FldValEquals => "Field value equals",
            IsDevReady => "Driver is ready",
            IsFieldChange => "Is a field change",
            IsFieldChangeFor => "Is field change for",
            IsFromSource => "Is from source",
            IsInTimeRange => "Is in hour range",
            IsLoadChange => "Is a load change",
            IsLoadChangeFor => "Is load change for",
            IsLoadChangeFrom => "Is load change from driver",
            IsLoadChangeOn => "Is load turned on",
            IsLoadChangeOff => "Is load turned off",
            IsLockStatus => "Is a lock status",
            IsLockStatusFrom => "Is lock status from driver",
            IsLockStatusCode => "Is lock status with code",
            IsMotionEv => "Is a motion event",
            IsMotionEvFor => "Is motion event for",
            IsMotionEvFrom => "Is motion event from driver",
            IsMotionStartEv => "Is motion start",
            IsMotionEndEv => "Is motion end",
            IsNewFldValFor => "Is new field value for",
            IsNight => "Is night",
            IsOfClass => "Is of class",
            IsPresenceEv => "Is a presence event",
            IsPresenceEvFor => "Is presence event for",
            IsPresenceEnter => "Is presence enter",
            IsPresenceExit => "Is presence exit",
            IsUserAction => "Is a user action",
            IsUserActionFor => "Is user action for",
            IsWeekDay => "Is a weekday",
            IsZoneAlarm => "Is a zone alarm",
            IsZoneAlarmFor => "Is zone alarm for",
            IsZoneAlarmFrom => "Is zone alarm from driver",
            IsZoneViolated => "Is zone violated",
            IsZoneSecured => "Is zone secured",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Serializable filter configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub kind: FilterKind,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comp: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub field_regex: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub comp_regex: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub negate: bool,
}

/// One configured filter clause
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    kind: FilterKind,
    negate: bool,
    field: ValueMatcher,
    comp: ValueMatcher,
    /// Parsed field operand for `FldValEquals`
    target: Option<FieldPath>,
}

impl EventFilter {
    /// An unused filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configured filter
    pub fn with(
        kind: FilterKind,
        field: impl Into<String>,
        comp: impl Into<String>,
        field_regex: bool,
        comp_regex: bool,
        negate: bool,
    ) -> FilterResult<Self> {
        let mut filter = Self::new();
        filter.set(kind, field, comp, field_regex, comp_regex, negate)?;
        Ok(filter)
    }

    /// Build from configuration
    pub fn from_config(config: &FilterConfig) -> FilterResult<Self> {
        Self::with(
            config.kind,
            config.field.clone(),
            config.comp.clone(),
            config.field_regex,
            config.comp_regex,
            config.negate,
        )
    }

    /// Current configuration
    pub fn to_config(&self) -> FilterConfig {
        FilterConfig {
            kind: self.kind,
            field: self.field.pattern().to_string(),
            comp: self.comp.pattern().to_string(),
            field_regex: self.field.is_regex(),
            comp_regex: self.comp.is_regex(),
            negate: self.negate,
        }
    }

    /// Reconfigure the filter
    ///
    /// Operands are validated against the kind's rules and regexes are
    /// compiled here. A regex flag on an empty operand is silently cleared.
    /// On error the filter is left unchanged.
    pub fn set(
        &mut self,
        kind: FilterKind,
        field: impl Into<String>,
        comp: impl Into<String>,
        field_regex: bool,
        comp_regex: bool,
        negate: bool,
    ) -> FilterResult<()> {
        let field = field.into();
        let comp = comp.into();
        let field_regex = field_regex && !field.is_empty();
        let comp_regex = comp_regex && !comp.is_empty();

        let rules = kind.rules();
        check_operand(kind, Operand::Field, rules.field, &field, field_regex)?;
        check_operand(kind, Operand::Comparison, rules.comp, &comp, comp_regex)?;

        let target = if kind == FilterKind::FldValEquals {
            let path = field
                .parse::<FieldPath>()
                .map_err(|source| FilterError::InvalidFieldPath {
                    kind,
                    path: field.clone(),
                    source,
                })?;
            Some(path)
        } else {
            None
        };

        let field = ValueMatcher::new(field, field_regex)?;
        let comp = ValueMatcher::new(comp, comp_regex)?;

        self.kind = kind;
        self.negate = negate && kind != FilterKind::Unused;
        self.field = field;
        self.comp = comp;
        self.target = target;
        Ok(())
    }

    /// Reset to unused
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn is_used(&self) -> bool {
        self.kind != FilterKind::Unused
    }

    pub fn negate(&self) -> bool {
        self.negate
    }

    pub fn field(&self) -> &str {
        self.field.pattern()
    }

    pub fn comp(&self) -> &str {
        self.comp.pattern()
    }

    pub fn field_is_regex(&self) -> bool {
        self.field.is_regex()
    }

    pub fn comp_is_regex(&self) -> bool {
        self.comp.is_regex()
    }

    /// Evaluate the filter against an event
    ///
    /// `FldValEquals` and `IsDevReady` call out to `ctx.remote`; a failed
    /// call is returned as an error, never as a non-match.
    pub fn evaluate(&self, event: &Event, ctx: &EvalContext) -> EvalResult<bool> {
        use FilterKind::*;
        use StdDriverEvent as Ev;

        let src = event.query_source().unwrap_or("");
        let raw = match self.kind {
            Unused => return Ok(false),

            Arbitrary => self.comp.matches(event.value(self.field.pattern()), true),

            FldValEquals => self.eval_field_value(ctx)?,

            IsDevReady => {
                let state = ctx
                    .remote_for(self.kind)?
                    .driver_state(self.field.pattern(), ctx.timeouts.driver_state)
                    .map_err(|source| EvalError::Remote {
                        kind: self.kind,
                        source,
                    })?;
                state.is_ready()
            }

            IsFieldChange => event.is_driver_event(Ev::FieldChange),
            IsFieldChangeFor => {
                event.is_driver_event(Ev::FieldChange) && self.field.matches(src, false)
            }

            IsFromSource => self.comp.matches(event.source(), false),
            IsOfClass => self.comp.matches(event.class(), false),

            IsInTimeRange => hour_in_range(self.comp.pattern(), ctx.hour),
            IsNight => ctx.is_night,
            IsWeekDay => !matches!(ctx.now.weekday(), Weekday::Sat | Weekday::Sun),

            IsLoadChange => self.kind_and_comp(event, Ev::LoadChange, paths::LOAD_STATE),
            IsLoadChangeFor => {
                self.kind_source_and_comp(event, src, Ev::LoadChange, paths::LOAD_STATE)
            }
            IsLoadChangeFrom => self.kind_and_moniker(event, src, Ev::LoadChange),
            IsLoadChangeOn => self.literal_event(event, src, Ev::LoadChange, literals::LOAD_ON),
            IsLoadChangeOff => self.literal_event(event, src, Ev::LoadChange, literals::LOAD_OFF),

            IsLockStatus => self.kind_and_comp(event, Ev::LockStatus, paths::LOCK_ID),
            IsLockStatusFrom => {
                self.kind_and_moniker(event, src, Ev::LockStatus)
                    && self.comp.matches(event.value(paths::LOCK_ID), true)
            }
            IsLockStatusCode => {
                self.kind_source_and_comp(event, src, Ev::LockStatus, paths::LOCK_CODE)
            }

            IsMotionEv => self.kind_and_comp(event, Ev::Motion, paths::MOTION_TYPE),
            IsMotionEvFor => self.kind_source_and_comp(event, src, Ev::Motion, paths::MOTION_TYPE),
            IsMotionEvFrom => self.kind_and_moniker(event, src, Ev::Motion),
            IsMotionStartEv => self.literal_event(event, src, Ev::Motion, literals::MOTION_START),
            IsMotionEndEv => self.literal_event(event, src, Ev::Motion, literals::MOTION_END),

            IsNewFldValFor => {
                event.is_driver_event(Ev::FieldChange)
                    && self.field.matches(src, false)
                    && self.comp.matches(event.value(paths::FLD_VALUE), false)
            }

            IsPresenceEv => self.kind_and_comp(event, Ev::Presence, paths::PRES_TYPE),
            IsPresenceEvFor => {
                self.kind_source_and_comp(event, src, Ev::Presence, paths::PRES_AREA)
            }
            IsPresenceEnter => self.literal_event(event, src, Ev::Presence, literals::PRES_ENTER),
            IsPresenceExit => self.literal_event(event, src, Ev::Presence, literals::PRES_EXIT),

            IsUserAction => self.kind_and_comp(event, Ev::UserAction, paths::ACT_TYPE),
            IsUserActionFor => {
                self.kind_source_and_comp(event, src, Ev::UserAction, paths::ACT_TYPE)
            }

            IsZoneAlarm => self.kind_and_comp(event, Ev::ZoneAlarm, paths::ZONE_STATUS),
            IsZoneAlarmFor => {
                self.kind_source_and_comp(event, src, Ev::ZoneAlarm, paths::ZONE_STATUS)
            }
            IsZoneAlarmFrom => self.kind_and_moniker(event, src, Ev::ZoneAlarm),
            IsZoneViolated => {
                self.literal_event(event, src, Ev::ZoneAlarm, literals::ZONE_VIOLATED)
            }
            IsZoneSecured => self.literal_event(event, src, Ev::ZoneAlarm, literals::ZONE_SECURE),
        };

        let result = raw != self.negate;
        trace!(kind = ?self.kind, raw, negate = self.negate, result, "Filter evaluated");
        Ok(result)
    }

    // --- Predicate helpers ---

    fn eval_field_value(&self, ctx: &EvalContext) -> EvalResult<bool> {
        let Some(target) = &self.target else {
            return Ok(false);
        };
        let reading = ctx
            .remote_for(self.kind)?
            .read_field(target.moniker(), target.field(), ctx.timeouts.field_read)
            .map_err(|source| EvalError::Remote {
                kind: self.kind,
                source,
            })?;
        Ok(self.comp.matches(&reading.value.to_string(), false))
    }

    fn kind_and_comp(&self, event: &Event, kind: StdDriverEvent, key: &str) -> bool {
        event.is_driver_event(kind) && self.comp.matches(event.value(key), true)
    }

    fn kind_source_and_comp(
        &self,
        event: &Event,
        src: &str,
        kind: StdDriverEvent,
        key: &str,
    ) -> bool {
        event.is_driver_event(kind)
            && self.field.matches(src, false)
            && self.comp.matches(event.value(key), true)
    }

    fn kind_and_moniker(&self, event: &Event, src: &str, kind: StdDriverEvent) -> bool {
        event.is_driver_event(kind) && self.field.matches_moniker(src, false)
    }

    fn literal_event(&self, event: &Event, src: &str, kind: StdDriverEvent, literal: &str) -> bool {
        event.is_this_driver_event(kind, literal) && self.field.matches(src, true)
    }
}

impl From<&EventFilter> for FilterConfig {
    fn from(filter: &EventFilter) -> Self {
        filter.to_config()
    }
}

fn check_operand(
    kind: FilterKind,
    operand: Operand,
    rule: OperandRule,
    value: &str,
    regex: bool,
) -> FilterResult<()> {
    match rule.usage {
        Usage::Unused if !value.is_empty() => {
            return Err(FilterError::OperandNotUsed { kind, operand });
        }
        Usage::Required if value.is_empty() => {
            return Err(FilterError::OperandRequired { kind, operand });
        }
        _ => {}
    }
    if regex && !rule.regex {
        return Err(FilterError::RegexNotAllowed { kind, operand });
    }
    Ok(())
}

/// Check an hour against a "start,end" range
///
/// The range is half open. A start after the end wraps past midnight. A
/// range that does not parse never matches.
fn hour_in_range(range: &str, hour: u32) -> bool {
    let Some((start, end)) = range.split_once(',') else {
        return false;
    };
    let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>()) else {
        return false;
    };

    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}
