//! Triggered events
//!
//! A triggered event holds a fixed number of filter slots and combines the
//! results of the used ones with a logical operator. Unused slots are
//! skipped entirely.

use std::fmt;

use cqc_core::Event;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::context::EvalContext;
use crate::error::{EvalResult, FilterError, FilterResult};
use crate::filter::{EventFilter, FilterConfig};

/// Number of filter slots in a triggered event
pub const MAX_FILTERS: usize = 4;

/// How filter results are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogicalOp {
    /// Every used filter must match; true when none are used
    #[default]
    And = 0,
    /// At least one used filter must match
    Or = 1,
    /// Exactly one used filter must match
    Xor = 2,
}

impl LogicalOp {
    /// Persisted ordinal
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Operator for a persisted ordinal
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(LogicalOp::And),
            1 => Some(LogicalOp::Or),
            2 => Some(LogicalOp::Xor),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => f.write_str("and"),
            LogicalOp::Or => f.write_str("or"),
            LogicalOp::Xor => f.write_str("xor"),
        }
    }
}

/// Execution context of an action event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ActionContext {
    /// Action run in response to a triggered event
    TriggeredEvent,
}

/// An action event exposed to the action editor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionEventInfo {
    pub name: &'static str,
    pub context: ActionContext,
}

/// The single action event a triggered event reports
pub const ON_TRIGGER: ActionEventInfo = ActionEventInfo {
    name: "OnTrigger",
    context: ActionContext::TriggeredEvent,
};

fn is_false(b: &bool) -> bool {
    !*b
}

/// Serializable triggered event configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredEventConfig {
    /// Unique identifier; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,

    /// Filters in slot order, at most [`MAX_FILTERS`]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterConfig>,

    #[serde(default)]
    pub logical_op: LogicalOp,

    #[serde(default, skip_serializing_if = "is_false")]
    pub paused: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub loggable: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub serialized: bool,
}

/// A set of filters with a combining operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredEvent {
    id: String,
    title: String,
    filters: [EventFilter; MAX_FILTERS],
    pub logical_op: LogicalOp,
    pub paused: bool,
    pub loggable: bool,
    pub serialized: bool,
}

impl TriggeredEvent {
    /// An event with all slots unused
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            filters: Default::default(),
            logical_op: LogicalOp::default(),
            paused: false,
            loggable: false,
            serialized: false,
        }
    }

    /// Build from configuration, validating every filter
    pub fn from_config(config: &TriggeredEventConfig) -> FilterResult<Self> {
        if config.filters.len() > MAX_FILTERS {
            return Err(FilterError::TooManyFilters {
                max: MAX_FILTERS,
                count: config.filters.len(),
            });
        }

        let id = config
            .id
            .clone()
            .unwrap_or_else(|| ulid::Ulid::new().to_string());
        let mut event = Self::new(id, config.title.clone());
        for (slot, filter) in config.filters.iter().enumerate() {
            event.filters[slot] = EventFilter::from_config(filter)?;
        }
        event.logical_op = config.logical_op;
        event.paused = config.paused;
        event.loggable = config.loggable;
        event.serialized = config.serialized;
        Ok(event)
    }

    /// Current configuration
    ///
    /// Trailing unused slots are dropped; unused slots in the middle are kept
    /// so slot positions survive a round trip.
    pub fn to_config(&self) -> TriggeredEventConfig {
        let used = self
            .filters
            .iter()
            .rposition(EventFilter::is_used)
            .map_or(0, |i| i + 1);

        TriggeredEventConfig {
            id: Some(self.id.clone()),
            title: self.title.clone(),
            filters: self.filters[..used]
                .iter()
                .map(EventFilter::to_config)
                .collect(),
            logical_op: self.logical_op,
            paused: self.paused,
            loggable: self.loggable,
            serialized: self.serialized,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// All filter slots in order
    pub fn filters(&self) -> &[EventFilter; MAX_FILTERS] {
        &self.filters
    }

    /// The filter in a slot
    pub fn filter(&self, index: usize) -> FilterResult<&EventFilter> {
        self.filters.get(index).ok_or(FilterError::SlotOutOfRange {
            index,
            max: MAX_FILTERS,
        })
    }

    /// Replace the filter in a slot
    pub fn set_filter(&mut self, index: usize, filter: EventFilter) -> FilterResult<()> {
        let slot = self
            .filters
            .get_mut(index)
            .ok_or(FilterError::SlotOutOfRange {
                index,
                max: MAX_FILTERS,
            })?;
        *slot = filter;
        Ok(())
    }

    /// Mark a slot unused
    pub fn clear_filter(&mut self, index: usize) -> FilterResult<()> {
        self.set_filter(index, EventFilter::new())
    }

    /// Number of used slots
    pub fn active_filter_count(&self) -> usize {
        self.filters.iter().filter(|f| f.is_used()).count()
    }

    /// Action events this triggered event reports
    pub fn action_events(&self) -> &'static [ActionEventInfo] {
        &[ON_TRIGGER]
    }

    /// Evaluate against an event
    ///
    /// Used filters run in slot order and stop as soon as the outcome is
    /// known, so a remote-querying filter after a decisive one is never
    /// called. A filter error aborts evaluation.
    pub fn evaluate(&self, event: &Event, ctx: &EvalContext) -> EvalResult<bool> {
        if self.paused {
            return Ok(false);
        }

        let mut true_count = 0usize;
        for (slot, filter) in self.filters.iter().enumerate() {
            if !filter.is_used() {
                continue;
            }

            if filter.evaluate(event, ctx)? {
                match self.logical_op {
                    LogicalOp::Or => return Ok(true),
                    LogicalOp::Xor if true_count >= 1 => return Ok(false),
                    _ => {}
                }
                true_count += 1;
            } else if self.logical_op == LogicalOp::And {
                trace!(id = %self.id, slot, "AND short-circuit on failed filter");
                return Ok(false);
            }
        }

        Ok(match self.logical_op {
            LogicalOp::And => true,
            LogicalOp::Or => false,
            LogicalOp::Xor => true_count == 1,
        })
    }
}
