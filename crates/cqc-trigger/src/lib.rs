//! Triggered event engine
//!
//! This crate decides whether an incoming [`cqc_core::Event`] should fire a
//! configured triggered event:
//!
//! - [`EventFilter`]: one predicate over an event, picked from a closed set
//!   of [`FilterKind`]s, with literal or regex operands and negation
//! - [`TriggeredEvent`]: up to [`MAX_FILTERS`] filters combined with AND,
//!   OR or XOR
//! - [`FieldTrigger`]: per-field expression trigger with latching
//! - [`EventRtvs`]: runtime values taken from the triggering event
//! - [`persist`]: versioned binary storage
//! - [`TriggeredEventManager`] and [`Dispatcher`]: the running engine

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod expression;
pub mod field_trigger;
pub mod filter;
pub mod manager;
pub mod matcher;
pub mod persist;
pub mod rtv;
pub mod triggered_event;

pub use context::{DriverQuery, EvalContext, FieldReading, RemoteTimeouts};
pub use dispatcher::Dispatcher;
pub use error::{
    EvalError, EvalResult, ExpressionError, ExpressionResult, FilterError, FilterResult, Operand,
    PersistError, PersistResult, RemoteError,
};
pub use expression::{Expression, ExpressionConfig, FieldExpression, Statement};
pub use field_trigger::{FieldTrigger, FieldTriggerConfig, LatchMode, LatchState, TriggerType};
pub use filter::{EventFilter, FilterConfig, FilterKind, FilterRules, OperandRule, Usage};
pub use manager::{FiredTrigger, ManagerError, ManagerResult, TriggeredEventManager};
pub use matcher::ValueMatcher;
pub use rtv::{EventRtvs, RtvChain, RtvProvider, StaticRtvs};
pub use triggered_event::{
    ActionContext, ActionEventInfo, LogicalOp, TriggeredEvent, TriggeredEventConfig, MAX_FILTERS,
    ON_TRIGGER,
};
