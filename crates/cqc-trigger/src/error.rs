//! Error types for the trigger engine
//!
//! Configuration problems ([`FilterError`]) are raised while a filter or
//! triggered event is being set up and never during evaluation. Evaluation
//! can only fail through [`EvalError`], which is distinct from a filter
//! simply not matching.

use std::fmt;
use std::time::Duration;

use cqc_core::FieldPathError;
use thiserror::Error;

use crate::filter::FilterKind;

/// Which operand of a filter an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Field,
    Comparison,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field => f.write_str("field"),
            Operand::Comparison => f.write_str("comparison"),
        }
    }
}

/// Filter and triggered event configuration errors
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("{kind} does not use a {operand} value")]
    OperandNotUsed { kind: FilterKind, operand: Operand },

    #[error("{kind} requires a {operand} value")]
    OperandRequired { kind: FilterKind, operand: Operand },

    #[error("{kind} does not allow a regular expression for its {operand} value")]
    RegexNotAllowed { kind: FilterKind, operand: Operand },

    #[error("invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{kind} needs a 'moniker.field' value, got '{path}': {source}")]
    InvalidFieldPath {
        kind: FilterKind,
        path: String,
        #[source]
        source: FieldPathError,
    },

    #[error("a triggered event holds at most {max} filters, got {count}")]
    TooManyFilters { max: usize, count: usize },

    #[error("filter slot {index} is out of range (max {max})")]
    SlotOutOfRange { index: usize, max: usize },
}

/// Result type for configuration operations
pub type FilterResult<T> = Result<T, FilterError>;

/// Failure reported by a remote field/driver query
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("driver not found: {0}")]
    DriverNotFound(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("driver '{moniker}' is offline")]
    Offline { moniker: String },

    #[error("transport error talking to '{moniker}': {reason}")]
    Transport { moniker: String, reason: String },

    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// Evaluation-time failures
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{kind} remote query failed: {source}")]
    Remote {
        kind: FilterKind,
        #[source]
        source: RemoteError,
    },

    #[error("{0} needs a driver query service but none is configured")]
    NoDriverQuery(FilterKind),
}

/// Result type for evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Field expression errors
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{statement} needs a comparison value")]
    MissingCompareValue { statement: String },

    #[error("{statement} cannot be applied to a {value_type} value")]
    TypeMismatch {
        statement: String,
        value_type: String,
    },

    #[error("comparison value '{value}' is not valid for a {value_type} field")]
    BadCompareValue { value: String, value_type: String },

    #[error("an on-expression trigger needs an expression")]
    MissingExpression,
}

/// Result type for field expressions
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Persistence errors
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("not a triggered event stream (bad magic)")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown filter kind ordinal {0}")]
    UnknownFilterKind(u8),

    #[error("unknown logical operator ordinal {0}")]
    UnknownLogicalOp(u8),

    #[error("encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("stored configuration is invalid: {0}")]
    Invalid(#[from] FilterError),
}

/// Result type for persistence
pub type PersistResult<T> = Result<T, PersistError>;
