//! Field event triggers
//!
//! Each field storage cell owns one [`FieldTrigger`]. On every write the
//! owner calls [`FieldTrigger::evaluate`], which decides whether a field
//! trigger event should be sent. Expression triggers pass their raw result
//! through a latch that can suppress repeats.
//!
//! The latch state is runtime-only. Changing configuration never touches
//! it; only [`FieldTrigger::reset_latch`] (used when a trigger is attached
//! to a freshly defined field) puts it back to `First`.

use cqc_core::FieldValue;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ExpressionError, ExpressionResult};
use crate::expression::{Expression, ExpressionConfig, FieldExpression};

/// When a field trigger fires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Unused,
    /// Fires whenever the value changes
    OnChange,
    /// Fires based on the expression result and latch mode
    OnExpression,
}

/// Edge detection applied to expression results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatchMode {
    /// Report every result
    #[default]
    Unlatched,
    /// Report only false to true transitions
    Unidirectional,
    /// Report every transition
    Bidirectional,
}

/// Last expression result seen by the latch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LatchState {
    #[default]
    First,
    True,
    False,
}

impl From<bool> for LatchState {
    fn from(b: bool) -> Self {
        if b {
            LatchState::True
        } else {
            LatchState::False
        }
    }
}

/// Serializable field trigger configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTriggerConfig {
    #[serde(default, rename = "type")]
    pub trigger_type: TriggerType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<ExpressionConfig>,

    #[serde(default)]
    pub latch: LatchMode,
}

/// A field trigger with its latch state
#[derive(Debug, Clone, Default)]
pub struct FieldTrigger {
    trigger_type: TriggerType,
    expression: Option<Expression>,
    latch: LatchMode,
    last: LatchState,
}

impl FieldTrigger {
    /// An unused trigger
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration with the latch at `First`
    pub fn from_config(config: &FieldTriggerConfig) -> ExpressionResult<Self> {
        let mut trigger = Self::new();
        trigger.set_config(config)?;
        Ok(trigger)
    }

    /// Replace the configuration, keeping the latch state
    ///
    /// On error the trigger is left unchanged.
    pub fn set_config(&mut self, config: &FieldTriggerConfig) -> ExpressionResult<()> {
        let expression = match (&config.expression, config.trigger_type) {
            (Some(expr), _) => Some(Expression::new(expr.clone())?),
            (None, TriggerType::OnExpression) => return Err(ExpressionError::MissingExpression),
            (None, _) => None,
        };

        self.trigger_type = config.trigger_type;
        self.expression = expression;
        self.latch = config.latch;
        Ok(())
    }

    /// Copy another trigger's configuration, keeping this one's latch state
    pub fn assign_from(&mut self, other: &FieldTrigger) {
        self.trigger_type = other.trigger_type;
        self.expression = other.expression.clone();
        self.latch = other.latch;
    }

    /// Current configuration
    pub fn config(&self) -> FieldTriggerConfig {
        FieldTriggerConfig {
            trigger_type: self.trigger_type,
            expression: self.expression.as_ref().map(|e| e.config().clone()),
            latch: self.latch,
        }
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.trigger_type
    }

    pub fn latch_mode(&self) -> LatchMode {
        self.latch
    }

    pub fn latch_state(&self) -> LatchState {
        self.last
    }

    /// Put the latch back to `First`
    pub fn reset_latch(&mut self) {
        self.last = LatchState::First;
    }

    /// Decide whether a write should send a field trigger event
    ///
    /// `changed` says whether the write changed the stored value.
    pub fn evaluate(&mut self, value: &FieldValue, changed: bool) -> ExpressionResult<bool> {
        match self.trigger_type {
            TriggerType::Unused => Ok(false),
            TriggerType::OnChange => Ok(changed),
            TriggerType::OnExpression => {
                let raw = match &self.expression {
                    Some(expr) => expr.evaluate(value)?,
                    None => return Err(ExpressionError::MissingExpression),
                };
                Ok(self.apply_latch(raw))
            }
        }
    }

    /// Evaluate with a different expression engine, through the same latch
    pub fn evaluate_with(
        &mut self,
        expression: &dyn FieldExpression,
        value: &FieldValue,
    ) -> ExpressionResult<bool> {
        let raw = expression.evaluate(value)?;
        Ok(self.apply_latch(raw))
    }

    /// Feed a raw result through the latch
    ///
    /// The state is updated on every call, whatever the mode, so switching
    /// modes later starts from the real last result.
    pub fn apply_latch(&mut self, raw: bool) -> bool {
        let prev = self.last;
        self.last = LatchState::from(raw);

        let emit = match (self.latch, prev) {
            (LatchMode::Unlatched, _) => raw,
            (_, LatchState::First) => false,
            (LatchMode::Unidirectional, prev) => raw && prev == LatchState::False,
            (LatchMode::Bidirectional, prev) => prev != self.last,
        };
        trace!(mode = ?self.latch, ?prev, raw, emit, "Latch applied");
        emit
    }
}

impl PartialEq for FieldTrigger {
    /// Configuration equality; the latch state is not compared
    fn eq(&self, other: &Self) -> bool {
        self.trigger_type == other.trigger_type
            && self.expression == other.expression
            && self.latch == other.latch
    }
}

impl Eq for FieldTrigger {}
