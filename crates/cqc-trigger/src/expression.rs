//! Field expressions
//!
//! A single-statement boolean test applied to a field's current value. Field
//! triggers of type `OnExpression` run one of these on every write and feed
//! the result into their latch.

use std::fmt;

use cqc_core::{FieldType, FieldValue};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ExpressionError, ExpressionResult};

/// Something that can judge a field value
pub trait FieldExpression: Send + Sync + fmt::Debug {
    /// Evaluate against the current value, negation included
    fn evaluate(&self, value: &FieldValue) -> ExpressionResult<bool>;
}

/// The test an expression applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statement {
    IsEqual,
    IsNotEqual,
    IsGreaterThan,
    IsGreaterThanOrEqual,
    IsLessThan,
    IsLessThanOrEqual,
    IsTrue,
    IsFalse,
    IsRegEx,
    IsAlpha,
    IsAlphaNum,
    IsDigit,
}

impl Statement {
    /// Does the statement take a comparison value
    pub fn needs_compare(self) -> bool {
        matches!(
            self,
            Statement::IsEqual
                | Statement::IsNotEqual
                | Statement::IsGreaterThan
                | Statement::IsGreaterThanOrEqual
                | Statement::IsLessThan
                | Statement::IsLessThanOrEqual
                | Statement::IsRegEx
        )
    }

    fn is_ordering(self) -> bool {
        matches!(
            self,
            Statement::IsGreaterThan
                | Statement::IsGreaterThanOrEqual
                | Statement::IsLessThan
                | Statement::IsLessThanOrEqual
        )
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Serializable expression configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionConfig {
    pub statement: Statement,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compare: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub negate: bool,
}

impl ExpressionConfig {
    pub fn new(statement: Statement, compare: impl Into<String>) -> Self {
        Self {
            statement,
            compare: compare.into(),
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// A compiled expression
#[derive(Debug, Clone)]
pub struct Expression {
    config: ExpressionConfig,
    regex: Option<Regex>,
}

impl Expression {
    /// Compile an expression
    pub fn new(config: ExpressionConfig) -> ExpressionResult<Self> {
        if config.statement.needs_compare() && config.compare.is_empty() {
            return Err(ExpressionError::MissingCompareValue {
                statement: config.statement.to_string(),
            });
        }

        let regex = if config.statement == Statement::IsRegEx {
            let re = Regex::new(&format!("^(?:{})$", config.compare)).map_err(|source| {
                ExpressionError::InvalidRegex {
                    pattern: config.compare.clone(),
                    source,
                }
            })?;
            Some(re)
        } else {
            None
        };

        Ok(Self { config, regex })
    }

    pub fn config(&self) -> &ExpressionConfig {
        &self.config
    }

    pub fn statement(&self) -> Statement {
        self.config.statement
    }

    fn raw(&self, value: &FieldValue) -> ExpressionResult<bool> {
        let statement = self.config.statement;
        let compare = self.config.compare.as_str();

        match statement {
            Statement::IsEqual => self.equals(value),
            Statement::IsNotEqual => self.equals(value).map(|eq| !eq),

            s if s.is_ordering() => {
                let lhs = value.as_f64().ok_or_else(|| type_mismatch(s, value))?;
                let rhs = parse_compare(value.field_type(), compare)?
                    .as_f64()
                    .ok_or_else(|| type_mismatch(s, value))?;
                Ok(match s {
                    Statement::IsGreaterThan => lhs > rhs,
                    Statement::IsGreaterThanOrEqual => lhs >= rhs,
                    Statement::IsLessThan => lhs < rhs,
                    _ => lhs <= rhs,
                })
            }

            Statement::IsTrue | Statement::IsFalse => {
                let b = value
                    .as_bool()
                    .ok_or_else(|| type_mismatch(statement, value))?;
                Ok(b == (statement == Statement::IsTrue))
            }

            Statement::IsRegEx => {
                let text = value.to_string();
                Ok(self.regex.as_ref().is_some_and(|re| re.is_match(&text)))
            }

            Statement::IsAlpha => Ok(all_chars(value, char::is_alphabetic)),
            Statement::IsAlphaNum => Ok(all_chars(value, char::is_alphanumeric)),
            Statement::IsDigit => Ok(all_chars(value, |c| c.is_ascii_digit())),

            _ => Ok(false),
        }
    }

    fn equals(&self, value: &FieldValue) -> ExpressionResult<bool> {
        let compare = parse_compare(value.field_type(), &self.config.compare)?;
        Ok(match (value, &compare) {
            (FieldValue::String(a), FieldValue::String(b)) => a == b,
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a == b,
            _ => value.as_f64() == compare.as_f64(),
        })
    }
}

impl FieldExpression for Expression {
    fn evaluate(&self, value: &FieldValue) -> ExpressionResult<bool> {
        Ok(self.raw(value)? != self.config.negate)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
    }
}

impl Eq for Expression {}

fn parse_compare(ty: FieldType, text: &str) -> ExpressionResult<FieldValue> {
    FieldValue::parse_as(ty, text).ok_or_else(|| ExpressionError::BadCompareValue {
        value: text.to_string(),
        value_type: format!("{ty:?}").to_lowercase(),
    })
}

fn type_mismatch(statement: Statement, value: &FieldValue) -> ExpressionError {
    ExpressionError::TypeMismatch {
        statement: statement.to_string(),
        value_type: format!("{:?}", value.field_type()).to_lowercase(),
    }
}

fn all_chars(value: &FieldValue, pred: impl Fn(char) -> bool) -> bool {
    let text = value.to_string();
    !text.is_empty() && text.chars().all(pred)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(statement: Statement, compare: &str) -> Expression {
        Expression::new(ExpressionConfig::new(statement, compare)).unwrap()
    }

    #[test]
    fn test_numeric_comparisons() {
        let gt = expr(Statement::IsGreaterThan, "70");
        assert!(gt.evaluate(&FieldValue::Int(71)).unwrap());
        assert!(!gt.evaluate(&FieldValue::Int(70)).unwrap());

        let ge = expr(Statement::IsGreaterThanOrEqual, "70");
        assert!(ge.evaluate(&FieldValue::Card(70)).unwrap());

        let lt = expr(Statement::IsLessThan, "20.5");
        assert!(lt.evaluate(&FieldValue::Float(20.25)).unwrap());
    }

    #[test]
    fn test_equality_by_type() {
        let eq = expr(Statement::IsEqual, "72");
        assert!(eq.evaluate(&FieldValue::Float(72.0)).unwrap());

        let eq = expr(Statement::IsEqual, "Heat");
        assert!(eq.evaluate(&FieldValue::from("Heat")).unwrap());
        assert!(!eq.evaluate(&FieldValue::from("heat")).unwrap());

        let ne = expr(Statement::IsNotEqual, "true");
        assert!(ne.evaluate(&FieldValue::Boolean(false)).unwrap());
    }

    #[test]
    fn test_boolean_statements() {
        let t = expr(Statement::IsTrue, "");
        assert!(t.evaluate(&FieldValue::Boolean(true)).unwrap());
        assert!(matches!(
            t.evaluate(&FieldValue::Int(1)),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_regex_and_char_classes() {
        let re = expr(Statement::IsRegEx, "Zone[0-9]");
        assert!(re.evaluate(&FieldValue::from("Zone4")).unwrap());
        assert!(!re.evaluate(&FieldValue::from("Zone42")).unwrap());

        assert!(expr(Statement::IsDigit, "")
            .evaluate(&FieldValue::Card(123))
            .unwrap());
        assert!(!expr(Statement::IsAlpha, "")
            .evaluate(&FieldValue::from("abc1"))
            .unwrap());
        assert!(expr(Statement::IsAlphaNum, "")
            .evaluate(&FieldValue::from("abc1"))
            .unwrap());
        assert!(!expr(Statement::IsAlpha, "")
            .evaluate(&FieldValue::from(""))
            .unwrap());
    }

    #[test]
    fn test_negate() {
        let e = Expression::new(ExpressionConfig::new(Statement::IsTrue, "").negated()).unwrap();
        assert!(e.evaluate(&FieldValue::Boolean(false)).unwrap());
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            Expression::new(ExpressionConfig::new(Statement::IsEqual, "")),
            Err(ExpressionError::MissingCompareValue { .. })
        ));
        assert!(matches!(
            Expression::new(ExpressionConfig::new(Statement::IsRegEx, "(")),
            Err(ExpressionError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_bad_compare_value() {
        let gt = expr(Statement::IsGreaterThan, "warm");
        assert!(matches!(
            gt.evaluate(&FieldValue::Int(5)),
            Err(ExpressionError::BadCompareValue { .. })
        ));
        assert!(matches!(
            gt.evaluate(&FieldValue::from("hot")),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }
}
