//! Comparison operators for `where` clauses.
//!
//! The operator set is fixed: `= < > >= <= IN LIKE ILIKE`. Comparisons use the
//! total order of [`Value`]; `LIKE` and `ILIKE` only match string values.
//!
//! # LIKE patterns
//!
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! `LIKE` is case-sensitive, `ILIKE` folds both sides to lowercase first.
//! Both operate on Unicode scalar values.

use crate::error::{Error, Result};
use crate::value::Value;
use core::fmt;

/// A binary comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimpleOperator {
    Eq,
    Lt,
    Gt,
    Ge,
    Le,
    In,
    Like,
    ILike,
}

impl SimpleOperator {
    /// Parses the textual form of an operator.
    pub fn parse(op: &str) -> Result<Self> {
        match op.trim() {
            "=" => Ok(SimpleOperator::Eq),
            "<" => Ok(SimpleOperator::Lt),
            ">" => Ok(SimpleOperator::Gt),
            ">=" => Ok(SimpleOperator::Ge),
            "<=" => Ok(SimpleOperator::Le),
            s if s.eq_ignore_ascii_case("in") => Ok(SimpleOperator::In),
            s if s.eq_ignore_ascii_case("like") => Ok(SimpleOperator::Like),
            s if s.eq_ignore_ascii_case("ilike") => Ok(SimpleOperator::ILike),
            other => Err(Error::UnknownOperator(other.to_string())),
        }
    }

    /// Returns the textual form of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleOperator::Eq => "=",
            SimpleOperator::Lt => "<",
            SimpleOperator::Gt => ">",
            SimpleOperator::Ge => ">=",
            SimpleOperator::Le => "<=",
            SimpleOperator::In => "IN",
            SimpleOperator::Like => "LIKE",
            SimpleOperator::ILike => "ILIKE",
        }
    }

    /// Checks that `operand` has the shape this operator needs.
    pub fn validate(&self, operand: &Operand) -> Result<()> {
        match (self, operand) {
            (SimpleOperator::In, Operand::List(_)) => Ok(()),
            (SimpleOperator::In, Operand::Scalar(_)) => {
                Err(Error::invalid_operand("IN", "expected a list"))
            }
            (op, Operand::List(_)) => Err(Error::invalid_operand(op.as_str(), "expected a scalar")),
            (SimpleOperator::Like | SimpleOperator::ILike, Operand::Scalar(v))
                if v.as_str().is_none() =>
            {
                Err(Error::invalid_operand(self.as_str(), "pattern must be a string"))
            }
            _ => Ok(()),
        }
    }

    /// Evaluates `lhs <op> operand`.
    pub fn evaluate(&self, lhs: &Value, operand: &Operand) -> Result<bool> {
        self.validate(operand)?;
        let matched = match (self, operand) {
            (SimpleOperator::In, Operand::List(values)) => values.contains(lhs),
            (SimpleOperator::Eq, Operand::Scalar(rhs)) => lhs == rhs,
            (SimpleOperator::Lt, Operand::Scalar(rhs)) => lhs < rhs,
            (SimpleOperator::Gt, Operand::Scalar(rhs)) => lhs > rhs,
            (SimpleOperator::Ge, Operand::Scalar(rhs)) => lhs >= rhs,
            (SimpleOperator::Le, Operand::Scalar(rhs)) => lhs <= rhs,
            (SimpleOperator::Like, Operand::Scalar(rhs)) => match (lhs.as_str(), rhs.as_str()) {
                (Some(s), Some(p)) => like(s, p),
                _ => false,
            },
            (SimpleOperator::ILike, Operand::Scalar(rhs)) => match (lhs.as_str(), rhs.as_str()) {
                (Some(s), Some(p)) => ilike(s, p),
                _ => false,
            },
            _ => false,
        };
        Ok(matched)
    }
}

impl fmt::Display for SimpleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Scalar(Value),
    List(Vec<Value>),
}

impl Operand {
    /// Creates a scalar operand.
    pub fn scalar(v: impl Into<Value>) -> Self {
        Operand::Scalar(v.into())
    }

    /// Creates a list operand (for `IN`).
    pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

/// SQL LIKE pattern matching.
///
/// ```
/// use zql_core::predicate::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    wildcard_match(&v, &p)
}

/// Case-insensitive LIKE.
pub fn ilike(value: &str, pattern: &str) -> bool {
    like(&value.to_lowercase(), &pattern.to_lowercase())
}

/// Greedy wildcard matcher with single-point backtracking to the last `%`.
fn wildcard_match(v: &[char], p: &[char]) -> bool {
    let (mut vi, mut pi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == v[vi]) {
            vi += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((star_pi, star_vi)) = star {
            // Let the last % swallow one more character
            pi = star_pi + 1;
            vi = star_vi + 1;
            star = Some((star_pi, star_vi + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}
