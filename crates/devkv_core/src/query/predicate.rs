//! Value predicates.

use crate::types::Entry;
use devkv_codec::TypedValue;
use std::cmp::Ordering;
use std::fmt;

/// Seam for filters built outside this crate.
///
/// A filter is evaluated once per candidate entry when a result is
/// materialized; it must not depend on evaluation order.
pub trait EntryFilter: Send + Sync + fmt::Debug {
    /// Returns true if `entry` belongs in the result.
    fn matches(&self, entry: &Entry) -> bool;
}

/// A predicate tree over entry values.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Value equals the operand.
    EqualTo(TypedValue),
    /// Value differs from the operand (values of another kind included).
    NotEqualTo(TypedValue),
    /// Value is greater than the operand.
    GreaterThan(TypedValue),
    /// Value is less than the operand.
    LessThan(TypedValue),
    /// Value is greater than or equal to the operand.
    GreaterThanOrEqualTo(TypedValue),
    /// Value is less than or equal to the operand.
    LessThanOrEqualTo(TypedValue),
    /// Value equals one of the operands.
    In(Vec<TypedValue>),
    /// Value equals none of the operands.
    NotIn(Vec<TypedValue>),
    /// String value matches a pattern where `%` is any run and `_` one character.
    Like(String),
    /// String value does not match the pattern. Non-strings never match.
    Unlike(String),
    /// Both hold.
    And(Box<Predicate>, Box<Predicate>),
    /// Either holds.
    Or(Box<Predicate>, Box<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// `self AND other`.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// `self OR other`.
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// `NOT self`.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluates the predicate against `value`.
    #[must_use]
    pub fn eval(&self, value: &TypedValue) -> bool {
        match self {
            Self::EqualTo(operand) => compare(value, operand) == Some(Ordering::Equal),
            Self::NotEqualTo(operand) => compare(value, operand) != Some(Ordering::Equal),
            Self::GreaterThan(operand) => compare(value, operand) == Some(Ordering::Greater),
            Self::LessThan(operand) => compare(value, operand) == Some(Ordering::Less),
            Self::GreaterThanOrEqualTo(operand) => matches!(
                compare(value, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::LessThanOrEqualTo(operand) => matches!(
                compare(value, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In(operands) => operands
                .iter()
                .any(|operand| compare(value, operand) == Some(Ordering::Equal)),
            Self::NotIn(operands) => operands
                .iter()
                .all(|operand| compare(value, operand) != Some(Ordering::Equal)),
            Self::Like(pattern) => value.as_str().is_some_and(|s| like(s, pattern)),
            Self::Unlike(pattern) => value.as_str().is_some_and(|s| !like(s, pattern)),
            Self::And(a, b) => a.eval(value) && b.eval(value),
            Self::Or(a, b) => a.eval(value) || b.eval(value),
            Self::Not(inner) => !inner.eval(value),
        }
    }
}

impl EntryFilter for Predicate {
    fn matches(&self, entry: &Entry) -> bool {
        self.eval(&entry.value)
    }
}

/// Orders two values of compatible kinds. Integer tags compare exactly,
/// mixed numeric tags compare as `f64`; any other kind mismatch is `None`.
fn compare(a: &TypedValue, b: &TypedValue) -> Option<Ordering> {
    use TypedValue as V;
    match (a, b) {
        (V::Integer(x), V::Integer(y)) => Some(x.cmp(y)),
        (V::Integer(x), V::Long(y)) => Some(i64::from(*x).cmp(y)),
        (V::Long(x), V::Integer(y)) => Some(x.cmp(&i64::from(*y))),
        (V::Long(x), V::Long(y)) => Some(x.cmp(y)),
        (V::String(x), V::String(y)) => Some(x.cmp(y)),
        (V::Boolean(x), V::Boolean(y)) => Some(x.cmp(y)),
        (V::ByteArray(x), V::ByteArray(y)) => Some(x.cmp(y)),
        _ => a.as_number()?.partial_cmp(&b.as_number()?),
    }
}

fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    // Position of the last `%` and the text index it was matched against.
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                resume = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '_' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    resume = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}
