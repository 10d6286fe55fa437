// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::expression::InfixOperator;

/// Insertion-ordered mapping used for Liquid objects and render globals.
pub type Object = IndexMap<String, Value>;

/// Capability implemented by host objects that expose a curated view to
/// templates, distinct from their native shape.
pub trait DropObject: fmt::Debug + Send + Sync {
    /// Resolves one path segment against the drop.
    fn liquid_get(&self, key: &str) -> Option<Value>;

    /// Optional projection of the whole drop into a plain Liquid value,
    /// consulted before comparison and truthiness checks.
    fn to_liquid(&self) -> Option<Value> {
        None
    }

    /// Name used when the drop itself is rendered or appears in messages.
    fn drop_name(&self) -> &str {
        "drop"
    }
}

/// Policy deciding how a failed identifier lookup behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedPolicy {
    /// All operations on the undefined value yield empty/zero results.
    Lax,
    /// Any use of the undefined value raises [`Error::Undefined`].
    Strict,
    /// Like `Strict`, except the value may flow into a leading `default`
    /// filter.
    StrictDefault,
    /// Like `Lax`, but the string form names the missing path.
    Debug,
}

impl Default for UndefinedPolicy {
    fn default() -> Self {
        UndefinedPolicy::Lax
    }
}

/// Sentinel produced when identifier resolution fails.
#[derive(Debug, Clone)]
pub struct Undefined {
    pub policy: UndefinedPolicy,
    pub path: String,
}

impl Undefined {
    pub fn new(policy: UndefinedPolicy, path: impl Into<String>) -> Self {
        Self {
            policy,
            path: path.into(),
        }
    }

    /// Raises under the strict policies, passes otherwise.
    pub fn check(&self) -> Result<(), Error> {
        match self.policy {
            UndefinedPolicy::Strict | UndefinedPolicy::StrictDefault => {
                Err(Error::undefined(format!("'{}' is undefined", self.path)))
            }
            UndefinedPolicy::Lax | UndefinedPolicy::Debug => Ok(()),
        }
    }

    /// String form written by output statements.
    pub fn output(&self) -> Result<String, Error> {
        match self.policy {
            UndefinedPolicy::Lax => Ok(String::new()),
            UndefinedPolicy::Debug => Ok(format!("'{}' is undefined", self.path)),
            UndefinedPolicy::Strict | UndefinedPolicy::StrictDefault => {
                Err(Error::undefined(format!("'{}' is undefined", self.path)))
            }
        }
    }
}

/// Runtime value produced by expression evaluation.
///
/// All template polymorphism (equality, truthiness, iteration, member
/// access) routes through this variant rather than host-language traits.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    /// Inclusive integer range. A `start` greater than `stop` is empty.
    Range(i64, i64),
    Drop(Arc<dyn DropObject>),
    Undefined(Undefined),
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Drop(a), Value::Drop(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                match (a.to_liquid(), b.to_liquid()) {
                    (Some(left), Some(right)) => left == right,
                    _ => false,
                }
            }
            (Value::Drop(a), right) => a.to_liquid().is_some_and(|left| &left == right),
            (left, Value::Drop(b)) => b.to_liquid().is_some_and(|right| left == &right),
            (Value::Nil, Value::Nil) => true,
            (Value::Nil, Value::Undefined(_)) | (Value::Undefined(_), Value::Nil) => true,
            (Value::Undefined(_), Value::Undefined(_)) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Range(a0, a1), Value::Range(b0, b1)) => a0 == b0 && a1 == b1,
            _ => false,
        }
    }
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "hash",
            Value::Range(..) => "range",
            Value::Drop(_) => "drop",
            Value::Undefined(_) => "undefined",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Converts the value into its JSON shape. Drops project through
    /// `to_liquid` first; undefined values become `null`; ranges become
    /// arrays of integers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil | Value::Undefined(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Range(start, stop) => {
                if start > stop {
                    serde_json::Value::Array(Vec::new())
                } else {
                    serde_json::Value::Array((*start..=*stop).map(serde_json::Value::from).collect())
                }
            }
            Value::Drop(drop) => drop
                .to_liquid()
                .map_or(serde_json::Value::Null, |value| value.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Int(u as i64)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Replaces a drop with its projected Liquid value where one exists.
fn project(value: &Value) -> Value {
    if let Value::Drop(drop) = value {
        if let Some(projected) = drop.to_liquid() {
            return projected;
        }
    }
    value.clone()
}

/// Liquid truthiness: everything except `false`, `nil` and undefined is
/// truthy, including empty strings, zero and empty collections.
pub fn is_truthy(value: &Value) -> bool {
    match project(value) {
        Value::Nil | Value::Bool(false) | Value::Undefined(_) => false,
        _ => true,
    }
}

/// Matches the `empty` keyword: empty strings, arrays and hashes only.
pub fn is_empty(value: &Value) -> bool {
    match project(value) {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Matches the `blank` keyword: whitespace-only strings plus everything
/// `empty` matches.
pub fn is_blank(value: &Value) -> bool {
    match project(value) {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Raises when a strict undefined value is used in an expression.
pub fn require_defined(value: Value) -> Result<Value, Error> {
    if let Value::Undefined(undefined) = &value {
        undefined.check()?;
    }
    Ok(value)
}

/// Best-effort integer coercion used by range endpoints and loop
/// arguments. Non-numeric values coerce to zero; floats truncate.
pub fn coerce_i64(value: &Value) -> i64 {
    match project(value) {
        Value::Int(i) => i,
        Value::Float(f) => {
            if f >= i64::MAX as f64 {
                i64::MAX
            } else if f <= i64::MIN as f64 {
                i64::MIN
            } else {
                f as i64
            }
        }
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

/// Coerces a value to the string written by output statements.
///
/// Booleans become `true`/`false`, nil and lax undefined become the empty
/// string, floats keep a trailing `.0`, sequences concatenate their
/// elements and mappings render as nothing.
pub fn to_output_string(value: &Value) -> Result<String, Error> {
    match value {
        Value::Nil => Ok(String::new()),
        Value::Undefined(undefined) => undefined.output(),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(format_float(*f)),
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => {
            let mut out = String::new();
            for item in items {
                out.push_str(&to_output_string(item)?);
            }
            Ok(out)
        }
        Value::Object(_) => Ok(String::new()),
        Value::Range(start, stop) => Ok(format!("{start}..{stop}")),
        Value::Drop(drop) => match drop.to_liquid() {
            Some(projected) => to_output_string(&projected),
            None => Ok(String::new()),
        },
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

/// HTML-escapes the five significant characters. Used by the autoescape
/// path and re-exported for the `escape` filter.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Applies an infix comparison operator to two evaluated operands.
///
/// Equality is structural, `contains` covers substrings, array membership
/// and hash keys, and ordered comparison is defined for numbers only.
pub fn compare(left: &Value, operator: &InfixOperator, right: &Value) -> Result<Value, Error> {
    let left = project(left);
    let right = project(right);

    match operator {
        InfixOperator::And | InfixOperator::Or => Err(Error::type_error(
            "logical operators are handled by the expression evaluator",
        )),
        InfixOperator::Equal => Ok(Value::Bool(left == right)),
        InfixOperator::NotEqual => Ok(Value::Bool(left != right)),
        InfixOperator::Contains => contains(&left, &right),
        InfixOperator::Less
        | InfixOperator::LessOrEqual
        | InfixOperator::Greater
        | InfixOperator::GreaterOrEqual => {
            if matches!(left, Value::Nil | Value::Undefined(_))
                || matches!(right, Value::Nil | Value::Undefined(_))
            {
                return Ok(Value::Bool(false));
            }
            match (left.as_float(), right.as_float()) {
                (Some(a), Some(b)) => {
                    let result = match operator {
                        InfixOperator::Less => a < b,
                        InfixOperator::LessOrEqual => a <= b,
                        InfixOperator::Greater => a > b,
                        InfixOperator::GreaterOrEqual => a >= b,
                        _ => unreachable!("non-ordering operator in ordering arm"),
                    };
                    Ok(Value::Bool(result))
                }
                _ => Err(Error::type_error(format!(
                    "invalid operator for types '{} {} {}'",
                    left.type_name(),
                    operator,
                    right.type_name()
                ))),
            }
        }
    }
}

fn contains(left: &Value, right: &Value) -> Result<Value, Error> {
    match left {
        Value::String(haystack) => {
            let needle = to_output_string(right)?;
            Ok(Value::Bool(haystack.contains(&needle)))
        }
        Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| item == right))),
        Value::Object(map) => {
            let key = to_output_string(right)?;
            Ok(Value::Bool(map.contains_key(&key)))
        }
        _ => Err(Error::type_error(format!(
            "'{}' does not support 'contains'",
            left.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_and_zero_are_truthy() {
        assert!(is_truthy(&Value::String(String::new())));
        assert!(is_truthy(&Value::Int(0)));
        assert!(is_truthy(&Value::Array(Vec::new())));
        assert!(!is_truthy(&Value::Nil));
        assert!(!is_truthy(&Value::Bool(false)));
    }

    #[test]
    fn blank_matches_whitespace_only_strings() {
        assert!(is_blank(&Value::String("  \t\n".into())));
        assert!(is_blank(&Value::Array(Vec::new())));
        assert!(!is_blank(&Value::String("x".into())));
        assert!(!is_blank(&Value::Int(0)));
    }

    #[test]
    fn empty_does_not_match_nil_or_zero() {
        assert!(is_empty(&Value::String(String::new())));
        assert!(!is_empty(&Value::Nil));
        assert!(!is_empty(&Value::Int(0)));
    }

    #[test]
    fn mixed_numeric_equality() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::String("1".into()));
    }

    #[test]
    fn float_output_keeps_trailing_zero() {
        assert_eq!(to_output_string(&Value::Float(5.0)).unwrap(), "5.0");
        assert_eq!(to_output_string(&Value::Float(5.25)).unwrap(), "5.25");
    }

    #[test]
    fn sequences_concatenate_for_output() {
        let value = Value::Array(vec![Value::Int(1), Value::String("a".into()), Value::Nil]);
        assert_eq!(to_output_string(&value).unwrap(), "1a");
    }

    #[test]
    fn ordered_comparison_requires_numbers() {
        let err = compare(
            &Value::String("a".into()),
            &InfixOperator::Less,
            &Value::String("b".into()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Type { .. }));

        let ok = compare(&Value::Int(1), &InfixOperator::Less, &Value::Float(1.5)).unwrap();
        assert_eq!(ok, Value::Bool(true));
    }

    #[test]
    fn contains_covers_strings_arrays_and_hashes() {
        let haystack = Value::String("hello world".into());
        assert_eq!(
            contains(&haystack, &Value::String("world".into())).unwrap(),
            Value::Bool(true)
        );

        let items = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(contains(&items, &Value::Int(2)).unwrap(), Value::Bool(true));

        let mut map = Object::new();
        map.insert("key".into(), Value::Nil);
        assert_eq!(
            contains(&Value::Object(map), &Value::String("key".into())).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn strict_undefined_raises_on_use() {
        let undefined = Value::Undefined(Undefined::new(UndefinedPolicy::Strict, "nope"));
        assert!(require_defined(undefined).is_err());

        let lax = Value::Undefined(Undefined::new(UndefinedPolicy::Lax, "nope"));
        assert!(require_defined(lax).is_ok());
    }

    #[test]
    fn debug_undefined_names_the_missing_path() {
        let undefined = Undefined::new(UndefinedPolicy::Debug, "user.name");
        assert!(undefined.output().unwrap().contains("user.name"));
    }
}
