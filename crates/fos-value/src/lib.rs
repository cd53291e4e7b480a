//! fOS Values
//!
//! Dynamic values stored in scope data and produced by watch functions.
//!
//! Scalars are compared by value. Arrays and records are shared handles,
//! so two values may hold the same container; [`Value::identical`] tells
//! those apart from structurally equal copies, while `==` compares
//! structure.

mod equality;
mod json;
mod object;

pub use object::{Array, Object};

use std::fmt;
use std::rc::Rc;

/// Dynamic value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Array),
    Object(Object),
}

impl Value {
    /// Build an array value from any sequence of convertible items
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Build a record value from key/value pairs
    pub fn object<K: Into<String>, T: Into<Value>>(entries: impl IntoIterator<Item = (K, T)>) -> Self {
        Value::Object(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }

    #[inline]
    pub fn is_undefined(&self) -> bool { matches!(self, Value::Undefined) }

    #[inline]
    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    #[inline]
    pub fn is_number(&self) -> bool { matches!(self, Value::Number(_)) }

    #[inline]
    pub fn is_string(&self) -> bool { matches!(self, Value::String(_)) }

    #[inline]
    pub fn is_array(&self) -> bool { matches!(self, Value::Array(_)) }

    #[inline]
    pub fn is_object(&self) -> bool { matches!(self, Value::Object(_)) }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Storage address of an array or record
    pub(crate) fn container_addr(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(a.addr()),
            Value::Object(o) => Some(o.addr()),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Numeric coercion (`undefined` and containers become NaN)
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Null => 0.0,
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() { 0.0 } else { trimmed.parse().unwrap_or(f64::NAN) }
            }
            Value::Undefined | Value::Array(_) | Value::Object(_) => f64::NAN,
        }
    }
}

// === Conversions ===

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self { Value::Number(n) }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self { Value::Number(n as f64) }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self { Value::Number(n as f64) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Number(n as f64) }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self { Value::Number(n as f64) }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self { Value::Number(n as f64) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.into()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s.into()) }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self { Value::String(s) }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self { Value::Array(Array::from_vec(items)) }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self { Value::Array(a) }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self { Value::Object(o) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// === Formatting ===

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Nested::top(self).display(f)
    }
}

fn fmt_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{}", n)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Nested::top(self), f)
    }
}

/// A value together with the containers enclosing it
///
/// Walking the chain finds containers that hold themselves; those are
/// written as `[Circular]` (or `null` in JSON) instead of recursing.
pub(crate) struct Nested<'a> {
    pub value: &'a Value,
    outer: Option<&'a Nested<'a>>,
}

impl<'a> Nested<'a> {
    pub fn top(value: &'a Value) -> Self {
        Self { value, outer: None }
    }

    pub fn inner<'b>(&'b self, value: &'b Value) -> Nested<'b>
    where
        'a: 'b,
    {
        Nested { value, outer: Some(self) }
    }

    /// Whether an enclosing level is this same container
    pub fn is_cycle(&self) -> bool {
        let Some(addr) = self.value.container_addr() else { return false };
        let mut outer = self.outer;
        while let Some(level) = outer {
            if level.value.container_addr() == Some(addr) {
                return true;
            }
            outer = level.outer;
        }
        false
    }

    fn display(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => fmt_number(f, *n),
            Value::String(s) => f.write_str(s),
            Value::Array(_) if self.is_cycle() => f.write_str("[Circular]"),
            Value::Array(a) => {
                for (i, item) in a.to_vec().iter().enumerate() {
                    if i > 0 { f.write_str(",")?; }
                    match item {
                        Value::Undefined | Value::Null => {}
                        other => self.inner(other).display(f)?,
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
        }
    }
}

impl fmt::Debug for Nested<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cycle() {
            return f.write_str("[Circular]");
        }
        match self.value {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(a) => {
                let items = a.to_vec();
                f.debug_list().entries(items.iter().map(|item| self.inner(item))).finish()
            }
            Value::Object(o) => {
                let entries = o.entries();
                f.debug_map()
                    .entries(entries.iter().map(|(key, item)| (key, self.inner(item))))
                    .finish()
            }
            _ => self.display(f),
        }
    }
}
