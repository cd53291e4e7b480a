//! Identity, structural equality and copying
//!
//! `identical` is the cheap check used by reference watchers: containers
//! match only when they are the same storage. `deep_eq` walks containers
//! and is what `==` means for `Value`. Both treat NaN as equal to NaN.

use crate::{Array, Object, Value};
use std::collections::HashMap;

impl Value {
    /// Identity comparison
    ///
    /// Scalars compare by value, strings by content, arrays and records by
    /// storage. NaN is identical to NaN so an unchanged NaN never looks dirty.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Structural comparison
    ///
    /// Containers are equal when they hold equal elements (arrays) or the same
    /// key set with equal values (records). Reference cycles are tolerated.
    pub fn deep_eq(&self, other: &Value) -> bool {
        deep_eq_inner(self, other, &mut Vec::new())
    }

    /// Independent copy of the whole value graph
    ///
    /// Shared sub-containers stay shared within the copy, and cycles are
    /// reproduced rather than followed forever.
    pub fn deep_clone(&self) -> Value {
        deep_clone_inner(self, &mut HashMap::new())
    }

    /// New top-level container holding the same element handles
    pub fn shallow_clone(&self) -> Value {
        match self {
            Value::Array(a) => Value::Array(Array::from_vec(a.to_vec())),
            Value::Object(o) => Value::Object(Object::from_map(o.to_map())),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

#[inline]
fn numbers_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn deep_eq_inner(a: &Value, b: &Value, seen: &mut Vec<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let pair = (x.addr(), y.addr());
            if seen.contains(&pair) {
                return true;
            }
            let (xs, ys) = (x.to_vec(), y.to_vec());
            if xs.len() != ys.len() {
                return false;
            }
            seen.push(pair);
            let equal = xs.iter().zip(ys.iter()).all(|(l, r)| deep_eq_inner(l, r, seen));
            seen.pop();
            equal
        }
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let pair = (x.addr(), y.addr());
            if seen.contains(&pair) {
                return true;
            }
            let (xs, ys) = (x.to_map(), y.to_map());
            if xs.len() != ys.len() {
                return false;
            }
            seen.push(pair);
            let equal = xs.iter().all(|(key, l)| match ys.get(key) {
                Some(r) => deep_eq_inner(l, r, seen),
                None => false,
            });
            seen.pop();
            equal
        }
        _ => a.identical(b),
    }
}

fn deep_clone_inner(value: &Value, copies: &mut HashMap<usize, Value>) -> Value {
    match value {
        Value::Array(a) => {
            if let Some(copy) = copies.get(&a.addr()) {
                return copy.clone();
            }
            let copy = Array::with_capacity(a.len());
            copies.insert(a.addr(), Value::Array(copy.clone()));
            for item in a.to_vec() {
                copy.push(deep_clone_inner(&item, copies));
            }
            Value::Array(copy)
        }
        Value::Object(o) => {
            if let Some(copy) = copies.get(&o.addr()) {
                return copy.clone();
            }
            let copy = Object::new();
            copies.insert(o.addr(), Value::Object(copy.clone()));
            for (key, item) in o.entries() {
                copy.set(&key, deep_clone_inner(&item, copies));
            }
            Value::Object(copy)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_identical() {
        let nan = Value::Number(f64::NAN);
        assert!(nan.identical(&Value::Number(f64::NAN)));
        assert_eq!(nan, Value::Number(f64::NAN));
        assert!(!nan.identical(&Value::from(0)));
    }

    #[test]
    fn test_strings_compare_by_content() {
        assert!(Value::from("abc").identical(&Value::from(String::from("abc"))));
        assert!(!Value::from("abc").identical(&Value::from("abd")));
    }

    #[test]
    fn test_containers_identity_vs_structure() {
        let a = Value::array([1, 2, 3]);
        let b = Value::array([1, 2, 3]);
        assert!(!a.identical(&b));
        assert!(a.deep_eq(&b));
        assert!(a.identical(&a.clone()));
    }

    #[test]
    fn test_undefined_is_not_null() {
        assert!(!Value::Undefined.identical(&Value::Null));
        assert_ne!(Value::Undefined, Value::Null);
    }

    #[test]
    fn test_deep_eq_records() {
        let a = Value::object([("x", Value::from(1)), ("y", Value::array([1, 2]))]);
        let b = Value::object([("y", Value::array([1, 2])), ("x", Value::from(1))]);
        assert_eq!(a, b);

        let c = Value::object([("x", Value::from(1))]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let original = Value::object([("list", Value::array([1, 2]))]);
        let copy = original.deep_clone();
        assert_eq!(original, copy);

        original.as_object().unwrap().get("list").as_array().unwrap().push(3);
        assert_ne!(original, copy);
    }

    #[test]
    fn test_deep_clone_keeps_cycles() {
        let node = Object::new();
        node.set("self", Value::Object(node.clone()));
        let copy = Value::Object(node.clone()).deep_clone();

        let copied = copy.as_object().unwrap();
        assert!(!copied.ptr_eq(&node));
        assert!(copied.get("self").as_object().unwrap().ptr_eq(copied));
        assert!(copy.deep_eq(&Value::Object(node)));
    }

    #[test]
    fn test_shallow_clone_shares_elements() {
        let inner = Value::array([1]);
        let outer = Value::array([inner.clone()]);
        let copy = outer.shallow_clone();
        assert!(!copy.identical(&outer));
        assert!(copy.as_array().unwrap().get(0).identical(&inner));
    }
}
