//! Shared containers
//!
//! Arrays and records are reference types: cloning a handle shares the
//! underlying storage, so a mutation made through one handle is seen by
//! every other handle to the same container.

use crate::Value;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Shared, growable list of values
#[derive(Clone, Default)]
pub struct Array {
    elements: Rc<RefCell<Vec<Value>>>,
}

impl Array {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(cap: usize) -> Self {
        Self::from_vec(Vec::with_capacity(cap))
    }

    pub fn from_vec(elements: Vec<Value>) -> Self {
        Self { elements: Rc::new(RefCell::new(elements)) }
    }

    pub fn len(&self) -> usize { self.elements.borrow().len() }
    pub fn is_empty(&self) -> bool { self.elements.borrow().is_empty() }

    /// Element at `idx`, or `Undefined` past the end
    pub fn get(&self, idx: usize) -> Value {
        self.elements.borrow().get(idx).cloned().unwrap_or(Value::Undefined)
    }

    /// Store at `idx`, padding with `Undefined` when writing past the end
    pub fn set(&self, idx: usize, value: impl Into<Value>) {
        let mut elements = self.elements.borrow_mut();
        if idx >= elements.len() {
            elements.resize(idx + 1, Value::Undefined);
        }
        elements[idx] = value.into();
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.elements.borrow_mut().push(value.into());
    }

    pub fn pop(&self) -> Value {
        self.elements.borrow_mut().pop().unwrap_or(Value::Undefined)
    }

    pub fn insert(&self, idx: usize, value: impl Into<Value>) {
        let mut elements = self.elements.borrow_mut();
        let idx = idx.min(elements.len());
        elements.insert(idx, value.into());
    }

    pub fn remove(&self, idx: usize) -> Value {
        let mut elements = self.elements.borrow_mut();
        if idx < elements.len() { elements.remove(idx) } else { Value::Undefined }
    }

    pub fn shift(&self) -> Value { self.remove(0) }

    /// Truncate or pad to `len`
    pub fn set_len(&self, len: usize) {
        self.elements.borrow_mut().resize(len, Value::Undefined);
    }

    pub fn clear(&self) { self.elements.borrow_mut().clear(); }
    pub fn reverse(&self) { self.elements.borrow_mut().reverse(); }

    /// Copy of the current elements (element handles are shared)
    pub fn to_vec(&self) -> Vec<Value> { self.elements.borrow().clone() }

    /// Borrow the elements for reading
    pub fn borrow(&self) -> Ref<'_, Vec<Value>> { self.elements.borrow() }

    /// True when both handles point at the same storage
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.elements, &other.elements)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.elements) as *const () as usize
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Shared string-keyed record
///
/// Keys iterate in sorted order.
#[derive(Clone, Default)]
pub struct Object {
    properties: Rc<RefCell<BTreeMap<String, Value>>>,
}

impl Object {
    pub fn new() -> Self { Self::default() }

    pub fn from_map(properties: BTreeMap<String, Value>) -> Self {
        Self { properties: Rc::new(RefCell::new(properties)) }
    }

    /// Property value, or `Undefined` when absent
    pub fn get(&self, key: &str) -> Value {
        self.properties.borrow().get(key).cloned().unwrap_or(Value::Undefined)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.properties.borrow_mut().insert(key.to_string(), value.into());
    }

    pub fn delete(&self, key: &str) -> bool {
        self.properties.borrow_mut().remove(key).is_some()
    }

    pub fn has(&self, key: &str) -> bool { self.properties.borrow().contains_key(key) }
    pub fn len(&self) -> usize { self.properties.borrow().len() }
    pub fn is_empty(&self) -> bool { self.properties.borrow().is_empty() }

    pub fn keys(&self) -> Vec<String> {
        self.properties.borrow().keys().cloned().collect()
    }

    /// Copy of the current entries (value handles are shared)
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.properties.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> { self.properties.borrow().clone() }

    /// Borrow the properties for reading
    pub fn borrow(&self) -> Ref<'_, BTreeMap<String, Value>> { self.properties.borrow() }

    /// True when both handles point at the same storage
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.properties, &other.properties)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.properties) as *const () as usize
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
