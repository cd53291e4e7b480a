//! Composite watches
//!
//! [`Scope::watch_group`] folds several watchers into one listener call per
//! digest. [`Scope::watch_collection`] notices element and key changes in
//! arrays and records without copying them deeply.

use crate::watch::{Deregistration, Equality, WatchFn};
use crate::Scope;
use fos_value::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Box a closure as a [`WatchFn`], for building watch groups
pub fn watch_fn(f: impl Fn(&Scope) -> anyhow::Result<Value> + 'static) -> WatchFn {
    Box::new(f)
}

struct GroupState {
    new_values: Vec<Value>,
    old_values: Vec<Value>,
    scheduled: bool,
    first_run: bool,
    destroyed: bool,
}

/// Last observed shape of a watched collection
enum Shape {
    Scalar(Value),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Shape {
    /// Bring the cache in line with `value`, returning how many changes were seen
    fn observe(&mut self, value: &Value) -> u64 {
        let mut changes = 0;
        match value {
            Value::Array(array) => {
                if !matches!(self, Shape::Array(_)) {
                    *self = Shape::Array(Vec::new());
                    changes += 1;
                }
                if let Shape::Array(old) = self {
                    let items = array.to_vec();
                    if old.len() != items.len() {
                        changes += 1;
                        old.resize(items.len(), Value::Undefined);
                    }
                    for (slot, item) in old.iter_mut().zip(items) {
                        if !slot.identical(&item) {
                            changes += 1;
                            *slot = item;
                        }
                    }
                }
            }
            Value::Object(object) => {
                if !matches!(self, Shape::Object(_)) {
                    *self = Shape::Object(BTreeMap::new());
                    changes += 1;
                }
                if let Shape::Object(old) = self {
                    let entries = object.to_map();
                    for (key, item) in &entries {
                        match old.get_mut(key) {
                            Some(slot) if slot.identical(item) => {}
                            Some(slot) => {
                                changes += 1;
                                *slot = item.clone();
                            }
                            None => {
                                changes += 1;
                                old.insert(key.clone(), item.clone());
                            }
                        }
                    }
                    if old.len() > entries.len() {
                        changes += 1;
                        old.retain(|key, _| entries.contains_key(key));
                    }
                }
            }
            scalar => {
                let same = matches!(self, Shape::Scalar(previous) if previous.identical(scalar));
                if !same {
                    *self = Shape::Scalar(scalar.clone());
                    changes += 1;
                }
            }
        }
        changes
    }
}

struct CollectionState {
    shape: Shape,
    current: Value,
    /// Shallow copy of the collection handed to the previous listener call
    previous: Value,
    change_count: u64,
    first_run: bool,
}

impl Scope {
    /// Watch several values, reporting them together
    ///
    /// The listener is called at most once per digest with every current
    /// value and the values each watcher last changed from; on the first
    /// call both slices hold the current values. With no watch functions
    /// the listener is called once, asynchronously, with two empty slices.
    pub fn watch_group<L>(&self, watch_fns: Vec<WatchFn>, listener: L) -> Deregistration
    where
        L: Fn(&[Value], &[Value], &Scope) -> anyhow::Result<()> + 'static,
    {
        if watch_fns.is_empty() {
            let cancelled = Rc::new(Cell::new(false));
            let skip = cancelled.clone();
            self.eval_async(move |scope| {
                if skip.get() {
                    return Ok(());
                }
                listener(&[], &[], scope)
            });
            return Deregistration::new(move || cancelled.set(true));
        }

        let listener = Rc::new(listener);
        let state = Rc::new(RefCell::new(GroupState {
            new_values: vec![Value::Undefined; watch_fns.len()],
            old_values: vec![Value::Undefined; watch_fns.len()],
            scheduled: false,
            first_run: true,
            destroyed: false,
        }));

        let mut inner = Vec::with_capacity(watch_fns.len());
        for (index, watch_fn) in watch_fns.into_iter().enumerate() {
            let state = state.clone();
            let listener = listener.clone();
            let on_change = move |new: &Value, old: &Value, scope: &Scope| -> anyhow::Result<()> {
                {
                    let mut group = state.borrow_mut();
                    group.new_values[index] = new.clone();
                    group.old_values[index] = old.clone();
                    if group.scheduled {
                        return Ok(());
                    }
                    group.scheduled = true;
                }
                let state = state.clone();
                let listener = listener.clone();
                scope.eval_async(move |scope| {
                    let (new_values, old_values) = {
                        let mut group = state.borrow_mut();
                        group.scheduled = false;
                        if group.destroyed {
                            return Ok(());
                        }
                        let old_values = if group.first_run {
                            group.first_run = false;
                            group.new_values.clone()
                        } else {
                            group.old_values.clone()
                        };
                        (group.new_values.clone(), old_values)
                    };
                    listener(&new_values, &old_values, scope)
                });
                Ok(())
            };
            inner.push(self.register_watch(watch_fn, Some(Box::new(on_change)), Equality::Reference));
        }

        Deregistration::new(move || {
            state.borrow_mut().destroyed = true;
            for watcher in &inner {
                watcher.destroy();
            }
        })
    }

    /// Watch an array or record for shallow changes
    ///
    /// Replacing the collection, resizing it, adding or removing keys, or
    /// replacing an element all count as changes; mutations deeper down do
    /// not. The listener receives the current collection and a shallow copy
    /// of what it was at the previous call.
    pub fn watch_collection<W, L>(&self, watch_fn: W, listener: L) -> Deregistration
    where
        W: Fn(&Scope) -> anyhow::Result<Value> + 'static,
        L: Fn(&Value, &Value, &Scope) -> anyhow::Result<()> + 'static,
    {
        let state = Rc::new(RefCell::new(CollectionState {
            shape: Shape::Scalar(Value::Undefined),
            current: Value::Undefined,
            previous: Value::Undefined,
            change_count: 0,
            first_run: true,
        }));

        let observed = state.clone();
        let detect = move |scope: &Scope| -> anyhow::Result<Value> {
            let value = watch_fn(scope)?;
            let mut collection = observed.borrow_mut();
            let changes = collection.shape.observe(&value);
            collection.change_count += changes;
            collection.current = value;
            Ok(Value::Number(collection.change_count as f64))
        };

        let on_change = move |_: &Value, _: &Value, scope: &Scope| -> anyhow::Result<()> {
            let (current, previous) = {
                let mut collection = state.borrow_mut();
                let current = collection.current.clone();
                let previous = if collection.first_run {
                    collection.first_run = false;
                    current.clone()
                } else {
                    collection.previous.clone()
                };
                (current, previous)
            };
            let result = listener(&current, &previous, scope);
            state.borrow_mut().previous = current.shallow_clone();
            result
        };

        self.register_watch(Box::new(detect), Some(Box::new(on_change)), Equality::Reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventLoop;

    #[test]
    fn test_shape_array_changes() {
        let mut shape = Shape::Scalar(Value::Undefined);
        let items = Value::array([1, 2]);
        assert!(shape.observe(&items) > 0);
        assert_eq!(shape.observe(&items), 0);

        items.as_array().unwrap().push(3);
        assert!(shape.observe(&items) > 0);

        items.as_array().unwrap().set(0, 9);
        assert_eq!(shape.observe(&items), 1);

        items.as_array().unwrap().reverse();
        assert!(shape.observe(&items) > 0);
    }

    #[test]
    fn test_shape_nan_is_stable() {
        let mut shape = Shape::Scalar(Value::Undefined);
        let items = Value::array([Value::Number(f64::NAN)]);
        shape.observe(&items);
        assert_eq!(shape.observe(&items), 0);

        let nan = Value::Number(f64::NAN);
        shape.observe(&nan);
        assert_eq!(shape.observe(&nan), 0);
    }

    #[test]
    fn test_shape_object_changes() {
        let mut shape = Shape::Scalar(Value::Undefined);
        let record = Value::object([("a", 1)]);
        assert!(shape.observe(&record) > 0);
        assert_eq!(shape.observe(&record), 0);

        let object = record.as_object().unwrap();
        object.set("b", 2);
        assert_eq!(shape.observe(&record), 1);

        object.delete("a");
        assert_eq!(shape.observe(&record), 1);
    }

    #[test]
    fn test_shape_ignores_nested_mutation() {
        let mut shape = Shape::Scalar(Value::Undefined);
        let inner = Value::array([1]);
        let outer = Value::array([inner.clone()]);
        shape.observe(&outer);

        inner.as_array().unwrap().push(2);
        assert_eq!(shape.observe(&outer), 0);
    }

    #[test]
    fn test_shape_type_transition() {
        let mut shape = Shape::Scalar(Value::Undefined);
        assert_eq!(shape.observe(&Value::Undefined), 0);
        assert!(shape.observe(&Value::array(Vec::<Value>::new())) > 0);
        assert!(shape.observe(&Value::object(Vec::<(String, Value)>::new())) > 0);
        assert!(shape.observe(&Value::from("text")) > 0);
    }

    #[test]
    fn test_group_first_call_and_dedup() {
        let root = Scope::new_root(EventLoop::new());
        root.set("a", 1);
        root.set("b", 2);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let log = calls.clone();
        root.watch_group(
            vec![watch_fn(|scope| Ok(scope.get("a"))), watch_fn(|scope| Ok(scope.get("b")))],
            move |new, old, _| {
                log.borrow_mut().push((new.to_vec(), old.to_vec()));
                Ok(())
            },
        );

        root.digest().unwrap();
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0].0, vec![Value::from(1), Value::from(2)]);
        assert_eq!(calls.borrow()[0].1, vec![Value::from(1), Value::from(2)]);

        root.set("a", 10);
        root.set("b", 20);
        root.digest().unwrap();
        assert_eq!(calls.borrow().len(), 2);
        assert_eq!(calls.borrow()[1].0, vec![Value::from(10), Value::from(20)]);
        assert_eq!(calls.borrow()[1].1, vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn test_group_destroy_removes_watchers() {
        let root = Scope::new_root(EventLoop::new());
        let handle = root.watch_group(
            vec![watch_fn(|_| Ok(Value::Null)), watch_fn(|_| Ok(Value::Null))],
            |_, _, _| Ok(()),
        );
        assert_eq!(root.watcher_count(), 2);
        handle.destroy();
        assert_eq!(root.watcher_count(), 0);
    }
}
