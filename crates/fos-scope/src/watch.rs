//! Watcher registry
//!
//! Watchers are kept newest-first on the scope that registered them. A
//! deregistered watcher is flagged before it leaves the list, so a digest
//! walking an older snapshot of the list skips it.

use crate::Scope;
use fos_value::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Boxed watch function
pub type WatchFn = Box<dyn Fn(&Scope) -> anyhow::Result<Value>>;

/// Boxed listener, called with `(new, old, scope)`
pub type ListenerFn = Box<dyn Fn(&Value, &Value, &Scope) -> anyhow::Result<()>>;

/// How a watcher decides its value changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Equality {
    /// Identity: containers only change when replaced
    #[default]
    Reference,
    /// Structure: in-place mutation of containers counts as a change
    Deep,
}

impl Equality {
    pub fn are_equal(self, new: &Value, old: &Value) -> bool {
        match self {
            Equality::Reference => new.identical(old),
            Equality::Deep => new.deep_eq(old),
        }
    }

    /// What to remember as the last seen value
    pub(crate) fn snapshot(self, value: &Value) -> Value {
        match self {
            Equality::Reference => value.clone(),
            Equality::Deep => value.deep_clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WatchId(pub(crate) u64);

pub(crate) struct WatchRecord {
    pub id: WatchId,
    pub watch_fn: WatchFn,
    pub listener: Option<ListenerFn>,
    pub equality: Equality,
    /// None until the first evaluation
    pub last: RefCell<Option<Value>>,
    pub removed: Cell<bool>,
}

/// Removes a watcher or event listener when destroyed
///
/// Clones share the same registration. Dropping the handle leaves the
/// registration in place.
#[derive(Clone, Default)]
pub struct Deregistration {
    action: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl Deregistration {
    pub(crate) fn new(action: impl FnOnce() + 'static) -> Self {
        Self { action: Rc::new(RefCell::new(Some(Box::new(action)))) }
    }

    /// Handle that has nothing to remove
    pub(crate) fn inert() -> Self {
        Self::default()
    }

    /// Remove the registration; later calls do nothing
    pub fn destroy(&self) {
        let action = self.action.borrow_mut().take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_active(&self) -> bool {
        self.action.borrow().is_some()
    }
}

impl fmt::Debug for Deregistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deregistration").field("active", &self.is_active()).finish()
    }
}

impl Scope {
    /// Watch a value by identity
    ///
    /// The listener runs on the first digest after registration, with the
    /// old value equal to the new one, and afterwards whenever the watched
    /// value changes.
    pub fn watch<W, L>(&self, watch_fn: W, listener: L) -> Deregistration
    where
        W: Fn(&Scope) -> anyhow::Result<Value> + 'static,
        L: Fn(&Value, &Value, &Scope) -> anyhow::Result<()> + 'static,
    {
        self.register_watch(Box::new(watch_fn), Some(Box::new(listener)), Equality::Reference)
    }

    /// Watch a value by structure
    pub fn watch_deep<W, L>(&self, watch_fn: W, listener: L) -> Deregistration
    where
        W: Fn(&Scope) -> anyhow::Result<Value> + 'static,
        L: Fn(&Value, &Value, &Scope) -> anyhow::Result<()> + 'static,
    {
        self.register_watch(Box::new(watch_fn), Some(Box::new(listener)), Equality::Deep)
    }

    /// Watcher without a listener; it still makes a digest dirty
    pub fn watch_only<W>(&self, watch_fn: W) -> Deregistration
    where
        W: Fn(&Scope) -> anyhow::Result<Value> + 'static,
    {
        self.register_watch(Box::new(watch_fn), None, Equality::Reference)
    }

    /// Watch with an explicit equality mode and optional listener
    pub fn watch_with(&self, watch_fn: WatchFn, listener: Option<ListenerFn>, equality: Equality) -> Deregistration {
        self.register_watch(watch_fn, listener, equality)
    }

    pub(crate) fn register_watch(
        &self,
        watch_fn: WatchFn,
        listener: Option<ListenerFn>,
        equality: Equality,
    ) -> Deregistration {
        let record = {
            let mut ctx = self.tree.borrow_mut();
            if ctx.record(self.id).is_none_or(|scope| scope.destroyed) {
                None
            } else {
                let record = Rc::new(WatchRecord {
                    id: ctx.next_watch_id(),
                    watch_fn,
                    listener,
                    equality,
                    last: RefCell::new(None),
                    removed: Cell::new(false),
                });
                if let Some(scope) = ctx.record_mut(self.id) {
                    scope.watchers.insert(0, record.clone());
                }
                ctx.last_dirty = None;
                Some(record)
            }
        };
        let Some(record) = record else {
            tracing::warn!("Ignoring watcher registered on destroyed scope {:?}", self.id);
            return Deregistration::inert();
        };

        let tree = Rc::downgrade(&self.tree);
        let scope_id = self.id;
        let watcher = Rc::downgrade(&record);
        Deregistration::new(move || {
            let Some(watcher) = watcher.upgrade() else { return };
            watcher.removed.set(true);
            if let Some(tree) = tree.upgrade() {
                let mut ctx = tree.borrow_mut();
                if let Some(scope) = ctx.record_mut(scope_id) {
                    scope.watchers.retain(|w| !Rc::ptr_eq(w, &watcher));
                }
                ctx.last_dirty = None;
            }
        })
    }
}
