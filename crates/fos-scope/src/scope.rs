//! Scope handles
//!
//! A [`Scope`] is a cheap handle onto one record of a scope tree. Clones
//! refer to the same scope.

use crate::config::ScopeConfig;
use crate::event_loop::TaskScheduler;
use crate::tree::{ScopeId, SharedTree, TreeContext};
use crate::{Phase, ScopeError};
use fos_value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// How a new scope relates to the data of the scope creating it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeKind {
    /// Reads unset keys from the creating scope
    #[default]
    Inherited,
    /// Sees no data but its own
    Isolated,
}

/// Handle to a scope
#[derive(Clone)]
pub struct Scope {
    pub(crate) tree: SharedTree,
    pub(crate) id: ScopeId,
}

impl Scope {
    /// Create a new tree with default configuration and return its root
    pub fn new_root(scheduler: impl TaskScheduler + 'static) -> Scope {
        Self::build(ScopeConfig::default(), Rc::new(scheduler))
    }

    /// Create a new tree with the given configuration
    pub fn new_root_with_config(
        config: ScopeConfig,
        scheduler: impl TaskScheduler + 'static,
    ) -> Result<Scope, ScopeError> {
        config.validate()?;
        Ok(Self::build(config, Rc::new(scheduler)))
    }

    fn build(config: ScopeConfig, scheduler: Rc<dyn TaskScheduler>) -> Scope {
        tracing::debug!("Creating scope tree (digest_ttl {})", config.digest_ttl);
        let tree = Rc::new(RefCell::new(TreeContext::new(config, scheduler)));
        Scope { tree, id: ScopeId::ROOT }
    }

    pub(crate) fn from_parts(tree: SharedTree, id: ScopeId) -> Scope {
        Scope { tree, id }
    }

    /// Create a scope whose data delegates to this one (unless isolated)
    ///
    /// The new scope is placed under `explicit_parent` if given, otherwise
    /// under this scope. Either way it takes part in the hierarchy parent's
    /// digests and events. A destroyed parent is rejected.
    pub fn create(&self, kind: ScopeKind, explicit_parent: Option<&Scope>) -> Result<Scope, ScopeError> {
        let parent = explicit_parent.unwrap_or(self);
        if !Rc::ptr_eq(&parent.tree, &self.tree) {
            return Err(ScopeError::ForeignTree);
        }
        self.spawn(kind, parent.id)
    }

    /// Inherited child of this scope
    ///
    /// On a destroyed scope this logs a warning and returns a handle that
    /// is already destroyed.
    pub fn new_child(&self) -> Scope {
        self.spawn_or_detached(ScopeKind::Inherited)
    }

    /// Isolated child of this scope
    pub fn new_isolated(&self) -> Scope {
        self.spawn_or_detached(ScopeKind::Isolated)
    }

    fn spawn_or_detached(&self, kind: ScopeKind) -> Scope {
        self.spawn(kind, self.id).unwrap_or_else(|e| {
            tracing::warn!("Cannot create {:?} scope under {:?}: {}", kind, self.id, e);
            Scope::from_parts(self.tree.clone(), ScopeId::DETACHED)
        })
    }

    fn spawn(&self, kind: ScopeKind, parent: ScopeId) -> Result<Scope, ScopeError> {
        let isolated = kind == ScopeKind::Isolated;
        let prototype = if isolated { None } else { Some(self.id) };
        let id = self.tree.borrow_mut().alloc(parent, prototype, isolated)?;
        tracing::debug!("Created {:?} scope {:?} under {:?}", kind, id, parent);
        Ok(Scope::from_parts(self.tree.clone(), id))
    }

    /// Tear this scope down
    ///
    /// Broadcasts `$destroy` first, then detaches the scope from its parent
    /// and releases it together with every descendant: watchers, listeners
    /// and data are dropped and the slots are reused by later scopes.
    /// Existing handles see a destroyed, empty scope. The root keeps its
    /// slot. Calling it again does nothing.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }
        self.broadcast("$destroy", &[]);

        let released = {
            let mut ctx = self.tree.borrow_mut();
            ctx.last_dirty = None;
            ctx.detach(self.id)
        };

        let mut dropped = 0;
        for record in &released {
            for watcher in &record.watchers {
                watcher.removed.set(true);
            }
            for listener in record.listeners.values().flatten() {
                listener.removed.set(true);
            }
            dropped += record.watchers.len();
        }
        tracing::debug!(
            "Destroyed scope {:?} ({} scopes released, {} watchers dropped)",
            self.id,
            released.len(),
            dropped
        );
    }

    /// Visit this scope and its live descendants depth-first, parents first
    ///
    /// Stops the whole walk as soon as `visit` returns false, and reports
    /// whether the walk ran to completion. Children are read after their
    /// parent has been visited.
    pub(crate) fn every_scope(&self, visit: &mut dyn FnMut(&Scope) -> bool) -> bool {
        if self.is_destroyed() {
            return true;
        }
        if !visit(self) {
            return false;
        }
        for child in self.children() {
            if !child.every_scope(visit) {
                return false;
            }
        }
        true
    }

    // === Data ===

    /// Read a key, falling back along the inheritance chain
    pub fn get(&self, key: &str) -> Value {
        let ctx = self.tree.borrow();
        let mut current = Some(self.id);
        while let Some(id) = current {
            let Some(record) = ctx.record(id) else { break };
            if let Some(value) = record.data.get(key) {
                return value.clone();
            }
            current = record.prototype;
        }
        Value::Undefined
    }

    /// Set a key on this scope, shadowing any inherited one
    ///
    /// Ignored once the scope has been released.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if let Some(record) = self.tree.borrow_mut().record_mut(self.id) {
            record.data.insert(key.to_string(), value.into());
        }
    }

    /// Whether a key is visible here, inherited or own
    pub fn has(&self, key: &str) -> bool {
        let ctx = self.tree.borrow();
        let mut current = Some(self.id);
        while let Some(id) = current {
            let Some(record) = ctx.record(id) else { break };
            if record.data.contains_key(key) {
                return true;
            }
            current = record.prototype;
        }
        false
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.tree.borrow().record(self.id).is_some_and(|record| record.data.contains_key(key))
    }

    /// Remove an own key, uncovering any inherited value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.tree.borrow_mut().record_mut(self.id).and_then(|record| record.data.remove(key))
    }

    /// Own keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .tree
            .borrow()
            .record(self.id)
            .map(|record| record.data.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    // === Tree ===

    pub fn id(&self) -> ScopeId { self.id }

    pub fn parent(&self) -> Option<Scope> {
        let parent = self.tree.borrow().record(self.id).and_then(|record| record.parent);
        parent.map(|id| Scope::from_parts(self.tree.clone(), id))
    }

    pub fn root(&self) -> Scope {
        Scope::from_parts(self.tree.clone(), ScopeId::ROOT)
    }

    /// Live children, in creation order
    pub fn children(&self) -> Vec<Scope> {
        let children = self
            .tree
            .borrow()
            .record(self.id)
            .map(|record| record.children.clone())
            .unwrap_or_default();
        children.into_iter().map(|id| Scope::from_parts(self.tree.clone(), id)).collect()
    }

    pub fn is_root(&self) -> bool { self.id == ScopeId::ROOT }

    pub fn is_isolated(&self) -> bool {
        self.tree.borrow().record(self.id).is_some_and(|record| record.isolated)
    }

    pub fn is_destroyed(&self) -> bool {
        self.tree.borrow().record(self.id).is_none_or(|record| record.destroyed)
    }

    /// Phase the tree is in, if any
    pub fn phase(&self) -> Option<Phase> {
        self.tree.borrow().phase
    }

    pub fn config(&self) -> ScopeConfig {
        self.tree.borrow().config.clone()
    }

    /// Active watchers on this scope and every live descendant
    pub fn watcher_count(&self) -> usize {
        let mut count = 0;
        self.every_scope(&mut |scope| {
            count += scope.tree.borrow().record(scope.id).map_or(0, |record| record.watchers.len());
            true
        });
        count
    }

    /// Whether both handles belong to the same tree
    pub fn same_tree(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree)
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.same_tree(other)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("id", &self.id).finish()
    }
}
