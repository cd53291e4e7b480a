//! Scope Tree (arena-based allocation)
//!
//! Every scope of one tree lives in a single [`TreeContext`], which also
//! owns the state the whole tree shares: the deferred work queues, the
//! phase marker and the last-dirty watcher. Destroyed scopes give their
//! slot back; a [`ScopeId`] carries the slot's generation so a stale id
//! never resolves to the scope that reused the slot.

use crate::config::ScopeConfig;
use crate::event_loop::{TaskId, TaskScheduler};
use crate::events::EventListener;
use crate::watch::{WatchId, WatchRecord};
use crate::{Phase, Scope, ScopeError};
use fos_value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

pub(crate) type SharedTree = Rc<RefCell<TreeContext>>;

/// Scope identifier within its tree (generational index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId {
    index: u32,
    generation: u32,
}

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId { index: 0, generation: 0 };

    /// Never names a scope
    pub(crate) const DETACHED: ScopeId = ScopeId { index: u32::MAX, generation: 0 };

    #[inline]
    pub fn index(self) -> usize { self.index as usize }

    #[inline]
    pub fn generation(self) -> u32 { self.generation }
}

/// Work queued against the scope that asked for it
pub(crate) type ScopeTask = Box<dyn FnOnce(&Scope) -> anyhow::Result<()>>;

pub(crate) struct QueuedTask {
    pub scope: ScopeId,
    pub task: ScopeTask,
}

impl QueuedTask {
    /// Run against the originating scope, logging failures
    pub fn run(self, tree: &SharedTree, queue: &str) {
        let scope = Scope::from_parts(tree.clone(), self.scope);
        if let Err(e) = (self.task)(&scope) {
            tracing::error!("{} task on scope {:?} failed: {:#}", queue, self.scope, e);
        }
    }
}

/// Progress of the coalesced apply_async flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum FlushTimer {
    #[default]
    Idle,
    /// Reserved while the scheduler is being asked for a timer
    Scheduling,
    Pending(TaskId),
}

pub(crate) struct ScopeRecord {
    /// Hierarchy parent
    pub parent: Option<ScopeId>,
    /// Scope unset keys are read from; none for the root and isolated scopes
    pub prototype: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub data: HashMap<String, Value>,
    /// Newest first
    pub watchers: Vec<Rc<WatchRecord>>,
    pub listeners: HashMap<String, Vec<Rc<EventListener>>>,
    pub isolated: bool,
    pub destroyed: bool,
}

impl ScopeRecord {
    pub fn new(parent: Option<ScopeId>, prototype: Option<ScopeId>, isolated: bool) -> Self {
        Self {
            parent,
            prototype,
            children: Vec::new(),
            data: HashMap::new(),
            watchers: Vec::new(),
            listeners: HashMap::new(),
            isolated,
            destroyed: false,
        }
    }
}

pub(crate) struct TreeContext {
    scopes: Vec<Option<(ScopeRecord, u32)>>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
    pub async_queue: VecDeque<QueuedTask>,
    pub apply_async_queue: VecDeque<QueuedTask>,
    pub post_digest_queue: VecDeque<QueuedTask>,
    pub apply_async_flush: FlushTimer,
    pub phase: Option<Phase>,
    pub last_dirty: Option<WatchId>,
    pub next_watch_id: u64,
    pub config: ScopeConfig,
    pub scheduler: Rc<dyn TaskScheduler>,
}

impl TreeContext {
    /// New tree holding only the root scope
    pub fn new(config: ScopeConfig, scheduler: Rc<dyn TaskScheduler>) -> Self {
        Self {
            scopes: vec![Some((ScopeRecord::new(None, None, false), 0))],
            generations: vec![0],
            free_list: Vec::new(),
            async_queue: VecDeque::new(),
            apply_async_queue: VecDeque::new(),
            post_digest_queue: VecDeque::new(),
            apply_async_flush: FlushTimer::Idle,
            phase: None,
            last_dirty: None,
            next_watch_id: 0,
            config,
            scheduler,
        }
    }

    /// Live record for `id`; None once the scope has been released
    #[inline]
    pub fn record(&self, id: ScopeId) -> Option<&ScopeRecord> {
        self.scopes
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .filter(|(_, generation)| *generation == id.generation)
            .map(|(record, _)| record)
    }

    #[inline]
    pub fn record_mut(&mut self, id: ScopeId) -> Option<&mut ScopeRecord> {
        self.scopes
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
            .filter(|(_, generation)| *generation == id.generation)
            .map(|(record, _)| record)
    }

    /// Allocate a scope and link it under `parent`, reusing a free slot if any
    pub fn alloc(
        &mut self,
        parent: ScopeId,
        prototype: Option<ScopeId>,
        isolated: bool,
    ) -> Result<ScopeId, ScopeError> {
        if self.record(parent).is_none_or(|record| record.destroyed) {
            return Err(ScopeError::Destroyed(parent));
        }
        let record = ScopeRecord::new(Some(parent), prototype, isolated);

        let id = if let Some(index) = self.free_list.pop() {
            let generation = self.generations[index as usize];
            self.scopes[index as usize] = Some((record, generation));
            ScopeId { index, generation }
        } else {
            let index = u32::try_from(self.scopes.len())
                .ok()
                .filter(|index| *index != ScopeId::DETACHED.index)
                .ok_or(ScopeError::TreeFull)?;
            self.scopes.push(Some((record, 0)));
            self.generations.push(0);
            ScopeId { index, generation: 0 }
        };

        if let Some(parent) = self.record_mut(parent) {
            parent.children.push(id);
        }
        Ok(id)
    }

    /// Unlink `id` from its parent and release it with its whole subtree
    ///
    /// Returns the released records so the caller can drop them outside the
    /// tree borrow. The root keeps its slot and is only emptied.
    pub fn detach(&mut self, id: ScopeId) -> Vec<ScopeRecord> {
        let Some(parent) = self.record(id).map(|record| record.parent) else {
            return Vec::new();
        };
        if let Some(parent) = parent.and_then(|parent| self.record_mut(parent)) {
            parent.children.retain(|child| *child != id);
        }

        let mut released = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let record = if next == ScopeId::ROOT {
                let mut emptied = ScopeRecord::new(None, None, false);
                emptied.destroyed = true;
                self.record_mut(next).map(|root| std::mem::replace(root, emptied))
            } else {
                self.release(next)
            };
            let Some(record) = record else { continue };
            pending.extend(record.children.iter().copied());
            released.push(record);
        }
        released
    }

    fn release(&mut self, id: ScopeId) -> Option<ScopeRecord> {
        let slot = self.scopes.get_mut(id.index())?;
        if !matches!(slot, Some((_, generation)) if *generation == id.generation) {
            return None;
        }
        let (record, _) = slot.take()?;
        self.generations[id.index()] = self.generations[id.index()].wrapping_add(1);
        self.free_list.push(id.index);
        Some(record)
    }

    /// Slots in use, live or free
    #[cfg(test)]
    pub fn slot_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn next_watch_id(&mut self) -> WatchId {
        let id = WatchId(self.next_watch_id);
        self.next_watch_id += 1;
        id
    }
}

/// Holds a tree's phase marker until dropped
///
/// The marker is cleared on every exit path, unwinding included, unless
/// the tree is still borrowed at that point; that case is logged and the
/// tree stays in the phase.
pub(crate) struct PhaseGuard {
    tree: SharedTree,
}

impl PhaseGuard {
    pub fn begin(tree: &SharedTree, phase: Phase) -> Result<Self, ScopeError> {
        let mut ctx = tree.borrow_mut();
        if let Some(active) = ctx.phase {
            return Err(ScopeError::PhaseInProgress(active));
        }
        ctx.phase = Some(phase);
        Ok(Self { tree: tree.clone() })
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        match self.tree.try_borrow_mut() {
            Ok(mut ctx) => ctx.phase = None,
            Err(_) => tracing::warn!("Scope tree still borrowed when leaving a phase; phase marker left set"),
        }
    }
}
