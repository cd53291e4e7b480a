//! Event Loop
//!
//! Host-driven timer and macrotask queue used for deferred digests.
//!
//! Time is virtual: nothing fires until the host calls [`EventLoop::tick`]
//! or [`EventLoop::run_until_idle`]. A task scheduled while another task is
//! running never runs in the same turn, which is what makes a zero-delay
//! timeout a real deferral.

use crate::ScopeError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Timer handle returned by [`TaskScheduler::set_timeout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u32);

/// Deferred unit of work; a returned error is fatal for the turn
pub type Task = Box<dyn FnOnce() -> Result<(), ScopeError>>;

/// Timer facility the scheduling layer defers work through
pub trait TaskScheduler {
    /// Run `task` once `delay` has elapsed, in a later turn.
    ///
    /// Running it before returning is tolerated, though a zero delay then
    /// no longer defers anything.
    fn set_timeout(&self, delay: Duration, task: Task) -> TaskId;

    /// Cancel a pending task. Returns false if it already ran or was unknown.
    fn clear_timeout(&self, id: TaskId) -> bool;
}

struct Timer {
    id: TaskId,
    due: Duration,
    task: Task,
}

#[derive(Default)]
struct LoopState {
    /// Tasks whose timers are due, in firing order
    macrotasks: VecDeque<(TaskId, Task)>,
    /// Pending timers
    timers: Vec<Timer>,
    next_timer_id: u32,
    current_time: Duration,
}

/// Single-threaded event loop
///
/// Cloning yields another handle to the same loop, so several scope trees
/// can share one loop.
#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    pub fn new() -> Self { Self::default() }

    /// Advance time by `delta` and run every task that became due.
    ///
    /// Returns the number of tasks run. Stops at the first task that fails;
    /// tasks still queued run on the next call.
    pub fn tick(&self, delta: Duration) -> Result<usize, ScopeError> {
        self.queue_due_timers(delta);
        self.run_macrotasks()
    }

    /// Keep advancing to the next due timer until no timers remain.
    pub fn run_until_idle(&self) -> Result<usize, ScopeError> {
        let mut ran = self.tick(Duration::ZERO)?;
        loop {
            let next_delta = {
                let state = self.state.borrow();
                state.timers.iter().map(|t| t.due).min().map(|due| due.saturating_sub(state.current_time))
            };
            match next_delta {
                Some(delta) => ran += self.tick(delta)?,
                None => break,
            }
        }
        Ok(ran)
    }

    /// Check if there's pending work
    pub fn has_pending_work(&self) -> bool {
        let state = self.state.borrow();
        !state.macrotasks.is_empty() || !state.timers.is_empty()
    }

    /// Number of tasks waiting to run
    pub fn pending_timers(&self) -> usize {
        let state = self.state.borrow();
        state.macrotasks.len() + state.timers.len()
    }

    /// Current virtual time
    pub fn current_time(&self) -> Duration { self.state.borrow().current_time }

    fn queue_due_timers(&self, delta: Duration) {
        let mut state = self.state.borrow_mut();
        state.current_time += delta;
        let now = state.current_time;

        let (mut due, pending): (Vec<Timer>, Vec<Timer>) =
            std::mem::take(&mut state.timers).into_iter().partition(|t| t.due <= now);
        state.timers = pending;

        due.sort_by_key(|t| (t.due, t.id.0));
        state.macrotasks.extend(due.into_iter().map(|t| (t.id, t.task)));
    }

    fn run_macrotasks(&self) -> Result<usize, ScopeError> {
        let mut ran = 0;
        loop {
            let next = self.state.borrow_mut().macrotasks.pop_front();
            let Some((id, task)) = next else { break };
            tracing::trace!("Running task {:?}", id);
            ran += 1;
            task()?;
        }
        Ok(ran)
    }
}

impl TaskScheduler for EventLoop {
    fn set_timeout(&self, delay: Duration, task: Task) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = TaskId(state.next_timer_id);
        state.next_timer_id += 1;
        let due = state.current_time + delay;
        state.timers.push(Timer { id, due, task });
        id
    }

    fn clear_timeout(&self, id: TaskId) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.timers.iter().position(|t| t.id == id) {
            state.timers.remove(pos);
            return true;
        }
        if let Some(pos) = state.macrotasks.iter().position(|(queued, _)| *queued == id) {
            state.macrotasks.remove(pos);
            return true;
        }
        false
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("macrotasks", &state.macrotasks.len())
            .field("timers", &state.timers.len())
            .field("current_time", &state.current_time)
            .finish()
    }
}
