//! Scheduling entry points
//!
//! Immediate evaluation, apply (evaluate then digest from the root), the
//! async queue drained inside the current or next digest, the coalesced
//! apply queue flushed on a later turn, and post-digest callbacks.

use crate::tree::{FlushTimer, PhaseGuard, QueuedTask, ScopeId, SharedTree};
use crate::{Phase, Scope, ScopeError};
use fos_value::Object;
use std::rc::Rc;
use std::time::Duration;

impl Scope {
    /// Evaluate against this scope; no digest follows
    pub fn eval<R>(&self, expr: impl FnOnce(&Scope) -> R) -> R {
        expr(self)
    }

    /// Evaluate with a record of extra local values
    pub fn eval_with<R>(&self, locals: &Object, expr: impl FnOnce(&Scope, &Object) -> R) -> R {
        expr(self, locals)
    }

    /// Evaluate inside the apply phase, then digest from the root
    ///
    /// The digest runs even when `expr` fails. A digest failure is returned
    /// in preference to the expression's own error.
    pub fn apply<R>(&self, expr: impl FnOnce(&Scope) -> anyhow::Result<R>) -> Result<R, ScopeError> {
        let result = {
            let _guard = PhaseGuard::begin(&self.tree, Phase::Apply)?;
            expr(self)
        };

        if let Err(digest_error) = self.root().digest() {
            if let Err(e) = &result {
                tracing::error!("apply expression on scope {:?} failed: {:#}", self.id, e);
            }
            return Err(digest_error);
        }
        result.map_err(ScopeError::Apply)
    }

    /// Queue `expr` to run in the current digest, or in one started soon
    ///
    /// Outside a digest, the first task queued schedules a zero-delay task
    /// that digests the root if the queue is still non-empty by then.
    pub fn eval_async(&self, expr: impl FnOnce(&Scope) -> anyhow::Result<()> + 'static) {
        let scheduler = {
            let mut ctx = self.tree.borrow_mut();
            let schedule = ctx.phase.is_none() && ctx.async_queue.is_empty();
            ctx.async_queue.push_back(QueuedTask { scope: self.id, task: Box::new(expr) });
            schedule.then(|| ctx.scheduler.clone())
        };
        let Some(scheduler) = scheduler else { return };

        let tree = Rc::downgrade(&self.tree);
        scheduler.set_timeout(Duration::ZERO, Box::new(move || -> Result<(), ScopeError> {
            let Some(tree) = tree.upgrade() else { return Ok(()) };
            let pending = !tree.borrow().async_queue.is_empty();
            if pending {
                Scope::from_parts(tree, ScopeId::ROOT).digest()?;
            }
            Ok(())
        }));
    }

    /// Queue `expr` for a coalesced apply on a later turn
    ///
    /// Every task queued before the flush runs in one apply. A digest that
    /// starts first cancels the pending flush and runs the queue itself.
    pub fn apply_async(&self, expr: impl FnOnce(&Scope) -> anyhow::Result<()> + 'static) {
        let scheduler = {
            let mut ctx = self.tree.borrow_mut();
            ctx.apply_async_queue.push_back(QueuedTask { scope: self.id, task: Box::new(expr) });
            if ctx.apply_async_flush == FlushTimer::Idle {
                ctx.apply_async_flush = FlushTimer::Scheduling;
                Some(ctx.scheduler.clone())
            } else {
                None
            }
        };
        let Some(scheduler) = scheduler else { return };

        let tree = Rc::downgrade(&self.tree);
        let timer = scheduler.set_timeout(Duration::ZERO, Box::new(move || -> Result<(), ScopeError> {
            let Some(tree) = tree.upgrade() else { return Ok(()) };
            Scope::from_parts(tree, ScopeId::ROOT).apply(|root| {
                root.flush_apply_async();
                Ok(())
            })
        }));
        // a scheduler that ran the flush already left the slot idle
        let mut ctx = self.tree.borrow_mut();
        if ctx.apply_async_flush == FlushTimer::Scheduling {
            ctx.apply_async_flush = FlushTimer::Pending(timer);
        }
    }

    /// Run `callback` once, after the next digest completes
    pub fn post_digest(&self, callback: impl FnOnce(&Scope) -> anyhow::Result<()> + 'static) {
        self.tree
            .borrow_mut()
            .post_digest_queue
            .push_back(QueuedTask { scope: self.id, task: Box::new(callback) });
    }

    /// Run every queued apply_async task, then forget the flush timer
    pub(crate) fn flush_apply_async(&self) {
        flush_apply_async(&self.tree);
    }
}

fn flush_apply_async(tree: &SharedTree) {
    let mut flushed = 0;
    loop {
        let next = tree.borrow_mut().apply_async_queue.pop_front();
        let Some(queued) = next else { break };
        queued.run(tree, "apply_async");
        flushed += 1;
    }
    tree.borrow_mut().apply_async_flush = FlushTimer::Idle;
    tracing::trace!("Flushed {} apply_async tasks", flushed);
}
