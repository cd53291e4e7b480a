//! Digest engine
//!
//! A digest sweeps the scope it was started on and every live descendant,
//! re-running watchers until a full sweep finds nothing dirty and the async
//! queue is empty. It gives up after the configured number of dirty sweeps.

use crate::tree::{FlushTimer, PhaseGuard};
use crate::watch::WatchRecord;
use crate::{Phase, Scope, ScopeError};

/// Outcome of checking one watcher
enum Check {
    Changed,
    Unchanged,
    /// Clean, and the last watcher found dirty: the sweep can stop here
    ReachedLastDirty,
    Failed,
}

impl Scope {
    /// Run watchers on this scope and its descendants until stable
    ///
    /// Ancestors are not evaluated. Once stable, callbacks queued with
    /// [`Scope::post_digest`] run.
    pub fn digest(&self) -> Result<(), ScopeError> {
        if self.is_destroyed() {
            tracing::debug!("Skipping digest of destroyed scope {:?}", self.id);
            return Ok(());
        }
        let guard = PhaseGuard::begin(&self.tree, Phase::Digest)?;
        let ttl = {
            let mut ctx = self.tree.borrow_mut();
            ctx.last_dirty = None;
            ctx.config.digest_ttl
        };
        tracing::debug!("Digest started on scope {:?}", self.id);

        let pending_flush = self.tree.borrow().apply_async_flush;
        if pending_flush != FlushTimer::Idle {
            if let FlushTimer::Pending(timer) = pending_flush {
                let scheduler = self.tree.borrow().scheduler.clone();
                scheduler.clear_timeout(timer);
            }
            self.flush_apply_async();
        }

        let mut sweeps = 0;
        loop {
            self.drain_async_queue();
            let dirty = self.digest_once();
            sweeps += 1;
            tracing::trace!("Digest sweep {} on scope {:?} (dirty: {})", sweeps, self.id, dirty);

            let async_pending = !self.tree.borrow().async_queue.is_empty();
            if !dirty && !async_pending {
                break;
            }
            if sweeps >= ttl {
                tracing::error!("{} digest iterations reached, aborting", ttl);
                return Err(ScopeError::DigestTtlExceeded { ttl });
            }
        }

        drop(guard);
        tracing::debug!("Digest finished on scope {:?} after {} sweeps", self.id, sweeps);
        self.drain_post_digest();
        Ok(())
    }

    /// One sweep; returns whether any watcher was dirty
    pub(crate) fn digest_once(&self) -> bool {
        let mut dirty = false;
        self.every_scope(&mut |scope| {
            let watchers = scope
                .tree
                .borrow()
                .record(scope.id)
                .map(|record| record.watchers.clone())
                .unwrap_or_default();
            for watcher in watchers {
                if watcher.removed.get() {
                    continue;
                }
                match scope.check_watcher(&watcher) {
                    Check::Changed => dirty = true,
                    Check::ReachedLastDirty => return false,
                    Check::Unchanged | Check::Failed => {}
                }
            }
            true
        });
        dirty
    }

    fn check_watcher(&self, watcher: &WatchRecord) -> Check {
        let new_value = match (watcher.watch_fn)(self) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Watch function on scope {:?} failed: {:#}", self.id, e);
                return Check::Failed;
            }
        };

        let last = watcher.last.borrow().clone();
        let changed = match &last {
            None => true,
            Some(old) => !watcher.equality.are_equal(&new_value, old),
        };
        if !changed {
            let last_dirty = self.tree.borrow().last_dirty;
            return if last_dirty == Some(watcher.id) {
                Check::ReachedLastDirty
            } else {
                Check::Unchanged
            };
        }

        self.tree.borrow_mut().last_dirty = Some(watcher.id);
        *watcher.last.borrow_mut() = Some(watcher.equality.snapshot(&new_value));
        if let Some(listener) = &watcher.listener {
            let old_value = last.unwrap_or_else(|| new_value.clone());
            if let Err(e) = listener(&new_value, &old_value, self) {
                tracing::error!("Watch listener on scope {:?} failed: {:#}", self.id, e);
            }
        }
        Check::Changed
    }

    fn drain_async_queue(&self) {
        loop {
            let next = self.tree.borrow_mut().async_queue.pop_front();
            let Some(queued) = next else { break };
            queued.run(&self.tree, "eval_async");
        }
    }

    fn drain_post_digest(&self) {
        loop {
            let next = self.tree.borrow_mut().post_digest_queue.pop_front();
            let Some(queued) = next else { break };
            queued.run(&self.tree, "post_digest");
        }
    }
}
