//! fOS Scope
//!
//! Hierarchical scope tree with dirty-checking change detection.
//!
//! A tree of scopes holds named data and watchers. A digest re-evaluates
//! every watcher from a scope downward until nothing changes, calling each
//! listener whose watched value moved. Deferred work is scheduled through a
//! [`TaskScheduler`], normally the host-driven [`EventLoop`].
//!
//! ```
//! use fos_scope::{EventLoop, Scope, Value};
//!
//! let root = Scope::new_root(EventLoop::new());
//! root.set("name", "Jane");
//! root.watch(
//!     |scope| Ok(scope.get("name")),
//!     |new, _old, scope| {
//!         scope.set("greeting", format!("Hello, {new}"));
//!         Ok(())
//!     },
//! );
//! root.digest().unwrap();
//! assert_eq!(root.get("greeting"), Value::from("Hello, Jane"));
//! ```

mod collection;
mod config;
mod digest;
mod event_loop;
mod events;
mod schedule;
mod scope;
mod tree;
mod watch;

pub use collection::watch_fn;
pub use config::{ScopeConfig, DEFAULT_DIGEST_TTL};
pub use event_loop::{EventLoop, Task, TaskId, TaskScheduler};
pub use events::ScopeEvent;
pub use fos_value::{Array, Object, Value};
pub use scope::{Scope, ScopeKind};
pub use tree::ScopeId;
pub use watch::{Deregistration, Equality, ListenerFn, WatchFn};

use std::fmt;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Work a tree is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Digest,
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Digest => write!(f, "digest"),
            Phase::Apply => write!(f, "apply"),
        }
    }
}

/// Scope errors
///
/// Failures inside watch functions, listeners and queued tasks are not
/// reported here; they are logged and the digest carries on.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("{0} already in progress")]
    PhaseInProgress(Phase),

    #[error("{ttl} digest iterations reached, aborting")]
    DigestTtlExceeded { ttl: usize },

    #[error("explicit parent belongs to a different scope tree")]
    ForeignTree,

    #[error("scope {0:?} has been destroyed")]
    Destroyed(ScopeId),

    #[error("scope tree has no free slots left")]
    TreeFull,

    #[error("apply expression failed: {0}")]
    Apply(anyhow::Error),

    #[error("invalid scope configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ScopeError::PhaseInProgress(Phase::Digest).to_string(),
            "digest already in progress"
        );
        assert_eq!(
            ScopeError::DigestTtlExceeded { ttl: 10 }.to_string(),
            "10 digest iterations reached, aborting"
        );
        let err = ScopeError::Apply(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "apply expression failed: boom");
    }
}
