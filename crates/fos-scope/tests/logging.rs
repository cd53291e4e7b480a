//! Logging tests for fos-scope
//!
//! Failures inside user callbacks are swallowed by the digest, so the only
//! trace they leave is an error-level event.

use fos_scope::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

struct ErrorCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_caught_errors_are_logged() {
    let errors = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));

    tracing::subscriber::with_default(subscriber, || {
        let root = Scope::new_root(EventLoop::new());
        root.watch(|_| Ok(Value::Null), |_, _, _| Err(anyhow::anyhow!("listener failed")));
        root.watch_only(|_| Err(anyhow::anyhow!("watch failed")));
        root.eval_async(|_| Err(anyhow::anyhow!("async task failed")));
        root.post_digest(|_| Err(anyhow::anyhow!("post digest failed")));
        root.on("ping", |_, _| Err(anyhow::anyhow!("event listener failed")));

        root.digest().unwrap();
        root.emit("ping", &[]);
    });

    // the failing watch function runs on both sweeps
    assert_eq!(errors.load(Ordering::SeqCst), 6);
}
