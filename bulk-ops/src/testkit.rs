//! Deterministic test doubles for the injected collaborators.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bulk_ops_sdk::{
    async_trait, ActionExecutor, ActionId, CompletionHook, EntityId, Notification,
    NotificationSink, OperationSummary,
};
use tokio::sync::Semaphore;

/// Install a subscriber once so `RUST_LOG=bulk_ops=debug cargo test` shows
/// driver activity.
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted executor: records every attempt, optionally fails a fixed set of
/// entities, optionally parks each attempt until a permit is released, and
/// optionally runs a callback with the attempt count before returning.
pub(crate) struct StubExecutor {
    fail_for: HashSet<String>,
    permits: Option<Arc<Semaphore>>,
    attempts: Mutex<Vec<String>>,
    after_apply: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl StubExecutor {
    pub(crate) fn ok() -> Self {
        Self {
            fail_for: HashSet::new(),
            permits: None,
            attempts: Mutex::new(Vec::new()),
            after_apply: None,
        }
    }

    pub(crate) fn failing_for(entity_ids: &[&str]) -> Self {
        let mut stub = Self::ok();
        stub.fail_for = entity_ids.iter().map(|id| id.to_string()).collect();
        stub
    }

    /// Executor whose attempts each wait for one semaphore permit, so tests
    /// can hold a run parked at its single suspension point.
    pub(crate) fn gated(initial_permits: usize) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(initial_permits));
        let mut stub = Self::ok();
        stub.permits = Some(gate.clone());
        (stub, gate)
    }

    /// Run `callback(n)` after the `n`-th attempt, before it returns.
    pub(crate) fn with_after_apply<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.after_apply = Some(Arc::new(callback));
        self
    }

    /// Entity ids attempted so far, in order. An attempt is recorded as soon
    /// as it starts, so a parked gated attempt is visible here.
    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for StubExecutor {
    async fn apply(&self, _action: &ActionId, entity: &EntityId) -> anyhow::Result<()> {
        let n = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(entity.to_string());
            attempts.len()
        };
        if let Some(permits) = &self.permits {
            permits.acquire().await.unwrap().forget();
        }
        if let Some(callback) = &self.after_apply {
            callback(n);
        }
        if self.fail_for.contains(entity.as_str()) {
            anyhow::bail!("simulated failure for {}", entity);
        }
        Ok(())
    }
}

/// Sink that records every notification for assertions.
#[derive(Default)]
pub(crate) struct RecordingSink {
    notes: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub(crate) fn recorded(&self) -> Vec<Notification> {
        self.notes.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.notes.lock().unwrap().push(notification);
    }
}

/// Observer for the completion hook: call count and last summary.
pub(crate) struct HookProbe {
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<OperationSummary>>>,
}

impl HookProbe {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_summary(&self) -> Option<OperationSummary> {
        self.last.lock().unwrap().clone()
    }
}

/// Completion hook that succeeds and records what it saw.
pub(crate) fn probe_hook() -> (CompletionHook, HookProbe) {
    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(None));
    let probe = HookProbe {
        calls: calls.clone(),
        last: last.clone(),
    };
    let hook: CompletionHook = Arc::new(move |summary| {
        let calls = calls.clone();
        let last = last.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            *last.lock().unwrap() = Some(summary);
            Ok(())
        })
    });
    (hook, probe)
}

/// Completion hook that always fails, with a call counter.
pub(crate) fn failing_hook() -> (CompletionHook, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let hook: CompletionHook = Arc::new(move |_summary| {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("refresh after bulk run failed")
        })
    });
    (hook, counter)
}
