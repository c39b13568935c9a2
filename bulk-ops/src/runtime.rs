//! In-process bulk operation runtime.
//!
//! Registers runs in an executions map, spawns the driver for each confirmed
//! request, and serves handle-based queries (progress, status, events) until
//! the operator dismisses the finished run. Terminal runs are kept around so
//! final counts never vanish before they were seen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bulk_ops_sdk::{
    async_trait, ActionExecutor, BulkAction, BulkOperationRuntime, CompletionHook, EngineError,
    EngineResult, ExecutionProgress, NotificationSink, OperationRequest, OperationSummary,
    OperatorInput, RunEvent, RunHandle, RunStatus,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::catalog::ActionCatalog;
use crate::config::EngineConfig;
use crate::driver;

/// Bookkeeping for one run.
pub(crate) struct RunState {
    pub(crate) handle: RunHandle,
    pub(crate) status: RunStatus,
    pub(crate) progress: ExecutionProgress,
    pub(crate) summary: Option<OperationSummary>,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) events_tx: broadcast::Sender<RunEvent>,
    /// Persistent buffer of all events for historical retrieval
    pub(crate) event_log: Vec<RunEvent>,
}

impl RunState {
    pub(crate) fn new(handle: RunHandle, total: usize, label: &str, capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity);
        Self {
            handle,
            status: RunStatus::Running,
            progress: ExecutionProgress::start(total, label),
            summary: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            events_tx,
            event_log: Vec::new(),
        }
    }
}

pub(crate) type SharedRuns = Arc<Mutex<HashMap<Uuid, RunState>>>;

/// The engine's runtime: catalog plus injected collaborators.
pub struct InProcessRuntime {
    catalog: ActionCatalog,
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn NotificationSink>,
    hook: Option<CompletionHook>,
    config: EngineConfig,
    /// Active and finished-but-undismissed runs (uuid -> state)
    executions: SharedRuns,
}

impl InProcessRuntime {
    pub fn new(
        catalog: ActionCatalog,
        executor: Arc<dyn ActionExecutor>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            catalog,
            executor,
            sink,
            hook: None,
            config: EngineConfig::default(),
            executions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Install the parent-level completion callback, invoked exactly once per
    /// run at terminal state (typically: refetch data, clear the selection).
    pub fn with_completion_hook(mut self, hook: CompletionHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Drop state for runs that reached a terminal state, freeing memory.
    /// Hosts that auto-clear progress views call this on their own cadence
    /// instead of dismissing runs one by one.
    pub fn cleanup_finished(&self) {
        let mut executions = self.executions.lock().unwrap();
        executions.retain(|_, state| !state.status.is_terminal());
    }

    /// Number of runs currently tracked (running or awaiting dismissal).
    pub fn tracked_runs(&self) -> usize {
        self.executions.lock().unwrap().len()
    }

    /// Handles of all tracked runs, for hosts that enumerate progress views.
    pub fn run_handles(&self) -> Vec<RunHandle> {
        self.executions
            .lock()
            .unwrap()
            .values()
            .map(|state| state.handle.clone())
            .collect()
    }
}

#[async_trait]
impl BulkOperationRuntime for InProcessRuntime {
    fn list_actions(&self) -> Vec<BulkAction> {
        self.catalog.actions().to_vec()
    }

    fn get_action(&self, id: &bulk_ops_sdk::ActionId) -> EngineResult<BulkAction> {
        self.catalog
            .find(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownAction(id.clone()))
    }

    fn validate_request(
        &self,
        action: &BulkAction,
        selection_len: usize,
        input: &OperatorInput,
    ) -> EngineResult<()> {
        if selection_len == 0 {
            return Err(EngineError::EmptySelection);
        }
        let blank = |value: &Option<String>| {
            value.as_deref().map(str::trim).unwrap_or("").is_empty()
        };
        if action.requires_reason && blank(&input.reason) {
            return Err(EngineError::MissingReason(action.id.clone()));
        }
        if action.requires_message && blank(&input.message) {
            return Err(EngineError::MissingMessage(action.id.clone()));
        }
        Ok(())
    }

    async fn run_bulk_operation(&self, request: OperationRequest) -> EngineResult<RunHandle> {
        // The catalog descriptor is authoritative for validation
        let action = self.get_action(&request.action.id)?;
        self.validate_request(&action, request.entity_ids.len(), &request.input)?;

        let run_id = Uuid::new_v4();
        let handle = RunHandle::new(run_id, request.action.id.clone());
        let state = RunState::new(
            handle.clone(),
            request.entity_ids.len(),
            &request.action.label,
            self.config.event_channel_capacity,
        );
        self.executions.lock().unwrap().insert(run_id, state);

        tokio::spawn(driver::drive(
            run_id,
            request,
            self.executor.clone(),
            self.sink.clone(),
            self.hook.clone(),
            self.executions.clone(),
            self.config.retain_finished_runs,
        ));

        Ok(handle)
    }

    async fn subscribe_events(
        &self,
        handle: &RunHandle,
    ) -> EngineResult<broadcast::Receiver<RunEvent>> {
        let executions = self.executions.lock().unwrap();
        let state = executions
            .get(handle.id())
            .ok_or(EngineError::RunNotFound(handle.id))?;
        Ok(state.events_tx.subscribe())
    }

    async fn events(
        &self,
        handle: &RunHandle,
        limit: Option<usize>,
    ) -> EngineResult<Vec<RunEvent>> {
        let executions = self.executions.lock().unwrap();
        let state = executions
            .get(handle.id())
            .ok_or(EngineError::RunNotFound(handle.id))?;

        let events = if let Some(limit) = limit {
            state.event_log.iter().rev().take(limit).rev().cloned().collect()
        } else {
            state.event_log.clone()
        };
        Ok(events)
    }

    async fn progress(&self, handle: &RunHandle) -> EngineResult<ExecutionProgress> {
        let executions = self.executions.lock().unwrap();
        let state = executions
            .get(handle.id())
            .ok_or(EngineError::RunNotFound(handle.id))?;
        Ok(state.progress.clone())
    }

    async fn status(&self, handle: &RunHandle) -> EngineResult<RunStatus> {
        let executions = self.executions.lock().unwrap();
        let state = executions
            .get(handle.id())
            .ok_or(EngineError::RunNotFound(handle.id))?;
        Ok(state.status)
    }

    async fn cancel(&self, handle: &RunHandle) -> EngineResult<()> {
        let executions = self.executions.lock().unwrap();
        // Idempotent: unknown, dismissed or already-terminal runs are a no-op
        if let Some(state) = executions.get(handle.id()) {
            if !state.status.is_terminal() {
                state.cancelled.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn dismiss(&self, handle: &RunHandle) -> EngineResult<OperationSummary> {
        let mut executions = self.executions.lock().unwrap();
        let state = executions
            .get(handle.id())
            .ok_or(EngineError::RunNotFound(handle.id))?;
        if !state.status.is_terminal() {
            return Err(EngineError::RunStillActive(handle.id));
        }
        let summary = state
            .summary
            .clone()
            .ok_or(EngineError::RunStillActive(handle.id))?;
        executions.remove(handle.id());
        Ok(summary)
    }
}
