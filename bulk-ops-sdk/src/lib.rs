//! Shared vocabulary for the bulk-ops engine.
//!
//! Everything a host view, an action executor, or the engine itself needs to
//! talk about a bulk operation lives here: entity/action identifiers, the
//! selection set, action descriptors, progress counters, the run event
//! stream, and the traits the engine is wired together with.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// Re-export async trait for implementors
pub use async_trait::async_trait;

/// Stable identifier of an entity a bulk action is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier of a bulk action in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The set of entities currently checked in a list view.
///
/// Insertion order is preserved and duplicates are rejected, so a run
/// processes entities in the order the operator selected them. The set is
/// owned by the host view; the engine only ever reads a [`snapshot`].
///
/// [`snapshot`]: SelectionSet::snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionSet {
    ids: Vec<EntityId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity. Returns false if it was already selected.
    pub fn insert(&mut self, id: impl Into<EntityId>) -> bool {
        let id = id.into();
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Remove an entity. Returns false if it was not selected.
    pub fn remove(&mut self, id: &EntityId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    /// Flip an entity's membership. Returns true if it is now selected.
    pub fn toggle(&mut self, id: impl Into<EntityId>) -> bool {
        let id = id.into();
        if self.remove(&id) {
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.ids.iter()
    }

    /// Copy of the current selection, in selection order. A run iterates this
    /// snapshot; later mutations of the live set never affect an in-flight run.
    pub fn snapshot(&self) -> Vec<EntityId> {
        self.ids.clone()
    }
}

impl<T: Into<EntityId>> FromIterator<T> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Immutable descriptor of one bulk action offered to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAction {
    pub id: ActionId,
    pub label: String,
    /// Operator must supply a non-empty reason before this action can run.
    pub requires_reason: bool,
    /// Operator must supply a non-empty message before this action can run.
    pub requires_message: bool,
    /// Irreversible actions get a stronger confirmation treatment in hosts.
    pub destructive: bool,
    /// Icon name for host views.
    pub icon: String,
}

/// Operator-supplied strings collected by the confirmation gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorInput {
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Confirmed intent to run one action against one selection snapshot.
///
/// Built only by the confirmation gate, consumed immediately by the engine,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub action: BulkAction,
    pub entity_ids: Vec<EntityId>,
    pub input: OperatorInput,
}

/// Mutable counters for one run, owned by the execution driver.
///
/// Invariant: `failed <= completed <= total`. `completed` counts attempts
/// made (success or failure), so `completed - failed` is the success count.
/// `is_running` flips true to false exactly once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub is_running: bool,
    pub operation_label: String,
}

impl ExecutionProgress {
    pub fn start(total: usize, operation_label: impl Into<String>) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            is_running: true,
            operation_label: operation_label.into(),
        }
    }

    /// Entities attempted and not failed.
    pub fn succeeded(&self) -> usize {
        self.completed - self.failed
    }

    /// Rounded percentage of entities attempted; 0 for an empty run.
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u8
    }

    /// Rounded percentage of attempts that succeeded; 100 before any attempt
    /// (no attempts yet means no evidence of failure).
    pub fn success_rate(&self) -> u8 {
        if self.completed == 0 {
            return 100;
        }
        ((self.succeeded() as f64 / self.completed as f64) * 100.0).round() as u8
    }
}

/// Final counts for a finished run, handed to the completion hook and
/// embedded in terminal events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSummary {
    pub action_id: ActionId,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OperationSummary {
    pub fn succeeded(&self) -> usize {
        self.completed - self.failed
    }
}

/// Lifecycle state of one bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has been started yet.
    NotStarted,
    /// The driver is processing entities.
    Running,
    /// Every entity was attempted.
    Completed,
    /// Cancellation stopped the run between entities; the rest were skipped.
    Cancelled,
    /// The orchestration itself failed (e.g. the completion hook errored).
    /// Per-entity failures never produce this state.
    Failed,
}

impl RunStatus {
    /// Terminal states emit no further progress updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Structured events emitted by the engine while a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run started processing its snapshot.
    RunStarted {
        action_id: ActionId,
        label: String,
        total: usize,
    },
    /// One entity was attempted and succeeded.
    EntitySucceeded {
        entity_id: EntityId,
        completed: usize,
        total: usize,
    },
    /// One entity was attempted and failed; the run keeps going.
    EntityFailed {
        entity_id: EntityId,
        error: String,
        completed: usize,
        failed: usize,
        total: usize,
    },
    /// Every entity was attempted.
    RunCompleted { summary: OperationSummary },
    /// The run stopped at a cancellation checkpoint.
    RunCancelled { summary: OperationSummary },
    /// The orchestration failed after the counts in `summary` accumulated.
    RunFailed {
        summary: OperationSummary,
        error: String,
    },
}

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-visible feedback emitted through a [`NotificationSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

/// Handle for tracking one spawned run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: Uuid,
    pub action_id: ActionId,
}

impl RunHandle {
    pub fn new(id: Uuid, action_id: ActionId) -> Self {
        Self { id, action_id }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }
}

/// Errors surfaced at the engine boundary.
///
/// Per-entity operation failures are deliberately absent: they are counted
/// in [`ExecutionProgress::failed`] and reported through
/// [`RunEvent::EntityFailed`], never raised as errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown action '{0}'")]
    UnknownAction(ActionId),
    #[error("no entities selected")]
    EmptySelection,
    #[error("action '{0}' requires a reason")]
    MissingReason(ActionId),
    #[error("action '{0}' requires a message")]
    MissingMessage(ActionId),
    #[error("a confirmation is already in flight")]
    AlreadyRunning,
    #[error("run {0} not found")]
    RunNotFound(Uuid),
    #[error("run {0} is still running")]
    RunStillActive(Uuid),
    #[error("orchestration failed: {0}")]
    Orchestration(#[from] anyhow::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The per-entity effect call: an opaque, possibly slow, possibly failing
/// remote operation. The engine awaits exactly one call per entity and
/// treats an `Err` as that entity's failure, nothing more.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn apply(&self, action: &ActionId, entity: &EntityId) -> anyhow::Result<()>;
}

/// Where user-visible feedback goes. Injected into the engine so hosts and
/// tests decide how notifications are rendered (or recorded).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);

    fn info(&self, title: &str, message: &str) {
        self.notify(Notification {
            level: NotificationLevel::Info,
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn success(&self, title: &str, message: &str) {
        self.notify(Notification {
            level: NotificationLevel::Success,
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn warning(&self, title: &str, message: &str) {
        self.notify(Notification {
            level: NotificationLevel::Warning,
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn error(&self, title: &str, message: &str) {
        self.notify(Notification {
            level: NotificationLevel::Error,
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

/// Callback invoked exactly once per run when it reaches a terminal state.
/// An error here is an orchestration failure: the run flips to
/// [`RunStatus::Failed`] with its accumulated counts preserved.
pub type CompletionHook =
    Arc<dyn Fn(OperationSummary) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Runtime boundary between host views and the engine.
#[async_trait]
pub trait BulkOperationRuntime: Send + Sync {
    /// All actions the catalog offers, in catalog order. An empty catalog
    /// yields an empty list, never an error.
    fn list_actions(&self) -> Vec<BulkAction>;

    /// Look up one action by id.
    fn get_action(&self, id: &ActionId) -> EngineResult<BulkAction>;

    /// Check a would-be request against the nothing-selected guard and the
    /// action's required-input flags, without starting anything.
    fn validate_request(
        &self,
        action: &BulkAction,
        selection_len: usize,
        input: &OperatorInput,
    ) -> EngineResult<()>;

    /// Start a run for a confirmed request. Returns immediately with a
    /// handle; progress flows through events and [`progress`].
    ///
    /// [`progress`]: BulkOperationRuntime::progress
    async fn run_bulk_operation(&self, request: OperationRequest) -> EngineResult<RunHandle>;

    /// Subscribe to live events from a run.
    async fn subscribe_events(
        &self,
        handle: &RunHandle,
    ) -> EngineResult<tokio::sync::broadcast::Receiver<RunEvent>>;

    /// Buffered events of a run, oldest first, optionally limited to the
    /// most recent `limit`.
    async fn events(&self, handle: &RunHandle, limit: Option<usize>)
        -> EngineResult<Vec<RunEvent>>;

    /// Snapshot of a run's counters.
    async fn progress(&self, handle: &RunHandle) -> EngineResult<ExecutionProgress>;

    /// Current lifecycle state of a run.
    async fn status(&self, handle: &RunHandle) -> EngineResult<RunStatus>;

    /// Request cooperative cancellation. Idempotent: safe to call multiple
    /// times, after completion, or after dismissal (no-op if not running).
    async fn cancel(&self, handle: &RunHandle) -> EngineResult<()>;

    /// Drop a finished run's state and return its summary. Fails with
    /// [`EngineError::RunStillActive`] while the run is in flight, so final
    /// counts can never vanish unseen.
    async fn dismiss(&self, handle: &RunHandle) -> EngineResult<OperationSummary>;
}

/// Convenience check for duplicate ids when hosts assemble custom catalogs.
pub fn has_duplicate_action_ids(actions: &[BulkAction]) -> bool {
    let mut seen = HashSet::new();
    actions.iter().any(|action| !seen.insert(&action.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(total: usize, completed: usize, failed: usize) -> ExecutionProgress {
        ExecutionProgress {
            total,
            completed,
            failed,
            is_running: true,
            operation_label: "Test".to_string(),
        }
    }

    #[test]
    fn test_selection_set_preserves_order_and_uniqueness() {
        let mut set = SelectionSet::new();
        assert!(set.insert("u3"));
        assert!(set.insert("u1"));
        assert!(!set.insert("u3"));
        assert_eq!(set.len(), 2);

        let snapshot = set.snapshot();
        assert_eq!(snapshot, vec![EntityId::from("u3"), EntityId::from("u1")]);

        assert!(set.remove(&EntityId::from("u3")));
        assert!(!set.remove(&EntityId::from("u3")));
        assert_eq!(set.len(), 1);

        // toggle removes a present id and re-adds an absent one
        assert!(set.toggle("u2"));
        assert!(!set.toggle("u2"));
        assert!(!set.contains(&EntityId::from("u2")));

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_from_live_set() {
        let mut set: SelectionSet = ["a", "b", "c"].into_iter().collect();
        let snapshot = set.snapshot();
        set.remove(&EntityId::from("b"));
        set.clear();
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(progress(0, 0, 0).percentage(), 0);
        assert_eq!(progress(10, 0, 0).percentage(), 0);
        assert_eq!(progress(10, 3, 0).percentage(), 30);
        assert_eq!(progress(3, 1, 0).percentage(), 33);
        assert_eq!(progress(3, 2, 0).percentage(), 67);
        assert_eq!(progress(10, 10, 4).percentage(), 100);
    }

    #[test]
    fn test_success_rate() {
        // No attempts yet: no evidence of failure
        assert_eq!(progress(5, 0, 0).success_rate(), 100);
        assert_eq!(progress(10, 10, 0).success_rate(), 100);
        assert_eq!(progress(10, 10, 2).success_rate(), 80);
        assert_eq!(progress(8, 3, 3).success_rate(), 0);
        assert_eq!(progress(10, 10, 2).succeeded(), 8);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::NotStarted.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_run_event_serialization_tag() {
        let event = RunEvent::EntityFailed {
            entity_id: EntityId::from("u7"),
            error: "boom".to_string(),
            completed: 4,
            failed: 1,
            total: 9,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"entity_failed\""));
        assert!(json.contains("\"u7\""));
    }

    #[test]
    fn test_duplicate_action_id_detection() {
        let action = |id: &str| BulkAction {
            id: ActionId::from(id),
            label: id.to_string(),
            requires_reason: false,
            requires_message: false,
            destructive: false,
            icon: "circle".to_string(),
        };
        assert!(!has_duplicate_action_ids(&[action("a"), action("b")]));
        assert!(has_duplicate_action_ids(&[action("a"), action("a")]));
    }
}
