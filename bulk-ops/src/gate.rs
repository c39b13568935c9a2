//! Confirmation gate: collects required operator input and decides go/no-go.
//!
//! A gate is opened per chosen action and selection. The host binds its
//! confirm control to [`ConfirmationGate::can_confirm`], so missing input
//! disables confirmation up front instead of failing after submit.

use bulk_ops_sdk::{
    BulkAction, BulkOperationRuntime, EngineError, EngineResult, EntityId, NotificationSink,
    OperationRequest, OperatorInput, RunHandle,
};

/// Host-facing confirmation state machine for one would-be run.
#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    action: BulkAction,
    selection_len: usize,
    reason: String,
    message: String,
    confirming: bool,
}

impl ConfirmationGate {
    /// Open a gate for `action` over a selection of `selection_len` entities.
    /// Refuses to open over an empty selection: with nothing selected there
    /// is nothing to confirm.
    pub fn open(action: BulkAction, selection_len: usize) -> EngineResult<Self> {
        if selection_len == 0 {
            return Err(EngineError::EmptySelection);
        }
        Ok(Self {
            action,
            selection_len,
            reason: String::new(),
            message: String::new(),
            confirming: false,
        })
    }

    pub fn action(&self) -> &BulkAction {
        &self.action
    }

    pub fn selection_len(&self) -> usize {
        self.selection_len
    }

    pub fn set_reason(&mut self, reason: &str) {
        self.reason = reason.to_string();
    }

    pub fn set_message(&mut self, message: &str) {
        self.message = message.to_string();
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True while a confirm is in flight (between [`confirm`] and either
    /// dispatch success or [`confirm_failed`]).
    ///
    /// [`confirm`]: ConfirmationGate::confirm
    /// [`confirm_failed`]: ConfirmationGate::confirm_failed
    pub fn is_confirming(&self) -> bool {
        self.confirming
    }

    /// Whether the confirm control should be enabled. Whitespace-only input
    /// does not satisfy a required field.
    pub fn can_confirm(&self) -> bool {
        if self.confirming {
            return false;
        }
        if self.action.requires_reason && self.reason.trim().is_empty() {
            return false;
        }
        if self.action.requires_message && self.message.trim().is_empty() {
            return false;
        }
        true
    }

    /// Confirm and produce the request for the given selection snapshot.
    ///
    /// Validates the preconditions again even though `can_confirm` gates the
    /// control, and latches the gate so a second confirm while the first is
    /// being dispatched is rejected with [`EngineError::AlreadyRunning`].
    pub fn confirm(&mut self, snapshot: Vec<EntityId>) -> EngineResult<OperationRequest> {
        if self.confirming {
            return Err(EngineError::AlreadyRunning);
        }
        if snapshot.is_empty() {
            return Err(EngineError::EmptySelection);
        }
        if self.action.requires_reason && self.reason.trim().is_empty() {
            return Err(EngineError::MissingReason(self.action.id.clone()));
        }
        if self.action.requires_message && self.message.trim().is_empty() {
            return Err(EngineError::MissingMessage(self.action.id.clone()));
        }

        self.confirming = true;

        let non_empty = |s: &str| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };

        Ok(OperationRequest {
            action: self.action.clone(),
            entity_ids: snapshot,
            input: OperatorInput {
                reason: non_empty(&self.reason),
                message: non_empty(&self.message),
            },
        })
    }

    /// Confirm and dispatch in one step. On a dispatch error the gate posts
    /// a generic failure notification and re-arms itself so the operator can
    /// retry or cancel; collected input is kept.
    pub async fn confirm_and_run(
        &mut self,
        runtime: &dyn BulkOperationRuntime,
        snapshot: Vec<EntityId>,
        sink: &dyn NotificationSink,
    ) -> EngineResult<RunHandle> {
        let request = self.confirm(snapshot)?;
        match runtime.run_bulk_operation(request).await {
            Ok(handle) => Ok(handle),
            Err(err) => {
                sink.error(
                    "Operation failed",
                    &format!("Could not start {}", self.action.label),
                );
                self.confirm_failed();
                Err(err)
            }
        }
    }

    /// Re-arm the gate after a dispatch error so the operator can retry or
    /// cancel; collected input is kept.
    pub fn confirm_failed(&mut self) {
        self.confirming = false;
    }

    /// Close the gate without producing a request.
    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ActionKind;

    fn ids(n: usize) -> Vec<EntityId> {
        (0..n).map(|i| EntityId::from(format!("u{}", i))).collect()
    }

    #[test]
    fn test_refuses_empty_selection() {
        let result = ConfirmationGate::open(ActionKind::Approve.descriptor(), 0);
        assert!(matches!(result, Err(EngineError::EmptySelection)));
    }

    #[test]
    fn test_confirm_without_required_fields() {
        let mut gate = ConfirmationGate::open(ActionKind::Approve.descriptor(), 5).unwrap();
        assert!(gate.can_confirm());

        let request = gate.confirm(ids(5)).unwrap();
        assert_eq!(request.entity_ids.len(), 5);
        assert_eq!(request.input.reason, None);
        assert_eq!(request.input.message, None);
    }

    #[test]
    fn test_required_reason_disables_confirm() {
        let mut gate = ConfirmationGate::open(ActionKind::Suspend.descriptor(), 3).unwrap();
        assert!(!gate.can_confirm());

        // Whitespace does not count
        gate.set_reason("   ");
        assert!(!gate.can_confirm());
        assert!(matches!(
            gate.confirm(ids(3)),
            Err(EngineError::MissingReason(_))
        ));

        gate.set_reason("policy violation");
        assert!(gate.can_confirm());
        let request = gate.confirm(ids(3)).unwrap();
        assert_eq!(request.input.reason.as_deref(), Some("policy violation"));
    }

    #[test]
    fn test_required_message_disables_confirm() {
        let mut gate = ConfirmationGate::open(ActionKind::Notify.descriptor(), 2).unwrap();
        assert!(!gate.can_confirm());
        assert!(matches!(
            gate.confirm(ids(2)),
            Err(EngineError::MissingMessage(_))
        ));

        gate.set_message("maintenance window tonight");
        let request = gate.confirm(ids(2)).unwrap();
        assert_eq!(
            request.input.message.as_deref(),
            Some("maintenance window tonight")
        );
    }

    #[test]
    fn test_double_confirm_is_latched() {
        let mut gate = ConfirmationGate::open(ActionKind::Approve.descriptor(), 4).unwrap();
        gate.confirm(ids(4)).unwrap();

        assert!(gate.is_confirming());
        assert!(!gate.can_confirm());
        assert!(matches!(
            gate.confirm(ids(4)),
            Err(EngineError::AlreadyRunning)
        ));
    }

    #[test]
    fn test_confirm_failed_rearms_and_keeps_input() {
        let mut gate = ConfirmationGate::open(ActionKind::Suspend.descriptor(), 4).unwrap();
        gate.set_reason("chargeback abuse");
        gate.confirm(ids(4)).unwrap();

        gate.confirm_failed();
        assert!(!gate.is_confirming());
        assert_eq!(gate.reason(), "chargeback abuse");
        assert!(gate.can_confirm());
        assert!(gate.confirm(ids(4)).is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_error_notifies_and_rearms() {
        use crate::catalog::ActionCatalog;
        use crate::runtime::InProcessRuntime;
        use crate::testkit::{RecordingSink, StubExecutor};
        use bulk_ops_sdk::NotificationLevel;
        use std::sync::Arc;

        // A runtime with an empty catalog rejects every dispatch
        let sink = Arc::new(RecordingSink::default());
        let runtime = InProcessRuntime::new(
            ActionCatalog::empty(),
            Arc::new(StubExecutor::ok()),
            sink.clone(),
        );

        let mut gate = ConfirmationGate::open(ActionKind::Approve.descriptor(), 2).unwrap();
        let result = gate.confirm_and_run(&runtime, ids(2), sink.as_ref()).await;
        assert!(matches!(result, Err(EngineError::UnknownAction(_))));

        let notes = sink.recorded();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].title, "Operation failed");

        // The gate stayed open for retry
        assert!(!gate.is_confirming());
        assert!(gate.can_confirm());
    }

    #[tokio::test]
    async fn test_dispatch_success_keeps_gate_latched() {
        use crate::catalog::ActionCatalog;
        use crate::runtime::InProcessRuntime;
        use crate::testkit::{RecordingSink, StubExecutor};
        use std::sync::Arc;

        let sink = Arc::new(RecordingSink::default());
        let runtime = InProcessRuntime::new(
            ActionCatalog::standard(),
            Arc::new(StubExecutor::ok()),
            sink.clone(),
        );

        let mut gate = ConfirmationGate::open(ActionKind::Approve.descriptor(), 2).unwrap();
        let handle = gate
            .confirm_and_run(&runtime, ids(2), sink.as_ref())
            .await
            .unwrap();
        assert_eq!(handle.action_id.as_str(), "approve");
        assert!(gate.is_confirming());
    }

    #[test]
    fn test_confirm_rejects_emptied_snapshot() {
        // Selection drained between opening the gate and confirming
        let mut gate = ConfirmationGate::open(ActionKind::Approve.descriptor(), 3).unwrap();
        assert!(matches!(
            gate.confirm(Vec::new()),
            Err(EngineError::EmptySelection)
        ));
        // A rejected confirm does not latch the gate
        assert!(gate.can_confirm());
    }
}
