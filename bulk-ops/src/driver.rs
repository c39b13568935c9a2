//! Sequential execution driver.
//!
//! One driver task per run: it walks the selection snapshot in order, awaits
//! the injected executor once per entity, and tallies `completed`/`failed`
//! after every attempt. Cancellation is cooperative and only takes effect
//! between attempts, so counts are exact and an in-flight call is never torn.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bulk_ops_sdk::{
    ActionExecutor, CompletionHook, NotificationSink, OperationRequest, OperationSummary,
    RunEvent, RunStatus,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::runtime::SharedRuns;

pub(crate) async fn drive(
    run_id: Uuid,
    request: OperationRequest,
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn NotificationSink>,
    hook: Option<CompletionHook>,
    runs: SharedRuns,
    retain_finished: bool,
) {
    let action = request.action.clone();
    let total = request.entity_ids.len();
    let started_at = Utc::now();

    let started = RunEvent::RunStarted {
        action_id: action.id.clone(),
        label: action.label.clone(),
        total,
    };
    let (cancelled, events_tx) = {
        let mut runs = runs.lock().unwrap();
        let Some(state) = runs.get_mut(&run_id) else {
            return;
        };
        state.event_log.push(started.clone());
        (state.cancelled.clone(), state.events_tx.clone())
    };
    let _ = events_tx.send(started);
    info!(action = %action.id, total, "bulk run started");

    for entity in &request.entity_ids {
        // Cancellation checkpoint: between attempts, never mid-attempt
        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        let outcome = executor.apply(&action.id, entity).await;

        let event = {
            let mut runs = runs.lock().unwrap();
            let Some(state) = runs.get_mut(&run_id) else {
                return;
            };
            state.progress.completed += 1;
            let event = match &outcome {
                Ok(()) => {
                    debug!(action = %action.id, entity = %entity, "entity processed");
                    RunEvent::EntitySucceeded {
                        entity_id: entity.clone(),
                        completed: state.progress.completed,
                        total: state.progress.total,
                    }
                }
                Err(err) => {
                    state.progress.failed += 1;
                    warn!(action = %action.id, entity = %entity, error = %err, "entity failed");
                    RunEvent::EntityFailed {
                        entity_id: entity.clone(),
                        error: err.to_string(),
                        completed: state.progress.completed,
                        failed: state.progress.failed,
                        total: state.progress.total,
                    }
                }
            };
            state.event_log.push(event.clone());
            event
        };
        let _ = events_tx.send(event);
    }

    // Terminal state: a run that attempted its whole snapshot completed, even
    // if a cancellation request landed after the last attempt began.
    let (status, summary) = {
        let mut runs = runs.lock().unwrap();
        let Some(state) = runs.get_mut(&run_id) else {
            return;
        };
        let status = if state.progress.completed < state.progress.total {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        state.status = status;
        state.progress.is_running = false;

        let summary = OperationSummary {
            action_id: action.id.clone(),
            total: state.progress.total,
            completed: state.progress.completed,
            failed: state.progress.failed,
            started_at,
            finished_at: Utc::now(),
        };
        state.summary = Some(summary.clone());

        let event = match status {
            RunStatus::Cancelled => RunEvent::RunCancelled {
                summary: summary.clone(),
            },
            _ => RunEvent::RunCompleted {
                summary: summary.clone(),
            },
        };
        state.event_log.push(event.clone());
        let _ = events_tx.send(event);
        (status, summary)
    };
    info!(
        action = %action.id,
        status = %status,
        completed = summary.completed,
        failed = summary.failed,
        "bulk run finished"
    );

    // Completion hook, exactly once. A hook error is an orchestration
    // failure: flip to Failed but keep the accumulated counts visible.
    let mut orchestration_failed = false;
    if let Some(hook) = hook {
        if let Err(err) = (hook)(summary.clone()).await {
            let event = RunEvent::RunFailed {
                summary: summary.clone(),
                error: err.to_string(),
            };
            {
                let mut runs = runs.lock().unwrap();
                if let Some(state) = runs.get_mut(&run_id) {
                    state.status = RunStatus::Failed;
                    state.event_log.push(event.clone());
                }
            }
            let _ = events_tx.send(event);
            error!(action = %action.id, error = %err, "bulk run orchestration failed");
            sink.error(
                "Bulk operation failed",
                &format!("{}: {}", action.label, err),
            );
            orchestration_failed = true;
        }
    }

    if !orchestration_failed {
        match status {
            RunStatus::Cancelled => sink.info(
                &action.label,
                &format!(
                    "Cancelled: {}/{} processed, {} failed",
                    summary.completed, summary.total, summary.failed
                ),
            ),
            _ if summary.failed > 0 => sink.warning(
                &action.label,
                &format!(
                    "{}/{} processed, {} failed",
                    summary.completed, summary.total, summary.failed
                ),
            ),
            _ => sink.success(
                &action.label,
                &format!("{}/{} processed", summary.completed, summary.total),
            ),
        }
    }

    // Hosts that opt out of the visible terminal period get their run state
    // swept as soon as the summary has been delivered
    if !retain_finished {
        runs.lock().unwrap().remove(&run_id);
    }
}
