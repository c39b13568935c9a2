//! Pure derived view over a run's progress counters.

use bulk_ops_sdk::ExecutionProgress;

/// What a host renders for one progress snapshot. Carries no state of its
/// own; recompute it from every [`ExecutionProgress`] snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub succeeded: usize,
    /// Attempted share of the snapshot, rounded, always in 0..=100.
    pub percentage: u8,
    /// Share of attempts that succeeded, rounded; 100 before any attempt.
    pub success_rate: u8,
    pub is_done: bool,
    pub operation_label: String,
}

impl ProgressReport {
    pub fn from_progress(progress: &ExecutionProgress) -> Self {
        Self {
            total: progress.total,
            completed: progress.completed,
            failed: progress.failed,
            succeeded: progress.succeeded(),
            percentage: progress.percentage(),
            success_rate: progress.success_rate(),
            is_done: !progress.is_running,
            operation_label: progress.operation_label.clone(),
        }
    }
}

impl From<&ExecutionProgress> for ProgressReport {
    fn from(progress: &ExecutionProgress) -> Self {
        Self::from_progress(progress)
    }
}
