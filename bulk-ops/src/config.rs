//! Engine configuration.

use std::time::Duration;

/// Tunables for the in-process runtime and the notification center.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of each run's event broadcast channel.
    pub event_channel_capacity: usize,
    /// How long notifications stay active before `cleanup_expired` drops
    /// them. `None` keeps them until explicitly dismissed.
    pub notification_ttl: Option<Duration>,
    /// Keep terminal runs in the executions map until dismissed, so final
    /// counts stay readable. When false, `cleanup_finished` may be used to
    /// sweep them eagerly.
    pub retain_finished_runs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 1000,
            notification_ttl: Some(Duration::from_secs(5)),
            retain_finished_runs: true,
        }
    }
}

impl EngineConfig {
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_notification_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.notification_ttl = ttl;
        self
    }

    pub fn with_retain_finished_runs(mut self, retain: bool) -> Self {
        self.retain_finished_runs = retain;
        self
    }
}
