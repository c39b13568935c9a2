//! Bundled notification sink with auto-dismiss.
//!
//! Hosts that do not bring their own [`NotificationSink`] can share one
//! `NotificationCenter` between the engine and their rendering layer: the
//! engine pushes, the host reads `active()` and sweeps `cleanup_expired()`
//! on its own cadence.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use bulk_ops_sdk::{Notification, NotificationSink};

/// A notification as stored by the center, with identity and age.
#[derive(Debug, Clone)]
pub struct PostedNotification {
    pub id: usize,
    pub posted_at: Instant,
    pub auto_dismiss_after: Option<Duration>,
    pub notification: Notification,
}

impl PostedNotification {
    fn expired(&self, now: Instant) -> bool {
        match self.auto_dismiss_after {
            Some(ttl) => now.duration_since(self.posted_at) >= ttl,
            None => false,
        }
    }
}

struct Inner {
    entries: Vec<PostedNotification>,
    next_id: usize,
}

/// Keeps the most recent notifications for display.
pub struct NotificationCenter {
    inner: Mutex<Inner>,
    ttl: Option<Duration>,
    max_entries: usize,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::with_ttl(Some(Duration::from_secs(5)))
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                next_id: 0,
            }),
            ttl,
            max_entries: 50,
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::with_ttl(config.notification_ttl)
    }

    /// Notifications that have not been dismissed or expired, oldest first.
    pub fn active(&self) -> Vec<PostedNotification> {
        let now = Instant::now();
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .iter()
            .filter(|entry| !entry.expired(now))
            .cloned()
            .collect()
    }

    /// Dismiss one notification by id.
    pub fn dismiss(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.retain(|entry| entry.id != id);
    }

    /// Drop expired notifications.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.entries.retain(|entry| !entry.expired(now));
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for NotificationCenter {
    fn notify(&self, notification: Notification) {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(PostedNotification {
            id,
            posted_at: Instant::now(),
            auto_dismiss_after: self.ttl,
            notification,
        });

        // Keep only recent notifications
        if inner.entries.len() > self.max_entries {
            inner.entries.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulk_ops_sdk::NotificationLevel;

    #[test]
    fn test_push_and_dismiss() {
        let center = NotificationCenter::with_ttl(None);
        center.success("Deactivate", "8/8 processed");
        center.error("Delete", "operation failed");

        let active = center.active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].notification.level, NotificationLevel::Success);
        assert_eq!(active[1].notification.level, NotificationLevel::Error);

        center.dismiss(active[0].id);
        let active = center.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].notification.title, "Delete");
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let center = NotificationCenter::with_ttl(Some(Duration::ZERO));
        center.info("Cancelled", "3/8 processed before cancel");
        assert!(center.active().is_empty());

        center.cleanup_expired();
        assert!(center.inner.lock().unwrap().entries.is_empty());
    }

    #[test]
    fn test_ttl_comes_from_config() {
        let config = crate::config::EngineConfig::default().with_notification_ttl(None);
        let center = NotificationCenter::from_config(&config);
        center.warning("Suspend", "2/4 processed, 2 failed");
        assert_eq!(center.active().len(), 1);
    }

    #[test]
    fn test_bounded_backlog() {
        let center = NotificationCenter::with_ttl(None);
        for i in 0..60 {
            center.info("note", &i.to_string());
        }
        let active = center.active();
        assert_eq!(active.len(), 50);
        // Oldest entries were evicted first
        assert_eq!(active[0].notification.message, "10");
    }
}
