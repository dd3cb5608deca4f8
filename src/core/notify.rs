//! # Notifications
//!
//! The user-facing message surface. Modules and the router report outcomes
//! through a [`Notifier`]; the terminal front end shows them as toasts.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub severity: Severity,
    pub shown_at: Instant,
}

/// Bounded queue of recent notifications with expiry.
pub struct ToastQueue {
    toasts: Mutex<VecDeque<Toast>>,
    capacity: usize,
    ttl: Duration,
}

impl ToastQueue {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            toasts: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Most recent toast still on screen.
    pub fn latest(&self) -> Option<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.toasts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired toasts. Returns true if anything was removed.
    pub fn prune(&self, now: Instant) -> bool {
        let mut toasts = self.toasts.lock().unwrap_or_else(PoisonError::into_inner);
        let before = toasts.len();
        toasts.retain(|toast| now.saturating_duration_since(toast.shown_at) < self.ttl);
        toasts.len() != before
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, message: &str, severity: Severity) {
        log::info!("notify [{}]: {}", severity.label(), message);
        let mut toasts = self.toasts.lock().unwrap_or_else(PoisonError::into_inner);
        if toasts.len() == self.capacity {
            toasts.pop_front();
        }
        toasts.push_back(Toast {
            message: message.to_string(),
            severity,
            shown_at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_queue_keeps_latest_within_capacity() {
        let queue = ToastQueue::new(2, Duration::from_secs(5));
        queue.notify("one", Severity::Info);
        queue.notify("two", Severity::Success);
        queue.notify("three", Severity::Error);

        assert_eq!(queue.len(), 2);
        let latest = queue.latest().unwrap();
        assert_eq!(latest.message, "three");
        assert_eq!(latest.severity, Severity::Error);
    }

    #[test]
    fn test_toast_queue_prunes_expired() {
        let queue = ToastQueue::new(4, Duration::from_millis(10));
        queue.notify("old", Severity::Info);
        let later = Instant::now() + Duration::from_millis(50);

        assert!(queue.prune(later));
        assert!(queue.is_empty());
        assert!(!queue.prune(later));
    }
}
