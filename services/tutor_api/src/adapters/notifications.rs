//! services/tutor_api/src/adapters/notifications.rs
//!
//! A `NotificationSink` that mirrors every notification to the log and keeps
//! the most recent ones in memory until the browser drains them.

use chain_tutor_core::domain::{Notification, NotificationKind};
use chain_tutor_core::ports::NotificationSink;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{info, warn};

const DEFAULT_CAPACITY: usize = 64;

pub struct NotificationQueue {
    pending: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NotificationQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Takes every queued notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }
}

impl NotificationSink for NotificationQueue {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error => warn!(message = %notification.message, "Notification"),
            _ => info!(message = %notification.message, "Notification"),
        }

        let mut pending = match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        if pending.len() == self.capacity {
            pending.pop_front();
        }
        pending.push_back(notification);
    }
}
