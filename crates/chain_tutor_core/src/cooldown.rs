//! crates/chain_tutor_core/src/cooldown.rs
//!
//! Advisory rate-limit cooldown, modelled as a state machine checked against a
//! caller-supplied monotonic instant instead of a timer callback.

use std::time::{Duration, Instant};

/// The default retry cooldown after a rate-limit error.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cooldown {
    #[default]
    Idle,
    Active { expires_at: Instant },
}

impl Cooldown {
    /// Enters (or restarts) the cooldown at `now`.
    pub fn start(&mut self, now: Instant, length: Duration) {
        *self = Cooldown::Active {
            expires_at: now + length,
        };
    }

    /// Returns to `Idle` immediately.
    pub fn cancel(&mut self) {
        *self = Cooldown::Idle;
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.remaining(now).is_some()
    }

    /// Time left before the retry affordance re-enables, if still cooling down.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match *self {
            Cooldown::Idle => None,
            Cooldown::Active { expires_at } => {
                let left = expires_at.saturating_duration_since(now);
                (!left.is_zero()).then_some(left)
            }
        }
    }

    /// Collapses an expired cooldown back to `Idle`.
    pub fn settle(&mut self, now: Instant) {
        if !self.is_active(now) {
            *self = Cooldown::Idle;
        }
    }
}
