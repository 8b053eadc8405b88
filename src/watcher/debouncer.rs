//! Debounce state machine for a single watched path.
//!
//! Editors rarely save in one write: truncate+write, several flushes, or
//! delete-then-recreate all show up as bursts. The debouncer collapses a
//! burst of `Modified` events into one firing after a quiet period, and
//! holds `Removed` events for a grace period so the caller can check
//! whether the file came back before declaring it deleted.

use std::time::{Duration, Instant};

use super::FsEvent;

/// Something the watch loop has to act on now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    /// Quiet period elapsed; fire the change callback once.
    Fire,
    /// Grace period elapsed; check whether the path still exists.
    CheckRemoval,
}

/// Debounces raw events for one path.
#[derive(Debug)]
pub struct Debouncer {
    /// Quiet period before a change fires.
    quiet: Duration,
    /// How long a removal is held before it is trusted.
    grace: Duration,
    /// Deadline of the pending change, reset on every modification.
    fire_at: Option<Instant>,
    /// Deadline of the pending existence check.
    removal_at: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration, grace: Duration) -> Self {
        Self {
            quiet,
            grace,
            fire_at: None,
            removal_at: None,
        }
    }

    /// Record a raw event observed at `now`.
    ///
    /// While a removal is pending, modifications are absorbed: if the file
    /// comes back the existence check schedules exactly one change.
    pub fn record(&mut self, event: FsEvent, now: Instant) {
        match event {
            FsEvent::Modified => {
                if self.removal_at.is_none() {
                    self.fire_at = Some(now + self.quiet);
                }
            }
            FsEvent::Removed => {
                self.fire_at = None;
                self.removal_at.get_or_insert(now + self.grace);
            }
        }
    }

    /// Earliest deadline the caller should wake up for.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.removal_at.or(self.fire_at)
    }

    /// Take whatever is due at `now`, clearing it.
    pub fn take_ready(&mut self, now: Instant) -> Option<Due> {
        if let Some(at) = self.removal_at {
            if now >= at {
                self.removal_at = None;
                return Some(Due::CheckRemoval);
            }
            return None;
        }

        match self.fire_at {
            Some(at) if now >= at => {
                self.fire_at = None;
                Some(Due::Fire)
            }
            _ => None,
        }
    }
}
