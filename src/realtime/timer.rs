//! Single-slot timers owned by the client event loop
//!
//! A [`Timer`] is an optional deadline. Arming always replaces the previous
//! deadline, so a timer kind can never have two outstanding instances, and
//! cancelling is just dropping the deadline. The event loop waits on
//! [`Timer::expired`] for whatever deadline is current.

use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
pub struct Timer {
    name: &'static str,
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            deadline: None,
        }
    }

    /// Cancel any pending deadline and arm a new one `after` from now
    pub fn rearm(&mut self, after: Duration) {
        if self.deadline.is_some() {
            trace!(timer = self.name, "Replacing pending timer");
        }
        self.deadline = Some(Instant::now() + after);
    }

    /// Returns whether a deadline was pending
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.deadline.take().is_some();
        if was_armed {
            trace!(timer = self.name, "Timer cancelled");
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves at `deadline`, or never when there is none
    pub async fn expired(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
