//! Quiet-period debouncer.
//!
//! Every [`Debouncer::tick`] pushes the deadline out to `now + quiet`;
//! [`Debouncer::settled`] resolves once the deadline passes with no further
//! ticks. A burst of N ticks spaced closer than `quiet` yields one settle.

use std::future::pending;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Quiet period used when the config does not override it.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Record a change event: (re)start the countdown.
    pub fn tick(&mut self) {
        self.deadline = Some(Instant::now() + self.quiet);
    }

    /// Drop a running countdown without settling.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Wait for the countdown to elapse, then disarm.
    ///
    /// Never resolves while disarmed. Cancel-safe: dropping the future before
    /// it completes leaves the countdown armed, so it can sit in a
    /// `tokio::select!` next to the tick source.
    pub async fn settled(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => pending::<()>().await,
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}
