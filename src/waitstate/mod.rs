//! Bounded polling until a remote machine reaches a desired state.
//!
//! A [`WaitState`] repeatedly calls a caller supplied probe, handing it the
//! interpolated percentage for the current attempt so the probe can report
//! progress. Polling stops when the probe returns the desired state, when the
//! probe fails (the error is returned unchanged), or when the attempt or time
//! budget from [`WaitConfig`] runs out.

mod progress;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::machine_state::MachineState;

pub use progress::interpolate;

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const MAX_ATTEMPTS: u32 = 100;
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Polling budget shared by every phase of a provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitConfig {
    /// Pause between two probe calls.
    pub poll_interval: Duration,
    /// Maximum number of probe calls per phase.
    pub max_attempts: u32,
    /// Wall-clock budget per phase.
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_attempts: MAX_ATTEMPTS,
            timeout: WAIT_TIMEOUT,
        }
    }
}

/// Raised when the desired state is not observed within the budget.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error(
    "timed out waiting for {desired} after {attempts} attempts (last observed state: {last_state})"
)]
pub struct WaitTimeout {
    /// State the loop was waiting for.
    pub desired: MachineState,
    /// Last state returned by the probe.
    pub last_state: MachineState,
    /// Number of probe calls made.
    pub attempts: u32,
}

/// One polling phase with its own progress window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitState {
    desired: MachineState,
    start: u8,
    finish: u8,
    config: WaitConfig,
}

impl WaitState {
    /// Creates a phase waiting for `desired`, reporting progress between
    /// `start` and `finish`. Bounds are clamped so that
    /// `start <= finish <= 100`.
    #[must_use]
    pub fn new(desired: MachineState, start: u8, finish: u8) -> Self {
        let upper = finish.min(100);
        Self {
            desired,
            start: start.min(upper),
            finish: upper,
            config: WaitConfig::default(),
        }
    }

    /// Replaces the polling budget.
    #[must_use]
    pub const fn with_config(mut self, config: WaitConfig) -> Self {
        self.config = config;
        self
    }

    /// State this phase waits for.
    #[must_use]
    pub const fn desired(&self) -> MachineState {
        self.desired
    }

    /// Progress window of this phase.
    #[must_use]
    pub const fn window(&self) -> (u8, u8) {
        (self.start, self.finish)
    }

    /// Polls `probe` until it reports the desired state.
    ///
    /// The probe receives the percentage for the current attempt. The loop
    /// sleeps for the poll interval between attempts, never after the last.
    ///
    /// # Errors
    ///
    /// Returns the probe's own error as soon as it fails, or a
    /// [`WaitTimeout`] (converted into `E`) when the attempt or time budget
    /// is exhausted.
    pub async fn wait<F, Fut, E>(&self, mut probe: F) -> Result<(), E>
    where
        F: FnMut(u8) -> Fut,
        Fut: Future<Output = Result<MachineState, E>>,
        E: From<WaitTimeout>,
    {
        let attempts = self.config.max_attempts.max(1);
        let deadline = Instant::now() + self.config.timeout;
        let mut last_state = MachineState::Unknown;
        let mut made = 0;

        while made < attempts {
            let percentage = interpolate(self.start, self.finish, made, attempts);
            made += 1;
            let state = probe(percentage).await?;
            if state == self.desired {
                debug!(desired = %self.desired, attempts = made, "desired state reached");
                return Ok(());
            }
            last_state = state;

            if made == attempts || Instant::now() + self.config.poll_interval > deadline {
                break;
            }
            sleep(self.config.poll_interval).await;
        }

        Err(WaitTimeout {
            desired: self.desired,
            last_state,
            attempts: made,
        }
        .into())
    }
}
