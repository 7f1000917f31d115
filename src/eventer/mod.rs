//! Per-operation progress streams.
//!
//! An [`Eventer`] belongs to exactly one in-flight lifecycle operation. The
//! provider appends [`Event`]s while it drives the remote API, subscribers
//! read the accumulated history or await the latest entry, and the
//! orchestrator seals the stream once the operation returns.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::machine_state::MachineState;

/// Number of events retained when no explicit capacity is configured.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A single progress record.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Event {
    /// Human readable description of the current step.
    pub message: String,
    /// Overall progress of the operation, between 0 and 100.
    pub percentage: u8,
    /// Machine state reported alongside the step.
    pub status: MachineState,
    /// Error text when the operation failed.
    pub error: Option<String>,
}

impl Event {
    /// Creates a progress event; `percentage` is clamped to 100.
    #[must_use]
    pub fn progress(message: impl Into<String>, percentage: u8, status: MachineState) -> Self {
        Self {
            message: message.into(),
            percentage: percentage.min(100),
            status,
            error: None,
        }
    }

    /// Creates an event describing a failed operation.
    #[must_use]
    pub fn failure(
        message: impl Into<String>,
        percentage: u8,
        status: MachineState,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::progress(message, percentage, status)
        }
    }
}

#[derive(Debug)]
struct EventLog {
    events: VecDeque<Event>,
    sealed: bool,
}

/// Append-only, bounded progress channel for one operation.
///
/// Pushing never blocks beyond a short critical section: once `capacity`
/// events are stored the oldest entry is overwritten.
#[derive(Debug)]
pub struct Eventer {
    id: String,
    capacity: usize,
    log: Mutex<EventLog>,
    latest: watch::Sender<Option<Event>>,
}

impl Eventer {
    /// Creates an eventer with [`DEFAULT_EVENT_CAPACITY`].
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_capacity(id, DEFAULT_EVENT_CAPACITY)
    }

    /// Creates an eventer retaining at most `capacity` events (minimum one).
    #[must_use]
    pub fn with_capacity(id: impl Into<String>, capacity: usize) -> Self {
        let bounded = capacity.max(1);
        let (latest, _) = watch::channel(None);
        Self {
            id: id.into(),
            capacity: bounded,
            log: Mutex::new(EventLog {
                events: VecDeque::with_capacity(bounded.min(DEFAULT_EVENT_CAPACITY)),
                sealed: false,
            }),
            latest,
        }
    }

    /// Creates an eventer with a random id, for operations nobody polls.
    #[must_use]
    pub fn anonymous(prefix: &str) -> Self {
        Self::new(format!("{prefix}-{}", Uuid::new_v4().simple()))
    }

    /// Identifier under which this eventer is registered.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    fn log(&self) -> MutexGuard<'_, EventLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event. Pushes after [`Self::seal`] are discarded.
    pub fn push(&self, event: Event) {
        {
            let mut log = self.log();
            if log.sealed {
                debug!(eventer = %self.id, message = %event.message, "dropping event pushed after seal");
                return;
            }
            if log.events.len() == self.capacity {
                log.events.pop_front();
            }
            log.events.push_back(event.clone());
        }
        self.latest.send_replace(Some(event));
    }

    /// Returns every retained event in push order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.log().events.iter().cloned().collect()
    }

    /// Returns the most recent event, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Event> {
        self.log().events.back().cloned()
    }

    /// Marks the stream as terminal; no further events are accepted.
    pub fn seal(&self) {
        self.log().sealed = true;
    }

    /// Returns `true` once the owning operation has returned.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.log().sealed
    }

    /// Subscribes to the latest pushed event.
    ///
    /// The receiver starts with the current latest event marked as seen, so
    /// `changed().await` resolves on the next push.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Event>> {
        self.latest.subscribe()
    }
}

/// Pushes progress for one operation and mirrors it to the log.
#[derive(Clone, Copy, Debug)]
pub struct Reporter<'a> {
    eventer: &'a Eventer,
    machine_id: &'a str,
    username: &'a str,
}

impl<'a> Reporter<'a> {
    /// Binds a reporter to an eventer and the machine it describes.
    #[must_use]
    pub const fn new(eventer: &'a Eventer, machine_id: &'a str, username: &'a str) -> Self {
        Self {
            eventer,
            machine_id,
            username,
        }
    }

    /// Logs and pushes a progress event.
    pub fn push(&self, message: impl Into<String>, percentage: u8, status: MachineState) {
        let event = Event::progress(message, percentage, status);
        info!(
            machine_id = self.machine_id,
            username = self.username,
            percentage = event.percentage,
            status = %event.status,
            "{}",
            event.message
        );
        self.eventer.push(event);
    }

    /// The underlying eventer.
    #[must_use]
    pub const fn eventer(&self) -> &'a Eventer {
        self.eventer
    }
}

#[cfg(test)]
mod tests;
