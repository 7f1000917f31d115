//! Canonical machine lifecycle states.
//!
//! Remote APIs describe their instances with free-form status strings
//! (`ACTIVE`, `BUILD`, `shutoff`, ...). Every provider normalises those into a
//! [`MachineState`] through a [`StatusVocabulary`] table. The mapping is total:
//! unknown vocabulary resolves to [`MachineState::Unknown`] and is logged at
//! `warn` level so progress reporting never fails on a new remote status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Lifecycle state of a machine as seen by the orchestrator.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum MachineState {
    /// The remote status could not be mapped or has not been observed yet.
    #[default]
    Unknown,
    /// The machine is being provisioned.
    Building,
    /// The machine is up and serving.
    Running,
    /// The machine is being brought back up from a stopped state.
    Starting,
    /// The machine is shutting down.
    Stopping,
    /// The machine is down but can be started again.
    Stopped,
    /// The machine is rebooting.
    Rebooting,
    /// The machine is being destroyed.
    Terminating,
    /// The machine no longer exists.
    Terminated,
}

/// Table mapping lower-case provider status strings to canonical states.
pub type StatusVocabulary = &'static [(&'static str, MachineState)];

/// Vocabulary used when a provider does not ship its own table.
pub const GENERIC_VOCABULARY: StatusVocabulary = &[
    ("active", MachineState::Running),
    ("running", MachineState::Running),
    ("new", MachineState::Building),
    ("pending", MachineState::Building),
    ("build", MachineState::Building),
    ("building", MachineState::Building),
    ("provisioning", MachineState::Building),
    ("starting", MachineState::Starting),
    ("booting", MachineState::Starting),
    ("stopping", MachineState::Stopping),
    ("shutting_down", MachineState::Stopping),
    ("powering_off", MachineState::Stopping),
    ("stopped", MachineState::Stopped),
    ("off", MachineState::Stopped),
    ("shutoff", MachineState::Stopped),
    ("archive", MachineState::Stopped),
    ("reboot", MachineState::Rebooting),
    ("rebooting", MachineState::Rebooting),
    ("terminating", MachineState::Terminating),
    ("deleting", MachineState::Terminating),
    ("terminated", MachineState::Terminated),
    ("deleted", MachineState::Terminated),
    ("destroyed", MachineState::Terminated),
];

impl MachineState {
    /// All states in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Unknown,
        Self::Building,
        Self::Running,
        Self::Starting,
        Self::Stopping,
        Self::Stopped,
        Self::Rebooting,
        Self::Terminating,
        Self::Terminated,
    ];

    /// Maps a provider status through `vocabulary`, ignoring case and
    /// surrounding whitespace. Unmapped statuses yield [`Self::Unknown`] and a
    /// warning.
    #[must_use]
    pub fn from_status(status: &str, vocabulary: StatusVocabulary) -> Self {
        let needle = status.trim();
        let mapped = vocabulary
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(needle))
            .map(|(_, state)| *state);

        mapped.unwrap_or_else(|| {
            warn!(status, "unknown provider status, reporting Unknown");
            Self::Unknown
        })
    }

    /// Maps a provider status through [`GENERIC_VOCABULARY`].
    #[must_use]
    pub fn from_provider_status(status: &str) -> Self {
        Self::from_status(status, GENERIC_VOCABULARY)
    }

    /// Canonical name used for display and parsing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Building => "Building",
            Self::Running => "Running",
            Self::Starting => "Starting",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Rebooting => "Rebooting",
            Self::Terminating => "Terminating",
            Self::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when parsing a canonical state name fails.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unrecognised machine state: {0}")]
pub struct ParseMachineStateError(pub String);

impl FromStr for MachineState {
    type Err = ParseMachineStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ParseMachineStateError(value.to_owned()))
    }
}
