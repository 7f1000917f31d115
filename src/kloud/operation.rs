//! Lifecycle operations routed by the orchestrator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::machine_state::MachineState;
use crate::protocol::{InfoArtifact, ProviderArtifact};

/// One of the lifecycle operations a provider implements.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a new machine.
    Build,
    /// Start a stopped machine.
    Start,
    /// Stop a running machine.
    Stop,
    /// Reboot a running machine.
    Restart,
    /// Destroy a machine.
    Destroy,
    /// Sample the machine state.
    Info,
}

impl Operation {
    /// Every operation, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Build,
        Self::Start,
        Self::Stop,
        Self::Restart,
        Self::Destroy,
        Self::Info,
    ];

    /// Lower-case name, used in eventer ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Destroy => "destroy",
            Self::Info => "info",
        }
    }

    /// State a machine is in while the operation runs.
    #[must_use]
    pub const fn in_progress_state(self) -> MachineState {
        match self {
            Self::Build => MachineState::Building,
            Self::Start => MachineState::Starting,
            Self::Stop => MachineState::Stopping,
            Self::Restart => MachineState::Rebooting,
            Self::Destroy => MachineState::Terminating,
            Self::Info => MachineState::Unknown,
        }
    }

    /// State a machine ends up in when the operation succeeds.
    #[must_use]
    pub const fn target_state(self) -> MachineState {
        match self {
            Self::Build | Self::Start | Self::Restart => MachineState::Running,
            Self::Stop => MachineState::Stopped,
            Self::Destroy => MachineState::Terminated,
            Self::Info => MachineState::Unknown,
        }
    }

    /// Returns `true` for operations that change the machine and therefore
    /// run under the resource lock.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Info)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when an operation name is not recognised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown operation '{0}'")]
pub struct ParseOperationError(pub String);

impl FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        Self::ALL
            .into_iter()
            .find(|operation| operation.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseOperationError(value.to_owned()))
    }
}

/// Result of a successful [`Kloud::execute`](super::Kloud::execute).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationOutcome {
    /// Build and Start produce an artifact.
    Artifact(ProviderArtifact),
    /// Info produces a state snapshot.
    Info(InfoArtifact),
    /// Stop, Restart and Destroy produce nothing.
    Completed,
}

impl OperationOutcome {
    /// The artifact, for Build and Start.
    #[must_use]
    pub const fn artifact(&self) -> Option<&ProviderArtifact> {
        match self {
            Self::Artifact(artifact) => Some(artifact),
            _ => None,
        }
    }
}
