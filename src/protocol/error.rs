//! Errors raised at the provider boundary.

use thiserror::Error;

use crate::machine_state::MachineState;
use crate::waitstate::WaitTimeout;

/// Errors returned by [`Provider`](super::Provider) operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when the operation is wired up incorrectly, for example when
    /// the options carry no eventer.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Raised when a required option is missing or empty.
    #[error("invalid machine options: missing or empty field {0}")]
    Validation(String),
    /// Raised when a remote resource does not exist.
    #[error("{resource} not found on the remote side")]
    RemoteNotFound {
        /// Description of the missing resource.
        resource: String,
    },
    /// Raised for any other remote API failure.
    #[error("remote call {action} failed: {message}")]
    RemoteApi {
        /// Remote call that failed.
        action: String,
        /// Message returned by the remote API.
        message: String,
    },
    /// Raised when the requested image cannot be found.
    #[error("image '{image}' not found")]
    ImageNotFound {
        /// Image id or name that was looked up.
        image: String,
    },
    /// Raised when the requested flavor is not offered.
    #[error("flavor '{flavor}' does not exist")]
    FlavorNotFound {
        /// Flavor id that was looked up.
        flavor: String,
    },
    /// Raised when a polling phase never observes its desired state.
    #[error(
        "timed out waiting for {desired} after {attempts} attempts (last observed state: {last_state})"
    )]
    Timeout {
        /// State the phase was waiting for.
        desired: MachineState,
        /// Last state observed before giving up.
        last_state: MachineState,
        /// Number of probe calls made.
        attempts: u32,
    },
}

impl ProviderError {
    /// Last machine state this error knows about, if any.
    #[must_use]
    pub const fn last_state(&self) -> Option<MachineState> {
        match self {
            Self::Timeout { last_state, .. } => Some(*last_state),
            _ => None,
        }
    }
}

impl From<WaitTimeout> for ProviderError {
    fn from(value: WaitTimeout) -> Self {
        Self::Timeout {
            desired: value.desired,
            last_state: value.last_state,
            attempts: value.attempts,
        }
    }
}
