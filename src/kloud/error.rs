//! Errors returned by the orchestrator.

use thiserror::Error;

use crate::config::ConfigError;
use crate::idlock::IdLockError;
use crate::machine_state::MachineState;
use crate::protocol::ProviderError;

use super::Operation;

/// Errors raised by [`Kloud`](super::Kloud).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KloudError {
    /// No provider is registered under the requested name.
    #[error("provider '{name}' is not registered")]
    ProviderNotFound {
        /// Requested provider name.
        name: String,
    },
    /// A provider with the same name is already registered.
    #[error("provider '{name}' is already registered")]
    DuplicateProvider {
        /// Conflicting provider name.
        name: String,
    },
    /// The orchestrator configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// A lifecycle operation failed.
    #[error("{operation} of machine {machine_id} failed (last state: {last_state}): {source}")]
    Operation {
        /// Operation that failed.
        operation: Operation,
        /// Machine the operation targeted.
        machine_id: String,
        /// Last machine state known when the operation failed.
        last_state: MachineState,
        /// Underlying provider error.
        source: ProviderError,
    },
    /// The resource lock table is inconsistent.
    #[error("resource lock error: {0}")]
    Lock(#[from] IdLockError),
}

impl KloudError {
    /// Last machine state carried by the error, if any.
    #[must_use]
    pub const fn last_state(&self) -> Option<MachineState> {
        match self {
            Self::Operation { last_state, .. } => Some(*last_state),
            _ => None,
        }
    }
}
