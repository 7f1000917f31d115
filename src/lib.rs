//! Core library for the Kloud machine lifecycle orchestrator.
//!
//! The crate routes Build, Start, Stop, Restart, Destroy and Info requests
//! to pluggable cloud providers, serialises mutating operations per machine
//! id, reports progress through per-operation eventers and ships an
//! OpenStack/Rackspace provider driven through the [`openstack::ComputeApi`]
//! boundary.

pub mod config;
pub mod eventer;
pub mod idlock;
pub mod kloud;
pub mod machine_state;
pub mod openstack;
pub mod protocol;
pub mod test_support;
pub mod waitstate;

pub use config::{ConfigError, KloudConfig, OpenstackConfig};
pub use eventer::{Event, Eventer, Reporter};
pub use idlock::{IdLock, IdLockError, IdLockGuard};
pub use kloud::{Kloud, KloudError, Operation, OperationOutcome};
pub use machine_state::MachineState;
pub use openstack::OpenstackProvider;
pub use protocol::{
    Deployer, InfoArtifact, MachineOptions, Provider, ProviderArtifact, ProviderError, Storage,
};
pub use waitstate::{WaitConfig, WaitState, WaitTimeout};
