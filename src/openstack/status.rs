//! Nova server status vocabulary.

use crate::machine_state::{MachineState, StatusVocabulary};

/// Nova status strings and the machine states they map to.
pub const NOVA_VOCABULARY: StatusVocabulary = &[
    ("ACTIVE", MachineState::Running),
    ("BUILD", MachineState::Building),
    ("REBUILD", MachineState::Building),
    ("RESIZE", MachineState::Building),
    ("VERIFY_RESIZE", MachineState::Building),
    ("MIGRATING", MachineState::Building),
    ("PASSWORD", MachineState::Running),
    ("RESCUE", MachineState::Running),
    ("REBOOT", MachineState::Rebooting),
    ("HARD_REBOOT", MachineState::Rebooting),
    ("SHUTOFF", MachineState::Stopped),
    ("STOPPED", MachineState::Stopped),
    ("SUSPENDED", MachineState::Stopped),
    ("PAUSED", MachineState::Stopped),
    ("SHELVED", MachineState::Stopped),
    ("SHELVED_OFFLOADED", MachineState::Stopped),
    ("SOFT_DELETED", MachineState::Terminating),
    ("DELETED", MachineState::Terminated),
];

/// Maps a Nova status to a machine state.
#[must_use]
pub fn nova_state(status: &str) -> MachineState {
    MachineState::from_status(status, NOVA_VOCABULARY)
}
