//! BDD scenarios for the lifecycle orchestrator.

use rstest_bdd_macros::scenario;

use super::test_helpers::{KloudContext, kloud_context};

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Build a machine through a registered provider"
)]
fn scenario_build(kloud_context: KloudContext) {
    drop(kloud_context);
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Reject an unregistered provider"
)]
fn scenario_unknown_provider(kloud_context: KloudContext) {
    drop(kloud_context);
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Surface provider failures with the last known state"
)]
fn scenario_provider_failure(kloud_context: KloudContext) {
    drop(kloud_context);
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Serialise concurrent operations on one machine"
)]
fn scenario_serialised(kloud_context: KloudContext) {
    drop(kloud_context);
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Report machine state without events"
)]
fn scenario_info(kloud_context: KloudContext) {
    drop(kloud_context);
}
