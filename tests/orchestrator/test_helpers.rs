//! Shared fixtures for orchestrator BDD scenarios.

use std::sync::Arc;

use kloud::eventer::Event;
use kloud::test_support::{MemoryStorage, RecordingDeployer, ScriptedProvider};
use kloud::{Kloud, KloudError, MachineOptions, Operation, OperationOutcome};
use rstest::fixture;
use thiserror::Error;
use tokio::runtime::Runtime;

pub const PROVIDER_NAME: &str = "scripted";

#[derive(Clone, Debug)]
pub struct KloudContext {
    pub provider: ScriptedProvider,
    pub storage: MemoryStorage,
    pub deployer: RecordingDeployer,
    pub outcomes: Vec<Result<OperationOutcome, KloudError>>,
    pub events: Vec<Event>,
    pub remaining_eventers: Vec<String>,
}

#[derive(Clone, Debug, Error)]
pub enum KloudTestError {
    #[error("invalid kloud fixture: {0}")]
    Fixture(String),
}

/// One batch of identical requests against a single machine.
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    pub provider: &'a str,
    pub operation: Operation,
    pub machine_id: &'a str,
    pub count: usize,
}

#[fixture]
pub fn kloud_context() -> KloudContext {
    KloudContext {
        provider: ScriptedProvider::new(PROVIDER_NAME),
        storage: MemoryStorage::new(),
        deployer: RecordingDeployer::new(),
        outcomes: Vec::new(),
        events: Vec::new(),
        remaining_eventers: Vec::new(),
    }
}

/// Runs `request` on a fresh orchestrator wired to the context doubles and
/// records outcomes, drained events and leftover eventers.
pub fn run_requests(
    context: KloudContext,
    request: Request<'_>,
) -> Result<KloudContext, KloudTestError> {
    let runtime = Runtime::new().map_err(|err| KloudTestError::Fixture(err.to_string()))?;
    let orchestrator = Arc::new(
        Kloud::new()
            .with_storage(Arc::new(context.storage.clone()))
            .with_deployer(Arc::new(context.deployer.clone())),
    );
    orchestrator
        .register_provider(Arc::new(context.provider.clone()))
        .map_err(|err| KloudTestError::Fixture(err.to_string()))?;

    let options = MachineOptions::builder()
        .machine_id(request.machine_id)
        .instance_name("kloud-bdd")
        .username("bdd")
        .build()
        .map_err(|err| KloudTestError::Fixture(err.to_string()))?;

    let handles = runtime.block_on(async {
        (0..request.count)
            .map(|_| orchestrator.spawn(request.provider, request.operation, options.clone()))
            .collect::<Vec<_>>()
    });
    let mut outcomes = Vec::with_capacity(request.count);
    for handle in handles {
        let joined = runtime
            .block_on(handle)
            .map_err(|err| KloudTestError::Fixture(err.to_string()))?;
        outcomes.push(joined);
    }

    let event_id = Kloud::event_id(request.operation, request.machine_id);
    // Every task has joined, so each queued eventer is sealed and drains.
    let mut events = Vec::new();
    while let Some(drained) = orchestrator.events(&event_id) {
        events = drained;
    }
    Ok(KloudContext {
        outcomes,
        events,
        remaining_eventers: orchestrator.eventer_ids(),
        ..context
    })
}
