//! BDD step definitions for the lifecycle orchestrator.

use std::time::Duration;

use kloud::{KloudError, MachineState, Operation, OperationOutcome, ProviderError};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{KloudContext, KloudTestError, PROVIDER_NAME, Request, run_requests};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] KloudTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn parse_operation(value: &str) -> Result<Operation, StepError> {
    value
        .parse()
        .map_err(|err| StepError::Assertion(format!("{err}")))
}

fn parse_state(value: &str) -> Result<MachineState, StepError> {
    value
        .parse()
        .map_err(|err| StepError::Assertion(format!("{err}")))
}

fn single_outcome(
    kloud_context: &KloudContext,
) -> Result<&Result<OperationOutcome, KloudError>, StepError> {
    match kloud_context.outcomes.as_slice() {
        [only] => Ok(only),
        other => Err(StepError::Assertion(format!(
            "expected exactly one outcome, got {}",
            other.len()
        ))),
    }
}

#[given("a kloud with a scripted provider")]
fn scripted_kloud(kloud_context: KloudContext) -> KloudContext {
    kloud_context
}

#[given("the provider fails \"{operation}\" with last state \"{state}\"")]
fn provider_fails(
    mut kloud_context: KloudContext,
    operation: String,
    state: String,
) -> Result<KloudContext, StepError> {
    let failing = parse_operation(&operation)?;
    let last_state = parse_state(&state)?;
    kloud_context.provider = kloud_context.provider.failing(
        failing.as_str(),
        ProviderError::Timeout {
            desired: failing.target_state(),
            last_state,
            attempts: 1,
        },
    );
    Ok(kloud_context)
}

#[given("the provider takes \"{millis}\" milliseconds per call")]
fn provider_is_slow(mut kloud_context: KloudContext, millis: u64) -> KloudContext {
    kloud_context.provider = kloud_context
        .provider
        .with_delay(Duration::from_millis(millis));
    kloud_context
}

#[given("the provider reports state \"{state}\"")]
fn provider_reports_state(
    mut kloud_context: KloudContext,
    state: String,
) -> Result<KloudContext, StepError> {
    let reported = parse_state(&state)?;
    kloud_context.provider = kloud_context.provider.with_info_state(reported);
    Ok(kloud_context)
}

#[when("I run \"{operation}\" on machine \"{machine}\"")]
fn run_operation(
    kloud_context: KloudContext,
    operation: String,
    machine: String,
) -> Result<KloudContext, StepError> {
    let request = Request {
        provider: PROVIDER_NAME,
        operation: parse_operation(&operation)?,
        machine_id: &machine,
        count: 1,
    };
    Ok(run_requests(kloud_context, request)?)
}

#[when("I ask provider \"{provider}\" to \"{operation}\" machine \"{machine}\"")]
fn run_on_provider(
    kloud_context: KloudContext,
    provider: String,
    operation: String,
    machine: String,
) -> Result<KloudContext, StepError> {
    let request = Request {
        provider: &provider,
        operation: parse_operation(&operation)?,
        machine_id: &machine,
        count: 1,
    };
    Ok(run_requests(kloud_context, request)?)
}

#[when("\"{count}\" concurrent \"{operation}\" operations run on machine \"{machine}\"")]
fn run_concurrently(
    kloud_context: KloudContext,
    count: usize,
    operation: String,
    machine: String,
) -> Result<KloudContext, StepError> {
    let request = Request {
        provider: PROVIDER_NAME,
        operation: parse_operation(&operation)?,
        machine_id: &machine,
        count,
    };
    Ok(run_requests(kloud_context, request)?)
}

#[then("the operation succeeds")]
fn operation_succeeds(kloud_context: &KloudContext) -> Result<(), StepError> {
    match single_outcome(kloud_context)? {
        Ok(_) => Ok(()),
        Err(err) => Err(StepError::Assertion(format!(
            "expected success, got failure: {err}"
        ))),
    }
}

#[then("every operation succeeds")]
fn every_operation_succeeds(kloud_context: &KloudContext) -> Result<(), StepError> {
    if let Some(Err(err)) = kloud_context.outcomes.iter().find(|outcome| outcome.is_err()) {
        return Err(StepError::Assertion(format!(
            "expected every operation to succeed, got: {err}"
        )));
    }
    Ok(())
}

#[then("the operation fails with \"{kind}\"")]
fn operation_fails_with(kloud_context: &KloudContext, kind: String) -> Result<(), StepError> {
    let Err(err) = single_outcome(kloud_context)? else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    let matches_kind = match kind.as_str() {
        "provider not found" => matches!(err, KloudError::ProviderNotFound { .. }),
        "operation" => matches!(err, KloudError::Operation { .. }),
        other => {
            return Err(StepError::Assertion(format!(
                "unknown failure kind: {other}"
            )));
        }
    };
    if matches_kind {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure kind {kind}, got {err:?}"
        )))
    }
}

#[then("the terminal event reports \"{percentage}\" percent and state \"{state}\"")]
fn terminal_event_reports(
    kloud_context: &KloudContext,
    percentage: u8,
    state: String,
) -> Result<(), StepError> {
    let expected = parse_state(&state)?;
    let terminal = kloud_context
        .events
        .last()
        .ok_or_else(|| StepError::Assertion(String::from("no events were drained")))?;
    if terminal.percentage == percentage && terminal.status == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {percentage}% {expected}, got {}% {}",
            terminal.percentage, terminal.status
        )))
    }
}

#[then("the terminal event carries an error")]
fn terminal_event_has_error(kloud_context: &KloudContext) -> Result<(), StepError> {
    match kloud_context.events.last() {
        Some(event) if event.error.is_some() => Ok(()),
        Some(event) => Err(StepError::Assertion(format!(
            "terminal event has no error: {event:?}"
        ))),
        None => Err(StepError::Assertion(String::from("no events were drained"))),
    }
}

#[then("the artifact is stored and deployed")]
fn artifact_stored_and_deployed(kloud_context: &KloudContext) -> Result<(), StepError> {
    let Ok(OperationOutcome::Artifact(artifact)) = single_outcome(kloud_context)? else {
        return Err(StepError::Assertion(String::from(
            "expected an artifact outcome",
        )));
    };
    let stored = kloud_context
        .storage
        .artifact("m-1")
        .ok_or_else(|| StepError::Assertion(String::from("artifact was not stored")))?;
    if stored != *artifact {
        return Err(StepError::Assertion(format!(
            "stored artifact {stored:?} differs from {artifact:?}"
        )));
    }
    if kloud_context.deployer.deployed() == vec![stored] {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "deployer should receive the artifact once",
        )))
    }
}

#[then("storage records state \"{state}\"")]
fn storage_records_state(kloud_context: &KloudContext, state: String) -> Result<(), StepError> {
    let expected = parse_state(&state)?;
    let updates = kloud_context.storage.state_updates();
    match updates.last() {
        Some((_, recorded)) if *recorded == expected => Ok(()),
        _ => Err(StepError::Assertion(format!(
            "expected last stored state {expected}, got {updates:?}"
        ))),
    }
}

#[then("the provider saw at most \"{count}\" calls in flight")]
fn provider_peak(kloud_context: &KloudContext, count: usize) -> Result<(), StepError> {
    let peak = kloud_context.provider.peak_in_flight();
    if peak <= count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected at most {count} calls in flight, saw {peak}"
        )))
    }
}

#[then("the provider was not called")]
fn provider_not_called(kloud_context: &KloudContext) -> Result<(), StepError> {
    let calls = kloud_context.provider.calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "provider should not be called, got {calls:?}"
        )))
    }
}

#[then("the machine is reported as \"{state}\"")]
fn machine_reported_as(kloud_context: &KloudContext, state: String) -> Result<(), StepError> {
    let expected = parse_state(&state)?;
    match single_outcome(kloud_context)? {
        Ok(OperationOutcome::Info(snapshot)) if snapshot.state == expected => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected info reporting {expected}, got {other:?}"
        ))),
    }
}

#[then("no eventer remains registered")]
fn no_eventer_remains(kloud_context: &KloudContext) -> Result<(), StepError> {
    if kloud_context.remaining_eventers.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "eventers left behind: {:?}",
            kloud_context.remaining_eventers
        )))
    }
}
