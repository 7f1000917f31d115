//! Unit tests for progress streams.

use std::time::Duration;

use tokio::time::timeout;

use super::*;

fn messages(eventer: &Eventer) -> Vec<String> {
    eventer
        .events()
        .into_iter()
        .map(|event| event.message)
        .collect()
}

#[test]
fn events_are_returned_in_push_order() {
    let eventer = Eventer::new("build-m1");
    eventer.push(Event::progress("first", 10, MachineState::Building));
    eventer.push(Event::progress("second", 20, MachineState::Building));
    eventer.push(Event::progress("third", 70, MachineState::Running));

    assert_eq!(messages(&eventer), vec!["first", "second", "third"]);
    assert_eq!(
        eventer.latest().map(|event| event.status),
        Some(MachineState::Running)
    );
}

#[test]
fn events_can_be_read_repeatedly() {
    let eventer = Eventer::new("stop-m1");
    eventer.push(Event::progress("one", 10, MachineState::Stopping));

    assert_eq!(eventer.events(), eventer.events());
    eventer.push(Event::progress("two", 20, MachineState::Stopping));
    assert_eq!(messages(&eventer), vec!["one", "two"]);
}

#[test]
fn percentage_is_clamped_to_one_hundred() {
    let event = Event::progress("overshoot", 250, MachineState::Running);
    assert_eq!(event.percentage, 100);
}

#[test]
fn sealed_eventer_discards_further_pushes() {
    let eventer = Eventer::new("destroy-m1");
    eventer.push(Event::progress("terminating", 10, MachineState::Terminating));
    eventer.seal();
    eventer.push(Event::progress("late", 90, MachineState::Terminated));

    assert!(eventer.is_sealed());
    assert_eq!(messages(&eventer), vec!["terminating"]);
}

#[test]
fn full_eventer_overwrites_oldest_event() {
    let eventer = Eventer::with_capacity("restart-m1", 2);
    eventer.push(Event::progress("a", 10, MachineState::Rebooting));
    eventer.push(Event::progress("b", 20, MachineState::Rebooting));
    eventer.push(Event::progress("c", 30, MachineState::Rebooting));

    assert_eq!(messages(&eventer), vec!["b", "c"]);
}

#[test]
fn zero_capacity_still_keeps_latest_event() {
    let eventer = Eventer::with_capacity("info-m1", 0);
    eventer.push(Event::progress("a", 10, MachineState::Running));
    eventer.push(Event::progress("b", 20, MachineState::Running));

    assert_eq!(messages(&eventer), vec!["b"]);
}

#[test]
fn failure_events_carry_error_text() {
    let event = Event::failure("build failed", 25, MachineState::Unknown, "boom");
    assert_eq!(event.error.as_deref(), Some("boom"));
    assert_eq!(event.percentage, 25);
}

#[test]
fn anonymous_eventers_get_distinct_ids() {
    let first = Eventer::anonymous("info");
    let second = Eventer::anonymous("info");
    assert!(first.id().starts_with("info-"));
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn subscriber_observes_next_push() {
    let eventer = Eventer::new("build-m2");
    let mut receiver = eventer.subscribe();

    eventer.push(Event::progress("creating", 20, MachineState::Building));

    timeout(Duration::from_secs(1), receiver.changed())
        .await
        .unwrap_or_else(|err| panic!("subscriber should be notified: {err}"))
        .unwrap_or_else(|err| panic!("sender should be alive: {err}"));
    let latest = receiver.borrow_and_update().clone();
    assert_eq!(latest.map(|event| event.message), Some(String::from("creating")));
}

#[test]
fn reporter_pushes_progress_events() {
    let eventer = Eventer::new("build-m3");
    let reporter = Reporter::new(&eventer, "m3", "alice");

    reporter.push("Creating server", 20, MachineState::Building);

    assert_eq!(
        eventer.latest(),
        Some(Event::progress("Creating server", 20, MachineState::Building))
    );
    assert_eq!(reporter.eventer().id(), "build-m3");
}
