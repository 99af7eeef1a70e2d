//! Behavioural tests for SAVE, FETCH and CLOSE against a live daemon.

use std::cell::RefCell;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{scenario, then, when};

use crate::peers::{CloseOutcome, FetchOutcome};

use super::support::RuntimeWorld;

const PATIENCE: Duration = Duration::from_secs(10);

#[fixture]
fn world() -> RefCell<RuntimeWorld> {
    RefCell::new(RuntimeWorld::new())
}

fn saved_id(world: &RuntimeWorld) -> Result<String, String> {
    world
        .saved_id
        .clone()
        .ok_or_else(|| "no request was saved".to_owned())
}

#[when("a durable client saves \"{service}\" with \"{body}\"")]
fn when_durable_save(world: &RefCell<RuntimeWorld>, service: String, body: String) {
    let mut world = world.borrow_mut();
    let id = world
        .titanic()
        .save(&service, body.as_bytes())
        .expect("save accepted");
    world.saved_id = Some(id);
}

#[when("a durable client submits \"{service}\" with \"{body}\"")]
fn when_durable_submit(world: &RefCell<RuntimeWorld>, service: String, body: String) {
    let mut world = world.borrow_mut();
    let (id, result) = world
        .titanic()
        .submit(&service, body.as_bytes(), Duration::from_millis(25), PATIENCE)
        .expect("durable request completes");
    world.saved_id = Some(id);
    world.durable_result = Some(result);
}

#[when("a durable client closes request \"{id}\"")]
fn when_durable_close(world: &RefCell<RuntimeWorld>, id: String) {
    let mut world = world.borrow_mut();
    let outcome = world.titanic().close(&id).expect("close answered");
    world.closed = Some(outcome);
}

#[then("fetching the saved request reports pending")]
fn then_fetch_pending(world: &RefCell<RuntimeWorld>) -> Result<(), String> {
    let world = world.borrow();
    let id = saved_id(&world)?;
    match world.titanic().fetch(&id) {
        Ok(FetchOutcome::Pending) => Ok(()),
        other => Err(format!("expected pending, got {other:?}")),
    }
}

#[then("fetching the saved request reports unknown")]
fn then_fetch_unknown(world: &RefCell<RuntimeWorld>) -> Result<(), String> {
    let world = world.borrow();
    let id = saved_id(&world)?;
    match world.titanic().fetch(&id) {
        Ok(FetchOutcome::Unknown) => Ok(()),
        other => Err(format!("expected unknown, got {other:?}")),
    }
}

#[then("the saved request eventually returns \"{body}\"")]
fn then_eventually_returns(world: &RefCell<RuntimeWorld>, body: String) -> Result<(), String> {
    let mut world = world.borrow_mut();
    world.await_durable_result(PATIENCE);
    match world.durable_result.as_deref() {
        Some(result) if result == body.as_bytes() => Ok(()),
        other => Err(format!("expected {body:?}, got {other:?}")),
    }
}

#[then("closing the saved request succeeds")]
fn then_close_succeeds(world: &RefCell<RuntimeWorld>) -> Result<(), String> {
    let world = world.borrow();
    let id = saved_id(&world)?;
    match world.titanic().close(&id) {
        Ok(CloseOutcome::Closed) => Ok(()),
        other => Err(format!("expected the request to close, got {other:?}")),
    }
}

#[then("the durable result is \"{body}\"")]
fn then_durable_result(world: &RefCell<RuntimeWorld>, body: String) {
    assert_eq!(
        world.borrow().durable_result.as_deref(),
        Some(body.as_bytes())
    );
}

#[then("the gateway reports the request unknown")]
fn then_gateway_unknown(world: &RefCell<RuntimeWorld>) {
    assert_eq!(world.borrow().closed, Some(CloseOutcome::Unknown));
}

#[scenario(
    path = "tests/features/durable_lifecycle.feature",
    name = "A saved request stays pending until a worker serves it"
)]
fn saved_request_waits_for_worker(world: RefCell<RuntimeWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/durable_lifecycle.feature",
    name = "Delivery skips an unreachable broker"
)]
fn delivery_skips_unreachable_broker(world: RefCell<RuntimeWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/durable_lifecycle.feature",
    name = "Closing an unknown request is harmless"
)]
fn closing_unknown_request(world: RefCell<RuntimeWorld>) {
    let _ = world;
}
