//! Interactive deployment: STEP is acknowledged at once and the steps run
//! one per frame.

mod common;

use anyhow::Result;
use client::connect_local;
use common::{WAIT, arm_config, start_local, stop};
use interface::{DisplayRequest, Outbound};
use server::init_tracing;
use simulator::Policy;

#[test]
fn queued_steps_run_one_per_frame() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Interactive)?;
    let mut client = connect_local(&hub)?;

    client.configure(arm_config())?;
    client.reset(None)?;
    client.step(3)?;
    client.step(2)?;

    let readings = client.wait_for_samples("armPos", 5, WAIT)?;
    assert_eq!(readings["armPos"].len(), 5);

    // nothing else is queued
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(client.sensors()?["armPos"].len(), 5);

    stop(&hub, control);
    Ok(())
}

#[test]
fn reset_is_read_after_the_queued_steps() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Interactive)?;
    let mut client = connect_local(&hub)?;

    client.configure(arm_config())?;
    client.reset(None)?;
    client.step(10)?;
    client.reset(None)?;

    // the ten steps ran before RESET was handled, so none are left over
    std::thread::sleep(std::time::Duration::from_millis(30));
    assert_eq!(client.sensors()?["armPos"].len(), 0);

    stop(&hub, control);
    Ok(())
}

#[test]
fn pointer_follow_flow() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Interactive)?;
    let mut client = connect_local(&hub)?;

    client.configure(arm_config())?;
    client.set_inverse(true)?;
    // the toggle has no reply; a HELLO round trip proves it was handled
    client.hello()?;

    hub.pointer(500.0, 300.0);
    let request = client.recv_timeout(WAIT)?;
    assert_eq!(
        request,
        Some(Outbound::InverseRequest {
            features: vec![0, 1],
            values: vec![100.0, 220.0],
        })
    );

    // disarmed after one request
    hub.pointer(500.0, 300.0);
    client.hello()?;
    assert!(client.take_inverse_requests().is_empty());

    stop(&hub, control);
    Ok(())
}

#[test]
fn display_history_overlay() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Interactive)?;
    let mut client = connect_local(&hub)?;
    client.configure(arm_config())?;

    let history = DisplayRequest {
        kind: DisplayRequest::HISTORY,
        points: vec![(0.0, 10.0), (5.0, 12.0)],
    };
    assert!(client.display(history)?);

    let unknown = DisplayRequest {
        kind: 3,
        points: vec![],
    };
    assert!(!client.display(unknown)?);

    stop(&hub, control);
    Ok(())
}
