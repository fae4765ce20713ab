//! Malformed messages are dropped silently; semantically invalid ones are
//! answered with ERROR and leave the session alone.

mod common;

use std::time::Duration;

use anyhow::Result;
use client::connect_local;
use common::{arm_config, arm_config_with_ball, start_local, stop};
use interface::{ArmOrder, ClientMsg, Inbound, MessageKind, Outbound, wire};
use server::init_tracing;
use simulator::Policy;

#[test]
fn unknown_tag_is_ignored_and_the_next_message_handled() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Headless)?;
    let mut client = connect_local(&hub)?;
    client.configure(arm_config())?;
    client.reset(None)?;

    client.send_raw(ClientMsg {
        client_id: 0,
        tag: 12,
        body: Some(wire::ClientMsgBody::Step(wire::Step { count: 5 })),
    })?;
    // STEP tag with a text payload
    client.send_raw(ClientMsg {
        client_id: 0,
        tag: MessageKind::Step.tag(),
        body: Some(wire::ClientMsgBody::Text(wire::Text { text: "5".into() })),
    })?;
    assert_eq!(client.recv_timeout(Duration::from_millis(100))?, None);

    client.hello()?;
    assert_eq!(client.sensors()?["armPos"].len(), 0);

    stop(&hub, control);
    Ok(())
}

#[test]
fn mismatched_order_is_rejected_without_side_effects() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Headless)?;
    let mut client = connect_local(&hub)?;
    client.configure(arm_config())?;
    client.reset(None)?;
    client.step(4)?;

    let err = client
        .order(ArmOrder {
            start: vec![0.0; 6],
            end: vec![0.0; 6],
            velocities: vec![1.0; 5],
        })
        .unwrap_err();
    assert!(err.to_string().contains("velocities"), "{err}");

    assert_eq!(client.sensors()?["armPos"].len(), 4);

    stop(&hub, control);
    Ok(())
}

#[test]
fn order_beyond_the_joint_limit_is_rejected() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Headless)?;
    let mut client = connect_local(&hub)?;
    client.configure(arm_config())?;
    client.reset(None)?;
    client.step(3)?;

    let err = client
        .order(ArmOrder {
            start: vec![2.5; 6],
            end: vec![0.0; 6],
            velocities: vec![1.0; 6],
        })
        .unwrap_err();
    assert!(err.to_string().contains("outside the limit"), "{err}");
    assert_eq!(client.sensors()?["armPos"].len(), 3);

    client.order(ArmOrder {
        start: vec![2.0; 6],
        end: vec![0.0; 6],
        velocities: vec![1.0; 6],
    })?;
    assert_eq!(client.sensors()?["armPos"].len(), 0);

    stop(&hub, control);
    Ok(())
}

#[test]
fn toy_named_after_the_arm_is_refused() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Headless)?;
    let mut client = connect_local(&hub)?;

    let mut cfg = arm_config_with_ball();
    cfg.toys[0].name = "arm".into();
    let err = client.configure(cfg).unwrap_err();
    assert!(err.to_string().contains("clashes"), "{err}");

    stop(&hub, control);
    Ok(())
}

#[test]
fn requests_out_of_order_are_reported() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Headless)?;
    let mut client = connect_local(&hub)?;

    let err = client.reset(None).unwrap_err();
    assert!(err.to_string().contains("not configured"), "{err}");

    client.configure(arm_config())?;
    let err = client.step(1).unwrap_err();
    assert!(err.to_string().contains("no world"), "{err}");

    let err = client.reset(Some(vec![0.0; 3])).unwrap_err();
    assert!(err.to_string().contains("3 entries"), "{err}");

    let mut bad = arm_config();
    bad.step_iterations = 0;
    assert!(client.configure(bad).is_err());

    // the good configuration is still in place
    client.reset(None)?;
    client.step(1)?;
    assert_eq!(client.sensors()?["armPos"].len(), 1);

    stop(&hub, control);
    Ok(())
}

#[test]
fn sensor_query_is_limited_to_the_whitelist() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Headless)?;
    let mut client = connect_local(&hub)?;

    client.configure(arm_config_with_ball())?;
    assert!(client.sensors()?.is_empty());

    client.reset(None)?;
    client.step(2)?;
    let readings = client.sensors()?;
    let keys: Vec<_> = readings.keys().map(String::as_str).collect();
    assert_eq!(keys, ["armPos", "ball1Pos"]);
    assert_eq!(readings["ball1Pos"][0], vec![0.0, 600.0, 400.0]);

    stop(&hub, control);
    Ok(())
}

#[test]
fn client_error_reports_are_only_logged() -> Result<()> {
    init_tracing();
    let (hub, control) = start_local(Policy::Headless)?;
    let mut client = connect_local(&hub)?;

    client.send(&Inbound::Error("something broke on my side".into()))?;
    assert_eq!(client.recv_timeout(Duration::from_millis(100))?, None);
    assert!(matches!(client.request(Inbound::Hello)?, Outbound::Hello));

    stop(&hub, control);
    Ok(())
}
