#![allow(dead_code)]

use std::{thread::JoinHandle, time::Duration};

use anyhow::Result;
use interface::{SimulationConfig, ToySpec};
use server::{
    ResetReply, ServerMode, ServerOptions, control::LoopExit, hub::SharedHub, spawn_server,
};
use simulator::{ArmPlayground, Policy};

pub const WAIT: Duration = Duration::from_secs(5);

/// Six 52-unit segments on a base at (400, 80), exposing only the tip.
pub fn arm_config() -> SimulationConfig {
    SimulationConfig {
        step_frequency: 60.0,
        step_iterations: 3,
        lengths: vec![52.0; 6],
        angle_limit: 2.0,
        base: (400, 80),
        channels: vec!["armPos".into()],
        ..Default::default()
    }
}

pub fn arm_config_with_ball() -> SimulationConfig {
    SimulationConfig {
        toys: vec![ToySpec::ball("ball1", (600.0, 400.0), 40.0)],
        channels: vec!["armPos".into(), "ball1Pos".into(), "joint9Pos".into()],
        ..arm_config()
    }
}

pub fn options(policy: Policy) -> ServerOptions {
    ServerOptions {
        mode: ServerMode::Local,
        policy,
        frame: Duration::from_millis(1),
        reset_reply: ResetReply::Ack,
    }
}

pub fn start_local(policy: Policy) -> Result<(SharedHub, JoinHandle<LoopExit>)> {
    spawn_server(options(policy), ArmPlayground::new())
}

pub fn stop(hub: &SharedHub, control: JoinHandle<LoopExit>) -> LoopExit {
    hub.shutdown();
    control.join().expect("control thread panicked")
}
