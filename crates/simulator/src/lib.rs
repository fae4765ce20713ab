//! simulator: the simulation session, the two step-scheduling policies, the
//! arm order executor and a default kinematic playground.

use interface::SimulationConfig;

pub mod order;
pub mod pid;
pub mod playground;
pub mod scheduler;
pub mod sensor;
pub mod session;

pub use playground::ArmPlayground;
pub use scheduler::{HeadlessScheduler, InteractiveScheduler, Policy, StepScheduler};
pub use session::SimulationSession;

/// The physics world the session drives.
///
/// Implementations own bodies, joints, controllers and sensors; the session
/// only decides when each of these calls happens.
pub trait Simulation: Send + 'static {
    /// Throw the current world away and build a new one from `config`, with
    /// the arm at `pose` (one angle per joint).
    fn rebuild(&mut self, config: &SimulationConfig, pose: &[f64]);

    /// Append the current reading of every sensor, tagged with `step`.
    fn log_sensors(&mut self, step: u64);

    /// Run controllers (PID) once.
    fn update(&mut self);

    /// One physics micro-step.
    fn step(&mut self, dt: f64, velocity_iterations: u32, position_iterations: u32);

    /// Sensor names, in creation order.
    fn sensor_names(&self) -> Vec<String>;

    fn sensor_history(&self, channel: &str) -> Option<&[Vec<f64>]>;

    /// Hand an interleaved `[target, velocity, target, velocity, ...]`
    /// trajectory to the arm controller.
    fn apply_arm_order(&mut self, trajectory: &[f64]);

    /// Current joint angles.
    fn pose(&self) -> Vec<f64>;
}
