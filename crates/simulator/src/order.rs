//! Arm orders: move back to a start pose, then follow a trajectory to an
//! end pose under PID control.

use interface::{ArmOrder, ValidationError};
use tracing::debug;

use crate::{Simulation, StepScheduler, session::SimulationSession};

/// Every sequence of the order must hold one value per joint.
pub fn validate(order: &ArmOrder, joints: usize) -> Result<(), ValidationError> {
    let parts = [
        ("start pose", order.start.len()),
        ("end pose", order.end.len()),
        ("velocities", order.velocities.len()),
    ];
    for (what, found) in parts {
        if found != joints {
            return Err(ValidationError::JointCountMismatch {
                what,
                expected: joints,
                found,
            });
        }
    }
    Ok(())
}

/// Interleaved `[end_0, vel_0, end_1, vel_1, ...]`. Negative velocities
/// become 0.
pub fn trajectory(order: &ArmOrder) -> Vec<f64> {
    order
        .end
        .iter()
        .zip(&order.velocities)
        .flat_map(|(end, vel)| [*end, vel.max(0.0)])
        .collect()
}

/// Resets the world to the start pose, drops queued steps and loads the
/// trajectory. Does not step.
pub fn execute<S: Simulation>(
    order: &ArmOrder,
    session: &mut SimulationSession<S>,
    scheduler: &mut dyn StepScheduler<S>,
) -> Result<(), ValidationError> {
    let joints = session.joint_count().ok_or(ValidationError::NotConfigured)?;
    validate(order, joints)?;

    session.reset(Some(&order.start))?;
    scheduler.reset();
    let trajectory = trajectory(order);
    debug!(?trajectory, "arm order loaded");
    session.simulation_mut().apply_arm_order(&trajectory);
    Ok(())
}
