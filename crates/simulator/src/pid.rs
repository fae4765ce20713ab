/// Per-joint PID controller turning a target trajectory into joint
/// velocity commands.
///
/// The trajectory is interleaved: `[target_0, max_vel_0, target_1, ...]`.
/// Commands are clamped to each joint's maximum velocity.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    targets: Vec<f64>,
    max_velocities: Vec<f64>,
    integral: Vec<f64>,
    prev_error: Vec<Option<f64>>,
}

impl PidController {
    pub const DEFAULT_GAINS: (f64, f64, f64) = (0.85, 0.001, 5.0);

    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            targets: Vec::new(),
            max_velocities: Vec::new(),
            integral: Vec::new(),
            prev_error: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn execute(&mut self, trajectory: &[f64]) {
        let joints = trajectory.len() / 2;
        self.targets = trajectory.iter().step_by(2).copied().collect();
        self.max_velocities = trajectory
            .iter()
            .skip(1)
            .step_by(2)
            .map(|v| v.max(0.0))
            .collect();
        self.integral = vec![0.0; joints];
        self.prev_error = vec![None; joints];
    }

    /// Velocity command for every joint. Joints without a target hold still.
    pub fn command(&mut self, angles: &[f64], dt: f64) -> Vec<f64> {
        angles
            .iter()
            .enumerate()
            .map(|(i, angle)| {
                let Some(&target) = self.targets.get(i) else {
                    return 0.0;
                };
                let error = target - angle;
                self.integral[i] += error * dt;
                // derivative is taken per control tick
                let derivative = self.prev_error[i].map_or(0.0, |prev| error - prev);
                self.prev_error[i] = Some(error);

                let max = self.max_velocities[i];
                (self.kp * error + self.ki * self.integral[i] + self.kd * derivative)
                    .clamp(-max, max)
            })
            .collect()
    }
}

impl Default for PidController {
    fn default() -> Self {
        let (kp, ki, kd) = Self::DEFAULT_GAINS;
        Self::new(kp, ki, kd)
    }
}
