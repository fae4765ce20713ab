use std::{collections::HashSet, fmt, str::FromStr};

use crate::error::{FormatError, ValidationError};

/// Side length of the square playground, in world units.
pub const AREA_SIZE: f64 = 800.0;

/// Thickness of the walls enclosing the playground.
pub const WALL_MARGIN: f64 = 50.0;

/// Simulation parameters sent by CONFIGURE.
///
/// Replaced wholesale by every CONFIGURE; the joint count (`lengths.len()`)
/// stays fixed until the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Steps per simulated second.
    pub step_frequency: f64,
    /// Physics micro-steps run for every step.
    pub step_iterations: u32,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    /// Segment length of each joint, base first.
    pub lengths: Vec<f64>,
    /// Symmetric joint angle limit, in radians.
    pub angle_limit: f64,
    pub base: (i32, i32),
    pub arm_collisions: bool,
    pub toys: Vec<ToySpec>,
    /// Sensor channels exposed to the client.
    pub channels: Vec<String>,
}

impl SimulationConfig {
    pub fn joint_count(&self) -> usize {
        self.lengths.len()
    }

    /// Duration of one physics micro-step; a step advances elapsed time by
    /// exactly this much.
    pub fn timestep(&self) -> f64 {
        1.0 / (f64::from(self.step_iterations) * self.step_frequency)
    }

    pub fn is_whitelisted(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |msg: String| Err(ValidationError::InvalidConfig(msg));

        if !(self.step_frequency.is_finite() && self.step_frequency > 0.0) {
            return invalid(format!("step frequency {} must be > 0", self.step_frequency));
        }
        if self.step_iterations == 0 {
            return invalid("step iterations must be at least 1".into());
        }
        if self.lengths.is_empty() {
            return invalid("the arm needs at least one joint".into());
        }
        if let Some(l) = self.lengths.iter().find(|l| !(l.is_finite() && **l > 0.0)) {
            return invalid(format!("segment length {l} must be > 0"));
        }
        if !(self.angle_limit.is_finite() && self.angle_limit >= 0.0) {
            return invalid(format!("angle limit {} must be >= 0", self.angle_limit));
        }

        let mut names = HashSet::new();
        for toy in &self.toys {
            toy.validate()?;
            if names_arm_sensor(&toy.name) {
                return invalid(format!(
                    "toy name `{}` clashes with the arm's sensors",
                    toy.name
                ));
            }
            if !names.insert(toy.name.as_str()) {
                return invalid(format!("toy name `{}` is used twice", toy.name));
            }
        }
        Ok(())
    }
}

/// Arm sensors are named `arm*` and `joint{i}*`.
fn names_arm_sensor(name: &str) -> bool {
    name == "arm"
        || name
            .strip_prefix("joint")
            .is_some_and(|i| !i.is_empty() && i.bytes().all(|b| b.is_ascii_digit()))
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_frequency: 60.0,
            step_iterations: 3,
            velocity_iterations: 8,
            position_iterations: 3,
            lengths: vec![52.0; 6],
            angle_limit: 2.0,
            base: ((AREA_SIZE / 2.0) as i32, 80),
            arm_collisions: false,
            toys: Vec::new(),
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToyKind {
    Ball,
    Box,
}

impl ToyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToyKind::Ball => "ball",
            ToyKind::Box => "box",
        }
    }
}

impl fmt::Display for ToyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToyKind {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ball" => Ok(ToyKind::Ball),
            // older clients call boxes cubes
            "box" | "cube" => Ok(ToyKind::Box),
            other => Err(FormatError::UnknownToyKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToySpec {
    pub kind: ToyKind,
    pub name: String,
    pub position: (f64, f64),
    pub size: f64,
    pub friction: f64,
    pub restitution: f64,
    pub density: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
}

impl ToySpec {
    pub fn ball(name: &str, position: (f64, f64), size: f64) -> Self {
        Self {
            kind: ToyKind::Ball,
            name: name.to_string(),
            position,
            size,
            friction: 0.3,
            restitution: 0.7,
            density: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;

        if self.name.is_empty() {
            return Err(ValidationError::InvalidConfig("toy without a name".into()));
        }
        if !(positive(self.size) && positive(self.density)) {
            return Err(ValidationError::InvalidConfig(format!(
                "toy `{}` needs a positive size and density",
                self.name
            )));
        }
        let coefficients = [
            self.friction,
            self.restitution,
            self.linear_damping,
            self.angular_damping,
        ];
        if !coefficients.into_iter().all(non_negative) {
            return Err(ValidationError::InvalidConfig(format!(
                "toy `{}` has a negative material coefficient",
                self.name
            )));
        }
        Ok(())
    }
}

/// Reachable area of the playground: `[min, max]` along x then y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl GeoBounds {
    /// The walls leave the same margin on every side, whatever the arm.
    pub fn reachable() -> Self {
        let span = (WALL_MARGIN, AREA_SIZE - WALL_MARGIN);
        Self { x: span, y: span }
    }

    pub fn as_array(&self) -> [[f64; 2]; 2] {
        [[self.x.0, self.x.1], [self.y.0, self.y.1]]
    }
}
