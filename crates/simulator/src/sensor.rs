/// What a sensor is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Intermediate arm joint, counted from the base.
    Joint(usize),
    /// End of the last segment.
    Tip,
    Toy(usize),
}

/// What a sensor measures on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Position,
    Angle,
    Velocity,
}

impl Probe {
    fn suffix(self) -> &'static str {
        match self {
            Probe::Position => "Pos",
            Probe::Angle => "Ang",
            Probe::Velocity => "Vel",
        }
    }
}

/// A sensor that keeps every reading since the world was built.
///
/// Each logged sample starts with the step index it was taken at, followed
/// by the probe's values: `[step, x, y]` for positions and velocities,
/// `[step, angle]` for angles.
#[derive(Debug, Clone)]
pub struct LogSensor {
    name: String,
    target: Target,
    probe: Probe,
    history: Vec<Vec<f64>>,
}

impl LogSensor {
    pub fn new(entity: &str, target: Target, probe: Probe) -> Self {
        Self {
            name: format!("{entity}{}", probe.suffix()),
            target,
            probe,
            history: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn probe(&self) -> Probe {
        self.probe
    }

    pub fn record(&mut self, step: u64, values: &[f64]) {
        let mut sample = Vec::with_capacity(values.len() + 1);
        sample.push(step as f64);
        sample.extend_from_slice(values);
        self.history.push(sample);
    }

    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }
}

/// Sensors of a freshly built world, in creation order: position and angle
/// of every intermediate joint, then the tip, then position and velocity of
/// every toy.
pub fn standard_sensors(joints: usize, toys: &[&str]) -> Vec<LogSensor> {
    let mut sensors = Vec::with_capacity(2 * joints + 2 * toys.len());
    for i in 0..joints.saturating_sub(1) {
        let entity = format!("joint{i}");
        sensors.push(LogSensor::new(&entity, Target::Joint(i), Probe::Position));
        sensors.push(LogSensor::new(&entity, Target::Joint(i), Probe::Angle));
    }
    sensors.push(LogSensor::new("arm", Target::Tip, Probe::Position));
    sensors.push(LogSensor::new("arm", Target::Tip, Probe::Angle));
    for (i, toy) in toys.iter().enumerate() {
        sensors.push(LogSensor::new(toy, Target::Toy(i), Probe::Position));
        sensors.push(LogSensor::new(toy, Target::Toy(i), Probe::Velocity));
    }
    sensors
}
