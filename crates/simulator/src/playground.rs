//! Default [`Simulation`]: a gravity-free walled square holding a kinematic
//! multi-segment arm driven by a PID controller, plus free toys the arm can
//! push around.

use std::f64::consts::FRAC_PI_2;

use interface::{AREA_SIZE, SimulationConfig, ToyKind, ToySpec, WALL_MARGIN};
use tracing::debug;

use crate::{
    Simulation,
    pid::PidController,
    sensor::{LogSensor, Probe, Target, standard_sensors},
};

/// Collision radius of the arm segments.
const ARM_RADIUS: f64 = 5.0;

#[derive(Debug, Clone)]
struct Toy {
    spec: ToySpec,
    position: (f64, f64),
    velocity: (f64, f64),
}

impl Toy {
    fn new(spec: &ToySpec) -> Self {
        Self {
            spec: spec.clone(),
            position: spec.position,
            velocity: (0.0, 0.0),
        }
    }

    /// Boxes collide as their inscribed circle.
    fn radius(&self) -> f64 {
        match self.spec.kind {
            ToyKind::Ball | ToyKind::Box => self.spec.size / 2.0,
        }
    }

    fn integrate(&mut self, dt: f64) {
        let damping = 1.0 / (1.0 + dt * self.spec.linear_damping);
        self.velocity.0 *= damping;
        self.velocity.1 *= damping;
        self.position.0 += self.velocity.0 * dt;
        self.position.1 += self.velocity.1 * dt;
    }

    fn bounce_off_walls(&mut self) {
        let r = self.radius();
        let lo = WALL_MARGIN + r;
        let hi = AREA_SIZE - WALL_MARGIN - r;
        let e = self.spec.restitution;

        let axes = [
            (&mut self.position.0, &mut self.velocity.0),
            (&mut self.position.1, &mut self.velocity.1),
        ];
        for (p, v) in axes {
            if *p < lo {
                *p = lo;
                *v = v.abs() * e;
            } else if *p > hi {
                *p = hi;
                *v = -v.abs() * e;
            }
        }
    }
}

#[derive(Debug)]
struct World {
    config: SimulationConfig,
    angles: Vec<f64>,
    joint_velocities: Vec<f64>,
    pid: PidController,
    toys: Vec<Toy>,
    sensors: Vec<LogSensor>,
}

impl World {
    fn build(config: &SimulationConfig, pose: &[f64]) -> Self {
        let toy_names: Vec<&str> = config.toys.iter().map(|t| t.name.as_str()).collect();
        Self {
            config: config.clone(),
            angles: pose.to_vec(),
            joint_velocities: vec![0.0; pose.len()],
            pid: PidController::default(),
            toys: config.toys.iter().map(Toy::new).collect(),
            sensors: standard_sensors(config.joint_count(), &toy_names),
        }
    }

    fn base(&self) -> (f64, f64) {
        (f64::from(self.config.base.0), f64::from(self.config.base.1))
    }

    /// Absolute orientation of every segment.
    fn orientations(&self) -> Vec<f64> {
        self.angles
            .iter()
            .scan(FRAC_PI_2, |acc, a| {
                *acc += a;
                Some(*acc)
            })
            .collect()
    }

    /// Base followed by the end point of every segment; the last one is the
    /// tip.
    fn joint_points(&self) -> Vec<(f64, f64)> {
        let mut points = Vec::with_capacity(self.angles.len() + 1);
        let mut p = self.base();
        points.push(p);
        for (len, theta) in self.config.lengths.iter().zip(self.orientations()) {
            p = (p.0 + len * theta.cos(), p.1 + len * theta.sin());
            points.push(p);
        }
        points
    }

    /// Points along the arm used for contacts: every joint and every
    /// segment midpoint.
    fn contact_points(&self) -> Vec<(f64, f64)> {
        let joints = self.joint_points();
        let mut points = joints.clone();
        points.extend(
            joints
                .windows(2)
                .map(|w| ((w[0].0 + w[1].0) / 2.0, (w[0].1 + w[1].1) / 2.0)),
        );
        points
    }

    fn sample(&self, target: Target, probe: Probe) -> Vec<f64> {
        let points = self.joint_points();
        let orientations = self.orientations();
        let (point, angle) = match target {
            Target::Joint(i) => (points[i + 1], orientations[i]),
            Target::Tip => {
                let last = orientations.len() - 1;
                (points[last + 1], orientations[last])
            }
            Target::Toy(i) => {
                let toy = &self.toys[i];
                return match probe {
                    Probe::Velocity => vec![toy.velocity.0, toy.velocity.1],
                    Probe::Position | Probe::Angle => vec![toy.position.0, toy.position.1],
                };
            }
        };
        match probe {
            Probe::Position | Probe::Velocity => vec![point.0, point.1],
            Probe::Angle => vec![angle],
        }
    }

    fn move_arm(&mut self, dt: f64) {
        let limit = self.config.angle_limit;
        for (angle, vel) in self.angles.iter_mut().zip(self.joint_velocities.iter_mut()) {
            let next = *angle + *vel * dt;
            *angle = next.clamp(-limit, limit);
            if next != *angle {
                *vel = 0.0;
            }
        }
    }

    /// Pushes toys out of the arm. Velocity passes exchange momentum with the
    /// moving arm, position passes remove the remaining overlap.
    fn resolve_contacts(
        &mut self,
        before: &[(f64, f64)],
        dt: f64,
        velocity_iterations: u32,
        position_iterations: u32,
    ) {
        let after = self.contact_points();
        let arm_velocity: Vec<(f64, f64)> = before
            .iter()
            .zip(&after)
            .map(|(b, a)| ((a.0 - b.0) / dt, (a.1 - b.1) / dt))
            .collect();

        for _ in 0..velocity_iterations {
            for toy in &mut self.toys {
                for (point, pv) in after.iter().zip(&arm_velocity) {
                    let Some((nx, ny, _)) = contact(toy, *point) else {
                        continue;
                    };
                    let rel = (toy.velocity.0 - pv.0, toy.velocity.1 - pv.1);
                    let vn = rel.0 * nx + rel.1 * ny;
                    if vn >= 0.0 {
                        continue;
                    }
                    let impulse = -(1.0 + toy.spec.restitution) * vn;
                    toy.velocity.0 += impulse * nx;
                    toy.velocity.1 += impulse * ny;

                    let friction = toy.spec.friction.min(1.0);
                    let vt = (rel.0 - vn * nx, rel.1 - vn * ny);
                    toy.velocity.0 -= friction * vt.0;
                    toy.velocity.1 -= friction * vt.1;
                }
            }
        }

        for _ in 0..position_iterations {
            for toy in &mut self.toys {
                for point in &after {
                    if let Some((nx, ny, depth)) = contact(toy, *point) {
                        toy.position.0 += nx * depth;
                        toy.position.1 += ny * depth;
                    }
                }
                toy.bounce_off_walls();
            }
        }
    }
}

/// Contact normal (pointing from the arm into the toy) and penetration
/// depth, if the toy overlaps the arm at `point`.
fn contact(toy: &Toy, point: (f64, f64)) -> Option<(f64, f64, f64)> {
    let dx = toy.position.0 - point.0;
    let dy = toy.position.1 - point.1;
    let dist = dx.hypot(dy);
    let depth = toy.radius() + ARM_RADIUS - dist;
    if depth <= 0.0 {
        return None;
    }
    if dist < f64::EPSILON {
        return Some((0.0, 1.0, depth));
    }
    Some((dx / dist, dy / dist, depth))
}

#[derive(Debug, Default)]
pub struct ArmPlayground {
    world: Option<World>,
}

impl ArmPlayground {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toy_position(&self, name: &str) -> Option<(f64, f64)> {
        self.world
            .as_ref()?
            .toys
            .iter()
            .find(|t| t.spec.name == name)
            .map(|t| t.position)
    }

    pub fn tip_position(&self) -> Option<(f64, f64)> {
        self.world.as_ref()?.joint_points().last().copied()
    }
}

impl Simulation for ArmPlayground {
    fn rebuild(&mut self, config: &SimulationConfig, pose: &[f64]) {
        debug!(
            joints = config.joint_count(),
            toys = config.toys.len(),
            "building playground"
        );
        self.world = Some(World::build(config, pose));
    }

    fn log_sensors(&mut self, step: u64) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let samples: Vec<Vec<f64>> = world
            .sensors
            .iter()
            .map(|s| world.sample(s.target(), s.probe()))
            .collect();
        for (sensor, values) in world.sensors.iter_mut().zip(samples) {
            sensor.record(step, &values);
        }
    }

    fn update(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        if world.pid.is_active() {
            let dt = 1.0 / world.config.step_frequency;
            world.joint_velocities = world.pid.command(&world.angles, dt);
        }
    }

    fn step(&mut self, dt: f64, velocity_iterations: u32, position_iterations: u32) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let before = world.contact_points();
        world.move_arm(dt);
        for toy in &mut world.toys {
            toy.integrate(dt);
            toy.bounce_off_walls();
        }
        world.resolve_contacts(&before, dt, velocity_iterations, position_iterations);
    }

    fn sensor_names(&self) -> Vec<String> {
        self.world
            .iter()
            .flat_map(|w| w.sensors.iter().map(|s| s.name().to_string()))
            .collect()
    }

    fn sensor_history(&self, channel: &str) -> Option<&[Vec<f64>]> {
        self.world
            .as_ref()?
            .sensors
            .iter()
            .find(|s| s.name() == channel)
            .map(LogSensor::history)
    }

    fn apply_arm_order(&mut self, trajectory: &[f64]) {
        if let Some(world) = self.world.as_mut() {
            world.pid.execute(trajectory);
        }
    }

    fn pose(&self) -> Vec<f64> {
        self.world
            .as_ref()
            .map(|w| w.angles.clone())
            .unwrap_or_default()
    }
}
