use std::{collections::BTreeMap, sync::Arc};

use interface::{
    DisplayRequest, GeoBounds, Outbound, Readings, ResultDump, SimulationConfig, ValidationError,
};
use tracing::debug;

use crate::Simulation;

/// Overlay layer DISPLAY appends to.
pub const HISTORY_LAYER: &str = "history";
/// Overlay layer recording where the pointer asked the arm to go.
pub const POINTER_LAYER: &str = "mouse";

/// One configured, resettable simulation plus the protocol state around it.
///
/// The session owns the [`Simulation`] and performs every step; schedulers
/// only decide when [`SimulationSession::advance`] is called.
pub struct SimulationSession<S: Simulation> {
    sim: S,
    config: Option<Arc<SimulationConfig>>,
    /// Config the current world was built from.
    world_config: Option<Arc<SimulationConfig>>,
    elapsed: f64,
    steps: u64,
    epoch: u64,
    overlay: BTreeMap<String, Vec<(f64, f64)>>,
    inverse_armed: bool,
}

impl<S: Simulation> SimulationSession<S> {
    pub fn new(sim: S) -> Self {
        Self {
            sim,
            config: None,
            world_config: None,
            elapsed: 0.0,
            steps: 0,
            epoch: 0,
            overlay: BTreeMap::new(),
            inverse_armed: false,
        }
    }

    /// Validates and stores `config`. The world is left as it is until the
    /// next RESET.
    pub fn configure(&mut self, config: SimulationConfig) -> Result<GeoBounds, ValidationError> {
        config.validate()?;
        debug!(
            joints = config.joint_count(),
            freq = config.step_frequency,
            channels = ?config.channels,
            "configured"
        );
        self.config = Some(Arc::new(config));
        Ok(GeoBounds::reachable())
    }

    /// Rebuilds the world at `pose`, or at the zero pose when none is given.
    ///
    /// Nothing is touched when the session is not configured or the pose
    /// does not fit the arm.
    pub fn reset(&mut self, pose: Option<&[f64]>) -> Result<(), ValidationError> {
        let config = self.config.clone().ok_or(ValidationError::NotConfigured)?;
        let joints = config.joint_count();
        let pose = match pose {
            Some(p) if p.len() != joints => {
                return Err(ValidationError::JointCountMismatch {
                    what: "pose",
                    expected: joints,
                    found: p.len(),
                });
            }
            Some(p) => p.to_vec(),
            None => vec![0.0; joints],
        };
        let limit = config.angle_limit;
        if let Some((joint, &angle)) = pose
            .iter()
            .enumerate()
            .find(|(_, a)| !(-limit..=limit).contains(*a))
        {
            return Err(ValidationError::AngleOutOfRange {
                what: "pose",
                joint,
                angle,
                limit,
            });
        }

        self.sim.rebuild(&config, &pose);
        self.world_config = Some(config);
        self.elapsed = 0.0;
        self.steps = 0;
        self.epoch += 1;
        self.overlay.clear();
        debug!(epoch = self.epoch, ?pose, "world rebuilt");
        Ok(())
    }

    pub fn ensure_world(&self) -> Result<(), ValidationError> {
        match self.world_config {
            Some(_) => Ok(()),
            None => Err(ValidationError::NoWorld),
        }
    }

    /// Executes exactly one step with the config of the current world.
    pub fn advance(&mut self) -> Result<(), ValidationError> {
        let config = self.world_config.clone().ok_or(ValidationError::NoWorld)?;
        let dt = config.timestep();

        self.sim.log_sensors(self.steps);
        self.sim.update();
        self.elapsed += dt;
        self.steps += 1;
        for _ in 0..config.step_iterations {
            self.sim
                .step(dt, config.velocity_iterations, config.position_iterations);
        }
        Ok(())
    }

    /// Histories of the whitelisted channels that exist in the world.
    pub fn readings(&self) -> Readings {
        let Some(config) = &self.config else {
            return Readings::new();
        };
        config
            .channels
            .iter()
            .filter_map(|name| {
                let history = self.sim.sensor_history(name)?;
                Some((name.clone(), history.to_vec()))
            })
            .collect()
    }

    /// Every sensor flattened into one row per logged step, sensors in
    /// creation order.
    pub fn result_dump(&self) -> Result<ResultDump, ValidationError> {
        let names = self.sim.sensor_names();
        let histories: Vec<(&String, &[Vec<f64>])> = names
            .iter()
            .filter_map(|n| Some((n, self.sim.sensor_history(n)?)))
            .collect();
        let Some((_, first)) = histories.first() else {
            return Ok(ResultDump::default());
        };

        let expected = first.len();
        if let Some((name, h)) = histories.iter().find(|(_, h)| h.len() != expected) {
            return Err(ValidationError::HistoryLengthMismatch {
                channel: name.to_string(),
                expected,
                found: h.len(),
            });
        }

        let rows: Vec<Vec<f64>> = (0..expected)
            .map(|i| {
                histories
                    .iter()
                    .flat_map(|(_, h)| h[i].iter().copied())
                    .collect()
            })
            .collect();
        let width = rows.first().map_or(0, Vec::len) as u32;
        Ok(ResultDump {
            features: (0..width).collect(),
            rows,
        })
    }

    /// Adds DISPLAY points to the overlay. Returns whether the kind is drawn.
    pub fn display(&mut self, request: &DisplayRequest) -> Result<bool, ValidationError> {
        let config = self.config.as_ref().ok_or(ValidationError::NotConfigured)?;
        if request.kind != DisplayRequest::HISTORY {
            return Ok(false);
        }
        let (bx, by) = base_of(config);
        self.overlay
            .entry(HISTORY_LAYER.to_string())
            .or_default()
            .extend(request.points.iter().map(|(x, y)| (x + bx, y + by)));
        Ok(true)
    }

    pub fn set_inverse_armed(&mut self, armed: bool) {
        self.inverse_armed = armed;
    }

    pub fn inverse_armed(&self) -> bool {
        self.inverse_armed
    }

    /// Pointer at `(x, y)` in world coordinates. When armed, records the
    /// point, disarms and returns the INVERSE_REQUEST to send, with the
    /// point relative to the arm base.
    pub fn follow(&mut self, x: f64, y: f64) -> Option<Outbound> {
        if !self.inverse_armed {
            return None;
        }
        let (bx, by) = base_of(self.config.as_deref()?);
        self.inverse_armed = false;
        self.overlay
            .entry(POINTER_LAYER.to_string())
            .or_default()
            .push((x, y));
        Some(Outbound::InverseRequest {
            features: vec![0, 1],
            values: vec![x - bx, y - by],
        })
    }

    pub fn overlay(&self, layer: &str) -> &[(f64, f64)] {
        self.overlay
            .get(layer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn config(&self) -> Option<&SimulationConfig> {
        self.config.as_deref()
    }

    pub fn joint_count(&self) -> Option<usize> {
        self.config.as_ref().map(|c| c.joint_count())
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pose(&self) -> Vec<f64> {
        self.sim.pose()
    }

    pub fn simulation(&self) -> &S {
        &self.sim
    }

    pub(crate) fn simulation_mut(&mut self) -> &mut S {
        &mut self.sim
    }
}

fn base_of(config: &SimulationConfig) -> (f64, f64) {
    (f64::from(config.base.0), f64::from(config.base.1))
}
