//! Step scheduling: how many steps were requested versus when they run.

use interface::ValidationError;
use tracing::trace;

use crate::{Simulation, session::SimulationSession};

/// Deployment policy, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Steps are queued and run one per frame tick.
    Interactive,
    /// Steps run back to back as soon as they are requested.
    Headless,
}

pub trait StepScheduler<S: Simulation>: Send {
    fn policy(&self) -> Policy;

    /// Requests `n` more steps. Requests add up.
    fn register_steps(
        &mut self,
        n: u32,
        session: &mut SimulationSession<S>,
    ) -> Result<(), ValidationError>;

    /// Runs one queued step, if any. Returns whether a step ran.
    fn drain_one_if_available(
        &mut self,
        session: &mut SimulationSession<S>,
    ) -> Result<bool, ValidationError>;

    /// Steps requested but not yet run.
    fn pending(&self) -> u64;

    /// Drops every queued step.
    fn reset(&mut self);
}

#[derive(Debug, Default)]
pub struct InteractiveScheduler {
    pending: u64,
}

impl InteractiveScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Simulation> StepScheduler<S> for InteractiveScheduler {
    fn policy(&self) -> Policy {
        Policy::Interactive
    }

    fn register_steps(
        &mut self,
        n: u32,
        session: &mut SimulationSession<S>,
    ) -> Result<(), ValidationError> {
        session.ensure_world()?;
        self.pending += u64::from(n);
        trace!(pending = self.pending, "steps queued");
        Ok(())
    }

    fn drain_one_if_available(
        &mut self,
        session: &mut SimulationSession<S>,
    ) -> Result<bool, ValidationError> {
        if self.pending == 0 {
            return Ok(false);
        }
        session.advance()?;
        self.pending -= 1;
        Ok(true)
    }

    fn pending(&self) -> u64 {
        self.pending
    }

    fn reset(&mut self) {
        self.pending = 0;
    }
}

#[derive(Debug, Default)]
pub struct HeadlessScheduler;

impl HeadlessScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Runs exactly `n` steps.
    pub fn run_all<S: Simulation>(
        &mut self,
        n: u32,
        session: &mut SimulationSession<S>,
    ) -> Result<(), ValidationError> {
        session.ensure_world()?;
        for _ in 0..n {
            session.advance()?;
        }
        trace!(n, steps = session.steps(), "steps run");
        Ok(())
    }
}

impl<S: Simulation> StepScheduler<S> for HeadlessScheduler {
    fn policy(&self) -> Policy {
        Policy::Headless
    }

    fn register_steps(
        &mut self,
        n: u32,
        session: &mut SimulationSession<S>,
    ) -> Result<(), ValidationError> {
        self.run_all(n, session)
    }

    fn drain_one_if_available(
        &mut self,
        _session: &mut SimulationSession<S>,
    ) -> Result<bool, ValidationError> {
        Ok(false)
    }

    fn pending(&self) -> u64 {
        0
    }

    fn reset(&mut self) {}
}

pub fn scheduler_for<S: Simulation>(policy: Policy) -> Box<dyn StepScheduler<S>> {
    match policy {
        Policy::Interactive => Box::new(InteractiveScheduler::new()),
        Policy::Headless => Box::new(HeadlessScheduler::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArmPlayground, session::tests::configured};

    #[test]
    fn registrations_add_up_under_both_policies() {
        for policy in [Policy::Interactive, Policy::Headless] {
            let mut session = configured();
            session.reset(None).unwrap();
            let mut scheduler = scheduler_for(policy);

            scheduler.register_steps(3, &mut session).unwrap();
            scheduler.register_steps(2, &mut session).unwrap();
            while scheduler.drain_one_if_available(&mut session).unwrap() {}

            assert_eq!(session.steps(), 5, "{policy:?}");
            assert_eq!(scheduler.pending(), 0);
        }
    }

    #[test]
    fn interactive_runs_one_step_per_drain() {
        let mut session = configured();
        session.reset(None).unwrap();
        let mut scheduler = InteractiveScheduler::new();

        scheduler.register_steps(2, &mut session).unwrap();
        assert_eq!(session.steps(), 0);
        assert_eq!(StepScheduler::<ArmPlayground>::pending(&scheduler), 2);

        assert!(scheduler.drain_one_if_available(&mut session).unwrap());
        assert_eq!(session.steps(), 1);
        assert!(scheduler.drain_one_if_available(&mut session).unwrap());
        assert!(!scheduler.drain_one_if_available(&mut session).unwrap());
        assert_eq!(session.steps(), 2);
    }

    #[test]
    fn headless_runs_immediately() {
        let mut session = configured();
        session.reset(None).unwrap();
        let mut scheduler = HeadlessScheduler::new();

        scheduler.register_steps(60, &mut session).unwrap();
        assert_eq!(session.steps(), 60);
        assert!((session.elapsed() - 60.0 / 180.0).abs() < 1e-9);
        assert!(!scheduler.drain_one_if_available(&mut session).unwrap());
    }

    #[test]
    fn reset_drops_pending_steps() {
        let mut session = configured();
        session.reset(None).unwrap();
        let mut scheduler = InteractiveScheduler::new();
        scheduler.register_steps(10, &mut session).unwrap();
        StepScheduler::<ArmPlayground>::reset(&mut scheduler);
        assert!(!scheduler.drain_one_if_available(&mut session).unwrap());
        assert_eq!(session.steps(), 0);
    }

    #[test]
    fn stepping_without_world_is_rejected() {
        for policy in [Policy::Interactive, Policy::Headless] {
            let mut session = configured();
            let mut scheduler = scheduler_for(policy);
            assert_eq!(
                scheduler.register_steps(1, &mut session),
                Err(ValidationError::NoWorld)
            );
            assert_eq!(scheduler.pending(), 0);
        }
    }
}
