use std::{
    thread,
    time::{Duration, Instant},
};

use interface::{Outbound, ProtocolError};
use simulator::{Policy, Simulation};
use tracing::{debug, error, info, warn};

use crate::{
    dispatch::{Dispatcher, Reply},
    hub::{Event, MessageChannel},
};

/// Upper bound on the wait for outbound queues to drain before exiting.
pub(crate) const EXIT_FLUSH: Duration = Duration::from_millis(500);

/// Shortest idle wait between two interactive ticks.
const MIN_IDLE_WAIT: Duration = Duration::from_millis(1);

/// Why the control loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A client sent EXIT; the process is expected to terminate.
    Exit,
    /// [`crate::hub::Hub::shutdown`] was called.
    Shutdown,
    /// The inbound queue closed.
    Closed,
}

/// What one interactive tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Ran one queued step; no message was read.
    Stepped,
    /// Handled one event.
    Handled,
    /// Nothing to do this frame.
    Idle,
    Done(LoopExit),
}

/// Owns the dispatcher (and through it the session and the scheduler) and
/// feeds it from a [`MessageChannel`]. Runs on a single thread: every
/// message is fully handled before the next one is read.
pub struct ControlLoop<S: Simulation, C: MessageChannel> {
    dispatcher: Dispatcher<S>,
    channel: C,
    frame: Duration,
}

impl<S: Simulation, C: MessageChannel> ControlLoop<S, C> {
    pub fn new(dispatcher: Dispatcher<S>, channel: C, frame: Duration) -> Self {
        Self {
            dispatcher,
            channel,
            frame,
        }
    }

    pub fn policy(&self) -> Policy {
        self.dispatcher.context().scheduler.policy()
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    pub fn run(mut self) -> LoopExit {
        info!("control loop started ({:?})", self.policy());
        let exit = match self.policy() {
            Policy::Interactive => self.run_interactive(),
            Policy::Headless => self.run_headless(),
        };
        info!("control loop stopped: {exit:?}");
        exit
    }

    fn run_interactive(&mut self) -> LoopExit {
        loop {
            let started = Instant::now();
            match self.tick() {
                TickOutcome::Done(exit) => return exit,
                TickOutcome::Idle => {}
                TickOutcome::Stepped | TickOutcome::Handled => {
                    if let Some(rest) = self.frame.checked_sub(started.elapsed()) {
                        thread::sleep(rest);
                    }
                }
            }
        }
    }

    /// Blocks on the channel; STEP runs all of its steps before the next
    /// receive.
    fn run_headless(&mut self) -> LoopExit {
        loop {
            match self.channel.recv() {
                Ok(event) => {
                    if let Some(exit) = self.handle(event) {
                        return exit;
                    }
                }
                Err(e) => {
                    error!("inbound queue failed: {e}");
                    return LoopExit::Closed;
                }
            }
        }
    }

    /// One interactive frame: run a queued step if there is one, otherwise
    /// handle at most one event.
    pub fn tick(&mut self) -> TickOutcome {
        let ctx = self.dispatcher.context_mut();
        if ctx.scheduler.pending() > 0 {
            if let Err(e) = ctx.scheduler.drain_one_if_available(&mut ctx.session) {
                warn!("queued step failed: {e}");
            }
            return TickOutcome::Stepped;
        }

        match self.channel.recv_timeout(self.frame.max(MIN_IDLE_WAIT)) {
            Ok(Some(event)) => match self.handle(event) {
                Some(exit) => TickOutcome::Done(exit),
                None => TickOutcome::Handled,
            },
            Ok(None) => TickOutcome::Idle,
            Err(e) => {
                error!("inbound queue failed: {e}");
                TickOutcome::Done(LoopExit::Closed)
            }
        }
    }

    fn handle(&mut self, event: Event) -> Option<LoopExit> {
        let msg = match event {
            Event::Message(msg) => msg,
            Event::Pointer { x, y } => {
                let session = &mut self.dispatcher.context_mut().session;
                if let Some(request) = session.follow(x, y) {
                    debug!("pointer at ({x}, {y}), requesting inverse kinematics");
                    self.channel.broadcast(request);
                }
                return None;
            }
            Event::Shutdown => return Some(LoopExit::Shutdown),
        };

        let client_id = msg.client_id;
        match self.dispatcher.dispatch(msg) {
            Ok(Reply::None) => None,
            Ok(Reply::Send(reply)) => {
                self.reply(client_id, reply);
                None
            }
            Ok(Reply::Exit(reply)) => {
                self.reply(client_id, reply);
                self.channel.flush(EXIT_FLUSH);
                Some(LoopExit::Exit)
            }
            Err(ProtocolError::Format(e)) => {
                warn!("dropping message from #{client_id}: {e}");
                None
            }
            Err(ProtocolError::Validation(e)) => {
                warn!("rejected message from #{client_id}: {e}");
                self.reply(client_id, Outbound::Error(e.to_string()));
                None
            }
            Err(ProtocolError::Transport(e)) => {
                warn!("transport error for #{client_id}: {e}");
                None
            }
        }
    }

    fn reply(&self, client_id: u64, msg: Outbound) {
        if let Err(e) = self.channel.send(client_id, msg) {
            warn!("reply to #{client_id} not delivered: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbeam_channel::Receiver;
    use interface::{Inbound, MessageKind, ServerMsg, SimulationConfig};
    use simulator::{ArmPlayground, SimulationSession, scheduler::scheduler_for};

    use super::*;
    use crate::{
        ResetReply,
        dispatch::Context,
        hub::{Hub, SharedHub},
    };

    fn control(policy: Policy, hub: &SharedHub) -> ControlLoop<ArmPlayground, SharedHub> {
        let dispatcher = Dispatcher::new(Context {
            session: SimulationSession::new(ArmPlayground::new()),
            scheduler: scheduler_for(policy),
            reset_reply: ResetReply::Ack,
        });
        ControlLoop::new(dispatcher, Arc::clone(hub), Duration::from_millis(20))
    }

    /// Ticks until an event was handled, skipping idle frames.
    fn tick_event(ctl: &mut ControlLoop<ArmPlayground, SharedHub>) -> TickOutcome {
        for _ in 0..100 {
            match ctl.tick() {
                TickOutcome::Idle => continue,
                outcome => return outcome,
            }
        }
        panic!("no event arrived");
    }

    fn tags(rx: &Receiver<ServerMsg>) -> Vec<u32> {
        rx.try_iter().map(|m| m.tag).collect()
    }

    #[test]
    fn pending_steps_are_run_before_any_message() {
        let hub = Hub::new();
        let mut ctl = control(Policy::Interactive, &hub);
        let (_id, tx, rx) = hub.register_local();

        let config = SimulationConfig {
            channels: vec!["armPos".into()],
            ..Default::default()
        };
        for msg in [
            Inbound::Configure(config),
            Inbound::Reset(None),
            Inbound::Step(3),
            Inbound::Hello,
        ] {
            tx.send(msg.encode(0)).unwrap();
        }

        for _ in 0..3 {
            assert_eq!(tick_event(&mut ctl), TickOutcome::Handled);
        }
        assert_eq!(
            tags(&rx),
            [MessageKind::Configure, MessageKind::Reset, MessageKind::Step].map(MessageKind::tag)
        );

        for _ in 0..3 {
            assert_eq!(ctl.tick(), TickOutcome::Stepped);
            assert!(tags(&rx).is_empty(), "a message was read while stepping");
        }
        assert_eq!(ctl.dispatcher().context().session.steps(), 3);

        assert_eq!(tick_event(&mut ctl), TickOutcome::Handled);
        assert_eq!(tags(&rx), [MessageKind::Hello.tag()]);
    }

    #[test]
    fn validation_errors_are_reported_to_the_sender() {
        let hub = Hub::new();
        let mut ctl = control(Policy::Interactive, &hub);
        let (_id, tx, rx) = hub.register_local();

        tx.send(Inbound::Reset(None).encode(0)).unwrap();
        assert_eq!(tick_event(&mut ctl), TickOutcome::Handled);

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.tag, MessageKind::Error.tag());
        assert_eq!(ctl.dispatcher().context().session.epoch(), 0);
    }

    #[test]
    fn malformed_messages_get_no_answer() {
        let hub = Hub::new();
        let mut ctl = control(Policy::Interactive, &hub);
        let (_id, tx, rx) = hub.register_local();

        let mut bad = Inbound::Hello.encode(0);
        bad.tag = 42;
        tx.send(bad).unwrap();
        tx.send(Inbound::Hello.encode(0)).unwrap();

        assert_eq!(tick_event(&mut ctl), TickOutcome::Handled);
        assert!(tags(&rx).is_empty());
        assert_eq!(tick_event(&mut ctl), TickOutcome::Handled);
        assert_eq!(tags(&rx), [MessageKind::Hello.tag()]);
    }

    #[test]
    fn armed_pointer_broadcasts_an_inverse_request() {
        let hub = Hub::new();
        let mut ctl = control(Policy::Interactive, &hub);
        let (_id, tx, rx) = hub.register_local();

        tx.send(Inbound::Configure(SimulationConfig::default()).encode(0))
            .unwrap();
        tx.send(Inbound::InverseToggle(true).encode(0)).unwrap();
        tick_event(&mut ctl);
        tick_event(&mut ctl);
        assert_eq!(tags(&rx), [MessageKind::Configure.tag()]);

        hub.pointer(450.0, 200.0);
        assert_eq!(tick_event(&mut ctl), TickOutcome::Handled);
        let request = Outbound::decode(rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            request,
            Outbound::InverseRequest {
                features: vec![0, 1],
                values: vec![50.0, 120.0],
            }
        );

        hub.pointer(450.0, 200.0);
        tick_event(&mut ctl);
        assert!(tags(&rx).is_empty());
    }

    #[test]
    fn shutdown_and_exit_end_the_loop() {
        let hub = Hub::new();
        let ctl = control(Policy::Headless, &hub);
        hub.shutdown();
        assert_eq!(ctl.run(), LoopExit::Shutdown);

        let ctl = control(Policy::Headless, &hub);
        let (_id, tx, rx) = hub.register_local();
        tx.send(Inbound::Exit.encode(0)).unwrap();
        let handle = thread::spawn(move || ctl.run());
        let ack = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(ack.tag, MessageKind::Exit.tag());
        assert_eq!(handle.join().unwrap(), LoopExit::Exit);
    }
}
