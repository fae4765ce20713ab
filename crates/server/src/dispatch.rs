//! Routes each decoded message to exactly one handler.

use std::collections::HashMap;

use interface::{
    ClientMsg, FormatError, Inbound, MessageKind, Outbound, ProtocolError, ValidationError,
};
use simulator::{Simulation, SimulationSession, StepScheduler, order};
use tracing::{debug, info, warn};

use crate::ResetReply;

/// What the control loop does after a handler ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    None,
    Send(Outbound),
    /// Send the acknowledgement, flush, then stop.
    Exit(Outbound),
}

/// State handlers work on.
pub struct Context<S: Simulation> {
    pub session: SimulationSession<S>,
    pub scheduler: Box<dyn StepScheduler<S>>,
    pub reset_reply: ResetReply,
}

type Handler<S> = fn(&mut Context<S>, Inbound) -> Result<Reply, ProtocolError>;

pub struct Dispatcher<S: Simulation> {
    handlers: HashMap<MessageKind, Handler<S>>,
    ctx: Context<S>,
}

impl<S: Simulation> Dispatcher<S> {
    pub fn new(ctx: Context<S>) -> Self {
        let mut handlers: HashMap<MessageKind, Handler<S>> = HashMap::new();
        handlers.insert(MessageKind::Hello, on_hello);
        handlers.insert(MessageKind::Bye, on_bye);
        handlers.insert(MessageKind::Error, on_error);
        handlers.insert(MessageKind::Exit, on_exit);
        handlers.insert(MessageKind::Configure, on_configure);
        handlers.insert(MessageKind::Reset, on_reset);
        handlers.insert(MessageKind::SensorQuery, on_sensor_query);
        handlers.insert(MessageKind::Order, on_order);
        handlers.insert(MessageKind::Step, on_step);
        handlers.insert(MessageKind::Result, on_result);
        handlers.insert(MessageKind::InverseRequest, on_inverse_toggle);
        handlers.insert(MessageKind::Display, on_display);
        Self { handlers, ctx }
    }

    /// Decodes `msg` and runs its handler. On error the session is left as
    /// it was before the message.
    pub fn dispatch(&mut self, msg: ClientMsg) -> Result<Reply, ProtocolError> {
        let client_id = msg.client_id;
        let inbound = Inbound::decode(msg)?;
        let kind = inbound.kind();
        debug!("<- #{client_id} {kind}");

        let handler = self
            .handlers
            .get(&kind)
            .ok_or(FormatError::NotInbound { kind })?;
        handler(&mut self.ctx, inbound)
    }

    pub fn context(&self) -> &Context<S> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context<S> {
        &mut self.ctx
    }
}

/// The table routes by kind, so a handler only ever sees its own variant.
fn wrong_variant(msg: &Inbound) -> ProtocolError {
    FormatError::PayloadMismatch {
        kind: msg.kind(),
        found: "routed to the wrong handler",
    }
    .into()
}

fn on_hello<S: Simulation>(_: &mut Context<S>, _: Inbound) -> Result<Reply, ProtocolError> {
    info!("client said hello");
    Ok(Reply::Send(Outbound::Hello))
}

fn on_bye<S: Simulation>(_: &mut Context<S>, _: Inbound) -> Result<Reply, ProtocolError> {
    info!("client said bye");
    Ok(Reply::Send(Outbound::Bye))
}

fn on_error<S: Simulation>(_: &mut Context<S>, msg: Inbound) -> Result<Reply, ProtocolError> {
    let Inbound::Error(text) = &msg else {
        return Err(wrong_variant(&msg));
    };
    warn!("client reported an error: {text}");
    Ok(Reply::None)
}

fn on_exit<S: Simulation>(_: &mut Context<S>, _: Inbound) -> Result<Reply, ProtocolError> {
    info!("exit requested");
    Ok(Reply::Exit(Outbound::Exit))
}

fn on_configure<S: Simulation>(
    ctx: &mut Context<S>,
    msg: Inbound,
) -> Result<Reply, ProtocolError> {
    let Inbound::Configure(config) = msg else {
        return Err(wrong_variant(&msg));
    };
    let bounds = ctx.session.configure(config)?;
    Ok(Reply::Send(Outbound::Configured(bounds)))
}

fn on_reset<S: Simulation>(ctx: &mut Context<S>, msg: Inbound) -> Result<Reply, ProtocolError> {
    let Inbound::Reset(pose) = msg else {
        return Err(wrong_variant(&msg));
    };
    ctx.session.reset(pose.as_deref())?;
    ctx.scheduler.reset();

    Ok(Reply::Send(match ctx.reset_reply {
        ResetReply::Ack => Outbound::Reset,
        ResetReply::Snapshot => Outbound::ResetSnapshot(ctx.session.readings()),
    }))
}

fn on_sensor_query<S: Simulation>(
    ctx: &mut Context<S>,
    _: Inbound,
) -> Result<Reply, ProtocolError> {
    Ok(Reply::Send(Outbound::Sensors(ctx.session.readings())))
}

fn on_order<S: Simulation>(ctx: &mut Context<S>, msg: Inbound) -> Result<Reply, ProtocolError> {
    let Inbound::Order(arm_order) = msg else {
        return Err(wrong_variant(&msg));
    };
    order::execute(&arm_order, &mut ctx.session, ctx.scheduler.as_mut())?;
    Ok(Reply::Send(Outbound::Order))
}

fn on_step<S: Simulation>(ctx: &mut Context<S>, msg: Inbound) -> Result<Reply, ProtocolError> {
    let Inbound::Step(n) = msg else {
        return Err(wrong_variant(&msg));
    };
    ctx.scheduler.register_steps(n, &mut ctx.session)?;
    Ok(Reply::Send(Outbound::Step))
}

fn on_result<S: Simulation>(ctx: &mut Context<S>, _: Inbound) -> Result<Reply, ProtocolError> {
    let dump = ctx.session.result_dump()?;
    Ok(Reply::Send(Outbound::Result(dump)))
}

fn on_inverse_toggle<S: Simulation>(
    ctx: &mut Context<S>,
    msg: Inbound,
) -> Result<Reply, ProtocolError> {
    let Inbound::InverseToggle(enabled) = msg else {
        return Err(wrong_variant(&msg));
    };
    if ctx.session.config().is_none() {
        return Err(ValidationError::NotConfigured.into());
    }
    ctx.session.set_inverse_armed(enabled);
    Ok(Reply::None)
}

fn on_display<S: Simulation>(ctx: &mut Context<S>, msg: Inbound) -> Result<Reply, ProtocolError> {
    let Inbound::Display(request) = msg else {
        return Err(wrong_variant(&msg));
    };
    let accepted = ctx.session.display(&request)?;
    Ok(Reply::Send(Outbound::Display { accepted }))
}
