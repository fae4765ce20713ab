//! Schema-driven conversion between the protobuf wire types and the typed
//! messages. Each tag accepts exactly one payload shape; anything else is a
//! [`FormatError`].

use std::collections::HashMap;

use crate::{
    config::{GeoBounds, SimulationConfig, ToyKind, ToySpec},
    error::FormatError,
    message::{ArmOrder, DisplayRequest, Inbound, MessageKind, Outbound, Readings, ResultDump},
    wire::{self, ClientMsgBody, ServerMsgBody},
};

fn client_body_name(body: &ClientMsgBody) -> &'static str {
    match body {
        ClientMsgBody::Empty(_) => "empty",
        ClientMsgBody::Text(_) => "text",
        ClientMsgBody::Configure(_) => "configure",
        ClientMsgBody::Reset(_) => "reset",
        ClientMsgBody::Order(_) => "order",
        ClientMsgBody::Step(_) => "step",
        ClientMsgBody::Display(_) => "display",
        ClientMsgBody::Inverse(_) => "inverse",
    }
}

fn server_body_name(body: &ServerMsgBody) -> &'static str {
    match body {
        ServerMsgBody::Empty(_) => "empty",
        ServerMsgBody::Text(_) => "text",
        ServerMsgBody::Context(_) => "context",
        ServerMsgBody::Readings(_) => "readings",
        ServerMsgBody::Dump(_) => "dump",
        ServerMsgBody::Inverse(_) => "inverse",
        ServerMsgBody::Display(_) => "display",
    }
}

impl Inbound {
    /// Decode a client message according to its tag.
    pub fn decode(msg: wire::ClientMsg) -> Result<Inbound, FormatError> {
        let kind = MessageKind::try_from(msg.tag)?;
        let mismatch = |body: &ClientMsgBody| FormatError::PayloadMismatch {
            kind,
            found: client_body_name(body),
        };
        let missing = FormatError::MissingPayload { kind };

        match (kind, msg.body) {
            (
                MessageKind::Hello
                | MessageKind::Exit
                | MessageKind::SensorQuery
                | MessageKind::Result,
                None | Some(ClientMsgBody::Empty(_)),
            ) => Ok(match kind {
                MessageKind::Hello => Inbound::Hello,
                MessageKind::Exit => Inbound::Exit,
                MessageKind::SensorQuery => Inbound::SensorQuery,
                _ => Inbound::Result,
            }),
            // clients may say goodbye with a parting line
            (MessageKind::Bye, None | Some(ClientMsgBody::Empty(_) | ClientMsgBody::Text(_))) => {
                Ok(Inbound::Bye)
            }
            (MessageKind::Error, Some(ClientMsgBody::Text(t))) => Ok(Inbound::Error(t.text)),
            (MessageKind::Configure, Some(ClientMsgBody::Configure(c))) => {
                decode_config(c).map(Inbound::Configure)
            }
            (MessageKind::Reset, None | Some(ClientMsgBody::Empty(_))) => Ok(Inbound::Reset(None)),
            (MessageKind::Reset, Some(ClientMsgBody::Reset(r))) => {
                Ok(Inbound::Reset(r.pose.map(|p| p.values)))
            }
            (MessageKind::Order, Some(ClientMsgBody::Order(o))) => Ok(Inbound::Order(ArmOrder {
                start: o.start,
                end: o.end,
                velocities: o.velocities,
            })),
            (MessageKind::Step, Some(ClientMsgBody::Step(s))) => Ok(Inbound::Step(s.count)),
            (MessageKind::InverseRequest, Some(ClientMsgBody::Inverse(i))) => {
                Ok(Inbound::InverseToggle(i.enabled))
            }
            (MessageKind::Display, Some(ClientMsgBody::Display(d))) => {
                Ok(Inbound::Display(DisplayRequest {
                    kind: d.kind,
                    points: d.points.into_iter().map(|p| (p.x, p.y)).collect(),
                }))
            }
            (_, None) => Err(missing),
            (_, Some(body)) => Err(mismatch(&body)),
        }
    }

    /// Encode for sending; the server stamps the real client id on arrival.
    pub fn encode(&self, client_id: u64) -> wire::ClientMsg {
        let body = match self {
            Inbound::Hello
            | Inbound::Bye
            | Inbound::Exit
            | Inbound::SensorQuery
            | Inbound::Result => ClientMsgBody::Empty(wire::Empty {}),
            Inbound::Error(text) => ClientMsgBody::Text(wire::Text { text: text.clone() }),
            Inbound::Configure(cfg) => ClientMsgBody::Configure(encode_config(cfg)),
            Inbound::Reset(pose) => ClientMsgBody::Reset(wire::Reset {
                pose: pose.as_ref().map(|values| wire::Pose {
                    values: values.clone(),
                }),
            }),
            Inbound::Order(order) => ClientMsgBody::Order(wire::Order {
                start: order.start.clone(),
                end: order.end.clone(),
                velocities: order.velocities.clone(),
            }),
            Inbound::Step(count) => ClientMsgBody::Step(wire::Step { count: *count }),
            Inbound::InverseToggle(enabled) => {
                ClientMsgBody::Inverse(wire::InverseToggle { enabled: *enabled })
            }
            Inbound::Display(req) => ClientMsgBody::Display(wire::Display {
                kind: req.kind,
                points: req
                    .points
                    .iter()
                    .map(|&(x, y)| wire::Point { x, y })
                    .collect(),
            }),
        };

        wire::ClientMsg {
            client_id,
            tag: self.kind().tag(),
            body: Some(body),
        }
    }
}

fn decode_config(c: wire::Configure) -> Result<SimulationConfig, FormatError> {
    let kind = MessageKind::Configure;
    let limits = c.joint_limits.ok_or(FormatError::MissingField {
        kind,
        field: "joint_limits",
    })?;
    let base = c.base.ok_or(FormatError::MissingField {
        kind,
        field: "base",
    })?;
    let toys = c
        .toys
        .into_iter()
        .map(decode_toy)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SimulationConfig {
        step_frequency: c.step_frequency,
        step_iterations: c.step_iterations,
        velocity_iterations: c.velocity_iterations,
        position_iterations: c.position_iterations,
        lengths: c.lengths,
        // only the upper bound is used, limits are symmetric
        angle_limit: limits.max,
        base: (base.x, base.y),
        arm_collisions: c.arm_collisions,
        toys,
        channels: c.channels,
    })
}

fn decode_toy(t: wire::ToySpec) -> Result<ToySpec, FormatError> {
    let kind: ToyKind = t.kind.parse()?;
    let position = t.position.ok_or(FormatError::MissingField {
        kind: MessageKind::Configure,
        field: "toys.position",
    })?;

    Ok(ToySpec {
        kind,
        name: t.name,
        position: (position.x, position.y),
        size: t.size,
        friction: t.friction,
        restitution: t.restitution,
        density: t.density,
        linear_damping: t.linear_damping,
        angular_damping: t.angular_damping,
    })
}

fn encode_config(cfg: &SimulationConfig) -> wire::Configure {
    wire::Configure {
        step_frequency: cfg.step_frequency,
        step_iterations: cfg.step_iterations,
        velocity_iterations: cfg.velocity_iterations,
        position_iterations: cfg.position_iterations,
        lengths: cfg.lengths.clone(),
        joint_limits: Some(wire::Range {
            min: -cfg.angle_limit,
            max: cfg.angle_limit,
        }),
        base: Some(wire::GridPoint {
            x: cfg.base.0,
            y: cfg.base.1,
        }),
        arm_collisions: cfg.arm_collisions,
        toys: cfg
            .toys
            .iter()
            .map(|t| wire::ToySpec {
                kind: t.kind.as_str().to_string(),
                name: t.name.clone(),
                position: Some(wire::Point {
                    x: t.position.0,
                    y: t.position.1,
                }),
                size: t.size,
                friction: t.friction,
                restitution: t.restitution,
                density: t.density,
                linear_damping: t.linear_damping,
                angular_damping: t.angular_damping,
            })
            .collect(),
        channels: cfg.channels.clone(),
    }
}

fn encode_readings(readings: Readings) -> wire::Readings {
    let channels: HashMap<String, wire::History> = readings
        .into_iter()
        .map(|(name, samples)| {
            let samples = samples
                .into_iter()
                .map(|values| wire::Pose { values })
                .collect();
            (name, wire::History { samples })
        })
        .collect();
    wire::Readings { channels }
}

fn decode_readings(readings: wire::Readings) -> Readings {
    readings
        .channels
        .into_iter()
        .map(|(name, history)| {
            let samples = history.samples.into_iter().map(|p| p.values).collect();
            (name, samples)
        })
        .collect()
}

impl Outbound {
    pub fn encode(self) -> wire::ServerMsg {
        let tag = self.kind().tag();
        let body = match self {
            Outbound::Hello
            | Outbound::Bye
            | Outbound::Exit
            | Outbound::Reset
            | Outbound::Order
            | Outbound::Step => ServerMsgBody::Empty(wire::Empty {}),
            Outbound::Error(text) => ServerMsgBody::Text(wire::Text { text }),
            Outbound::Configured(bounds) => ServerMsgBody::Context(wire::Context {
                geobounds: Some(wire::Bounds {
                    x: Some(wire::Range {
                        min: bounds.x.0,
                        max: bounds.x.1,
                    }),
                    y: Some(wire::Range {
                        min: bounds.y.0,
                        max: bounds.y.1,
                    }),
                }),
            }),
            Outbound::ResetSnapshot(readings) | Outbound::Sensors(readings) => {
                ServerMsgBody::Readings(encode_readings(readings))
            }
            Outbound::Result(dump) => ServerMsgBody::Dump(wire::ResultDump {
                features: dump.features,
                rows: dump
                    .rows
                    .into_iter()
                    .map(|values| wire::Pose { values })
                    .collect(),
            }),
            Outbound::InverseRequest { features, values } => {
                ServerMsgBody::Inverse(wire::InverseRequest { features, values })
            }
            Outbound::Display { accepted } => {
                ServerMsgBody::Display(wire::DisplayAck { accepted })
            }
        };

        wire::ServerMsg {
            tag,
            body: Some(body),
        }
    }

    /// Client-side decoding of a server message.
    pub fn decode(msg: wire::ServerMsg) -> Result<Outbound, FormatError> {
        let kind = MessageKind::try_from(msg.tag)?;
        let empty = |body: &Option<ServerMsgBody>| {
            matches!(body, None | Some(ServerMsgBody::Empty(_)))
        };

        match (kind, msg.body) {
            (MessageKind::Hello, b) if empty(&b) => Ok(Outbound::Hello),
            (MessageKind::Bye, b) if empty(&b) => Ok(Outbound::Bye),
            (MessageKind::Exit, b) if empty(&b) => Ok(Outbound::Exit),
            (MessageKind::Reset, b) if empty(&b) => Ok(Outbound::Reset),
            (MessageKind::Order, b) if empty(&b) => Ok(Outbound::Order),
            (MessageKind::Step, b) if empty(&b) => Ok(Outbound::Step),
            (MessageKind::Error, Some(ServerMsgBody::Text(t))) => Ok(Outbound::Error(t.text)),
            (MessageKind::Configure, Some(ServerMsgBody::Context(ctx))) => {
                let missing = FormatError::MissingField {
                    kind,
                    field: "geobounds",
                };
                let bounds = ctx.geobounds.ok_or(missing.clone())?;
                let (x, y) = bounds.x.zip(bounds.y).ok_or(missing)?;
                Ok(Outbound::Configured(GeoBounds {
                    x: (x.min, x.max),
                    y: (y.min, y.max),
                }))
            }
            (MessageKind::Reset, Some(ServerMsgBody::Readings(r))) => {
                Ok(Outbound::ResetSnapshot(decode_readings(r)))
            }
            (MessageKind::SensorQuery, Some(ServerMsgBody::Readings(r))) => {
                Ok(Outbound::Sensors(decode_readings(r)))
            }
            (MessageKind::Result, Some(ServerMsgBody::Dump(d))) => Ok(Outbound::Result(ResultDump {
                features: d.features,
                rows: d.rows.into_iter().map(|p| p.values).collect(),
            })),
            (MessageKind::InverseRequest, Some(ServerMsgBody::Inverse(i))) => {
                Ok(Outbound::InverseRequest {
                    features: i.features,
                    values: i.values,
                })
            }
            (MessageKind::Display, Some(ServerMsgBody::Display(d))) => Ok(Outbound::Display {
                accepted: d.accepted,
            }),
            (_, None) => Err(FormatError::MissingPayload { kind }),
            (_, Some(body)) => Err(FormatError::PayloadMismatch {
                kind,
                found: server_body_name(&body),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(tag: u32, body: Option<ClientMsgBody>) -> wire::ClientMsg {
        wire::ClientMsg {
            client_id: 7,
            tag,
            body,
        }
    }

    #[test]
    fn unknown_tag_is_rejected_before_the_payload() {
        let msg = raw(42, Some(ClientMsgBody::Step(wire::Step { count: 3 })));
        assert_eq!(Inbound::decode(msg), Err(FormatError::UnknownTag(42)));
    }

    #[test]
    fn payload_must_match_the_tag() {
        let msg = raw(
            MessageKind::Step.tag(),
            Some(ClientMsgBody::Text(wire::Text {
                text: "sixty".into(),
            })),
        );
        assert_eq!(
            Inbound::decode(msg),
            Err(FormatError::PayloadMismatch {
                kind: MessageKind::Step,
                found: "text",
            })
        );

        let msg = raw(MessageKind::Order.tag(), None);
        assert_eq!(
            Inbound::decode(msg),
            Err(FormatError::MissingPayload {
                kind: MessageKind::Order
            })
        );
    }

    #[test]
    fn reset_pose_is_optional() {
        let bare = raw(MessageKind::Reset.tag(), None);
        assert_eq!(Inbound::decode(bare), Ok(Inbound::Reset(None)));

        let posed = Inbound::Reset(Some(vec![0.1, 0.2])).encode(0);
        assert_eq!(
            Inbound::decode(posed),
            Ok(Inbound::Reset(Some(vec![0.1, 0.2])))
        );
    }

    #[test]
    fn bye_tolerates_a_parting_line() {
        let msg = raw(
            MessageKind::Bye.tag(),
            Some(ClientMsgBody::Text(wire::Text {
                text: "Bye Server !".into(),
            })),
        );
        assert_eq!(Inbound::decode(msg), Ok(Inbound::Bye));
    }

    #[test]
    fn configure_keeps_the_upper_joint_limit_only() {
        let mut wire_cfg = encode_config(&SimulationConfig::default());
        wire_cfg.joint_limits = Some(wire::Range {
            min: -0.5,
            max: 1.25,
        });
        let msg = raw(
            MessageKind::Configure.tag(),
            Some(ClientMsgBody::Configure(wire_cfg)),
        );

        let Ok(Inbound::Configure(cfg)) = Inbound::decode(msg) else {
            panic!("configure did not decode");
        };
        assert_eq!(cfg.angle_limit, 1.25);
        assert_eq!(cfg.base, (400, 80));
    }

    #[test]
    fn configure_without_base_is_a_format_error() {
        let mut wire_cfg = encode_config(&SimulationConfig::default());
        wire_cfg.base = None;
        let msg = raw(
            MessageKind::Configure.tag(),
            Some(ClientMsgBody::Configure(wire_cfg)),
        );
        assert_eq!(
            Inbound::decode(msg),
            Err(FormatError::MissingField {
                kind: MessageKind::Configure,
                field: "base",
            })
        );
    }

    #[test]
    fn configured_reply_carries_geobounds() {
        let msg = Outbound::Configured(GeoBounds::reachable()).encode();
        assert_eq!(msg.tag, MessageKind::Configure.tag());

        match Outbound::decode(msg) {
            Ok(Outbound::Configured(bounds)) => {
                assert_eq!(bounds.as_array(), [[50.0, 750.0], [50.0, 750.0]])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reset_reply_variants_share_the_tag() {
        let ack = Outbound::Reset.encode();
        let snapshot = Outbound::ResetSnapshot(Readings::new()).encode();
        assert_eq!(ack.tag, snapshot.tag);
        assert_eq!(Outbound::decode(ack), Ok(Outbound::Reset));
        assert_eq!(
            Outbound::decode(snapshot),
            Ok(Outbound::ResetSnapshot(Readings::new()))
        );
    }
}
