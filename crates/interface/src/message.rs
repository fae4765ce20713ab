use std::{collections::BTreeMap, fmt};

use crate::{
    config::{GeoBounds, SimulationConfig},
    error::FormatError,
};

/// Message tags shared by both directions of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum MessageKind {
    Hello = 0,
    Bye = 1,
    Error = 2,
    Exit = 3,
    Configure = 4,
    Reset = 5,
    SensorQuery = 6,
    Order = 7,
    Step = 8,
    Result = 9,
    InverseRequest = 10,
    Display = 11,
}

impl MessageKind {
    pub const ALL: [MessageKind; 12] = [
        MessageKind::Hello,
        MessageKind::Bye,
        MessageKind::Error,
        MessageKind::Exit,
        MessageKind::Configure,
        MessageKind::Reset,
        MessageKind::SensorQuery,
        MessageKind::Order,
        MessageKind::Step,
        MessageKind::Result,
        MessageKind::InverseRequest,
        MessageKind::Display,
    ];

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Hello => "HELLO",
            MessageKind::Bye => "BYE",
            MessageKind::Error => "ERROR",
            MessageKind::Exit => "EXIT",
            MessageKind::Configure => "CONFIGURE",
            MessageKind::Reset => "RESET",
            MessageKind::SensorQuery => "SENSOR_QUERY",
            MessageKind::Order => "ORDER",
            MessageKind::Step => "STEP",
            MessageKind::Result => "RESULT",
            MessageKind::InverseRequest => "INVERSE_REQUEST",
            MessageKind::Display => "DISPLAY",
        }
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = FormatError;

    fn try_from(tag: u32) -> Result<Self, FormatError> {
        MessageKind::ALL
            .get(tag as usize)
            .copied()
            .ok_or(FormatError::UnknownTag(tag))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arm trajectory order: every sequence holds one value per joint.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmOrder {
    pub start: Vec<f64>,
    pub end: Vec<f64>,
    pub velocities: Vec<f64>,
}

/// Overlay annotation sent with DISPLAY.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRequest {
    pub kind: i32,
    pub points: Vec<(f64, f64)>,
}

impl DisplayRequest {
    /// The only overlay kind the server draws: a trail of points relative
    /// to the arm base.
    pub const HISTORY: i32 = 1;
}

/// Channel name to logged samples, one `Vec<f64>` per logged step.
pub type Readings = BTreeMap<String, Vec<Vec<f64>>>;

/// Legacy RESULT payload: every sensor flattened into one row per step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultDump {
    pub features: Vec<u32>,
    pub rows: Vec<Vec<f64>>,
}

/// A decoded client message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Hello,
    Bye,
    Error(String),
    Exit,
    Configure(SimulationConfig),
    Reset(Option<Vec<f64>>),
    SensorQuery,
    Order(ArmOrder),
    Step(u32),
    Result,
    /// Arms or disarms the inverse request sent on the next pointer event.
    InverseToggle(bool),
    Display(DisplayRequest),
}

impl Inbound {
    pub fn kind(&self) -> MessageKind {
        match self {
            Inbound::Hello => MessageKind::Hello,
            Inbound::Bye => MessageKind::Bye,
            Inbound::Error(_) => MessageKind::Error,
            Inbound::Exit => MessageKind::Exit,
            Inbound::Configure(_) => MessageKind::Configure,
            Inbound::Reset(_) => MessageKind::Reset,
            Inbound::SensorQuery => MessageKind::SensorQuery,
            Inbound::Order(_) => MessageKind::Order,
            Inbound::Step(_) => MessageKind::Step,
            Inbound::Result => MessageKind::Result,
            Inbound::InverseToggle(_) => MessageKind::InverseRequest,
            Inbound::Display(_) => MessageKind::Display,
        }
    }
}

/// A server message before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Hello,
    Bye,
    /// Text of a validation failure reported to the client.
    Error(String),
    Exit,
    Configured(GeoBounds),
    Reset,
    /// RESET answered with the readings of the fresh world.
    ResetSnapshot(Readings),
    Sensors(Readings),
    Order,
    Step,
    Result(ResultDump),
    InverseRequest { features: Vec<u32>, values: Vec<f64> },
    Display { accepted: bool },
}

impl Outbound {
    pub fn kind(&self) -> MessageKind {
        match self {
            Outbound::Hello => MessageKind::Hello,
            Outbound::Bye => MessageKind::Bye,
            Outbound::Error(_) => MessageKind::Error,
            Outbound::Exit => MessageKind::Exit,
            Outbound::Configured(_) => MessageKind::Configure,
            Outbound::Reset => MessageKind::Reset,
            Outbound::ResetSnapshot(_) => MessageKind::Reset,
            Outbound::Sensors(_) => MessageKind::SensorQuery,
            Outbound::Order => MessageKind::Order,
            Outbound::Step => MessageKind::Step,
            Outbound::Result(_) => MessageKind::Result,
            Outbound::InverseRequest { .. } => MessageKind::InverseRequest,
            Outbound::Display { .. } => MessageKind::Display,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_kind() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::try_from(kind.tag()), Ok(kind));
        }
    }

    #[test]
    fn tags_outside_the_table_are_format_errors() {
        assert_eq!(MessageKind::try_from(12), Err(FormatError::UnknownTag(12)));
        assert_eq!(
            MessageKind::try_from(u32::MAX),
            Err(FormatError::UnknownTag(u32::MAX))
        );
    }
}
