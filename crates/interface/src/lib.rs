//! interface: wire schema, typed protocol messages and the error taxonomy
//! shared by the server and its clients.

/// Prost/tonic-generated protobuf and service definitions.
pub mod wire {
    tonic::include_proto!("interface");

    pub use client_msg::Body as ClientMsgBody;
    pub use server_msg::Body as ServerMsgBody;
}

pub mod codec;
pub mod config;
pub mod error;
pub mod message;

pub use config::{AREA_SIZE, GeoBounds, SimulationConfig, ToyKind, ToySpec, WALL_MARGIN};
pub use error::{FormatError, ProtocolError, TransportError, ValidationError};
pub use message::{
    ArmOrder, DisplayRequest, Inbound, MessageKind, Outbound, Readings, ResultDump,
};
pub use wire::{ClientMsg, ServerMsg};
