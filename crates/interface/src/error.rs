//! Error taxonomy of the control protocol.
//!
//! - [`FormatError`]: the message could not be decoded (unknown tag, payload
//!   not matching the tag's schema). Logged and dropped, never answered.
//! - [`ValidationError`]: the payload decoded but is semantically invalid.
//!   Reported back to the requesting client; state is left untouched.
//! - [`TransportError`]: the message channel failed to deliver.

use thiserror::Error;

use crate::message::MessageKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("unknown message tag {0}")]
    UnknownTag(u32),

    #[error("{kind} message carries no payload where one is required")]
    MissingPayload { kind: MessageKind },

    #[error("{kind} message carries a `{found}` payload")]
    PayloadMismatch {
        kind: MessageKind,
        found: &'static str,
    },

    #[error("{kind} payload is missing field `{field}`")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },

    #[error("unknown toy kind `{0}` (expected `ball` or `box`)")]
    UnknownToyKind(String),

    #[error("{kind} is not accepted from clients")]
    NotInbound { kind: MessageKind },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("simulation is not configured, send CONFIGURE first")]
    NotConfigured,

    #[error("no world exists, send RESET or ORDER first")]
    NoWorld,

    #[error("{what} has {found} entries but the arm has {expected} joints")]
    JointCountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{what} joint {joint} angle {angle} is outside the limit ±{limit}")]
    AngleOutOfRange {
        what: &'static str,
        joint: usize,
        angle: f64,
        limit: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sensor `{channel}` logged {found} samples, expected {expected}")]
    HistoryLengthMismatch {
        channel: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("client #{0} is not registered")]
    UnknownClient(u64),

    #[error("client #{0} disconnected")]
    Disconnected(u64),

    #[error("message channel closed")]
    Closed,
}

/// Any failure a dispatched message can end in.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
