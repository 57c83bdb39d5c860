use std::fmt;

use thiserror::Error;

use repnet_serde::SerdeErr;

use crate::types::ChannelIndex;

/// Category a packet-level violation is reported under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecurityEvent {
    /// Structurally invalid packet or bunch header.
    MalformedPacket,
    /// Well formed, but inconsistent with the connection's state.
    InvalidData,
    /// The connection was torn down in response.
    Closed,
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityEvent::MalformedPacket => "Malformed_Packet",
            SecurityEvent::InvalidData => "Invalid_Data",
            SecurityEvent::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Errors raised while parsing a received packet (SECURITY: every variant is
/// caused by data the peer sent)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// A zero-length packet
    #[error("Received an empty packet")]
    EmptyPacket,

    /// The final byte carries no termination bit
    #[error("Packet of {num_bytes} bytes is missing its termination bit")]
    MissingTerminationBit { num_bytes: usize },

    /// The packet ended in the middle of a header
    #[error("Packet header truncated: {0}")]
    Truncated(SerdeErr),

    /// A bunch claims more payload than the packet holds
    #[error("Bunch on channel {ch_index} claims {payload_bits} payload bits with {bits_left} bits left in the packet")]
    BunchDataOverflow {
        ch_index: ChannelIndex,
        payload_bits: u32,
        bits_left: u32,
    },

    /// A bunch on a channel other than control arrived before the handshake finished
    #[error("Bunch on channel {ch_index} before the connection was open")]
    BunchBeforeOpen { ch_index: ChannelIndex },

    /// A bunch would open a channel of a type this build does not know
    #[error("Bunch on channel {ch_index} has unknown channel type {ch_type}")]
    UnknownChannelType { ch_index: ChannelIndex, ch_type: u32 },

    /// A bunch names a type that disagrees with the channel's established type
    #[error("Bunch on channel {ch_index} has channel type {ch_type}, the channel was opened as {established}")]
    ChannelTypeMismatch {
        ch_index: ChannelIndex,
        ch_type: u32,
        established: u32,
    },
}

impl PacketError {
    pub fn security_event(&self) -> SecurityEvent {
        match self {
            PacketError::EmptyPacket
            | PacketError::MissingTerminationBit { .. }
            | PacketError::Truncated(_)
            | PacketError::BunchBeforeOpen { .. } => SecurityEvent::MalformedPacket,
            PacketError::BunchDataOverflow { .. }
            | PacketError::UnknownChannelType { .. }
            | PacketError::ChannelTypeMismatch { .. } => SecurityEvent::InvalidData,
        }
    }
}

impl From<SerdeErr> for PacketError {
    fn from(err: SerdeErr) -> Self {
        PacketError::Truncated(err)
    }
}
