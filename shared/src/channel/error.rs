use thiserror::Error;

use repnet_serde::SerdeErr;

use crate::{
    channel::ChannelType,
    types::{ChannelIndex, ChannelSequence},
};

/// Errors raised by channel creation, sending and bunch processing. Errors
/// raised while processing a received bunch close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Only the control channel may be opened before the control channel's open is acknowledged
    #[error("Cannot open a {ch_type} channel before the control channel is open and acknowledged")]
    ControlChannelNotOpen { ch_type: ChannelType },

    /// Every channel index is in use
    #[error("No free channel index for a {ch_type} channel")]
    NoFreeChannel { ch_type: ChannelType },

    /// The fixed index for this channel type is taken
    #[error("Channel index {ch_index} is already in use")]
    ChannelIndexInUse { ch_index: ChannelIndex },

    /// The connection is closed
    #[error("Connection is closed")]
    ConnectionClosed,

    /// No channel lives at this index
    #[error("No channel at index {ch_index}")]
    NoSuchChannel { ch_index: ChannelIndex },

    /// A channel of one type was asked to do another type's work
    #[error("Channel {ch_index} is a {actual} channel, expected {expected}")]
    WrongChannelType {
        ch_index: ChannelIndex,
        expected: ChannelType,
        actual: ChannelType,
    },

    /// The outgoing bunch was marked overflowed while it was written
    #[error("Bunch on channel {ch_index} overflowed its {max_bits} bit budget")]
    BunchOverflowed { ch_index: ChannelIndex, max_bits: u32 },

    /// Sending would leave more unacknowledged reliable bunches than the window holds
    #[error("Outgoing reliable buffer overflow on channel {ch_index}: {num_out_rec} unacked, {num_new} new")]
    ReliableBufferOverflow {
        ch_index: ChannelIndex,
        num_out_rec: usize,
        num_new: usize,
    },

    /// The channel already sent or received its close bunch
    #[error("Channel {ch_index} is closing")]
    ChannelClosing { ch_index: ChannelIndex },

    /// A channel opened by an unreliable bunch can only carry unreliable data
    #[error("Reliable bunch on net-temporary channel {ch_index}")]
    ReliableOnTemporaryChannel { ch_index: ChannelIndex },

    /// Too many control messages waiting for the reliable window
    #[error("Control channel message queue is full ({queued} queued)")]
    ControlQueueFull { queued: usize },

    /// Too many out-of-order reliable bunches buffered (SECURITY: possible flooding)
    #[error("Too many queued reliable bunches on channel {ch_index} (waiting for {expected})")]
    TooManyQueuedBunches {
        ch_index: ChannelIndex,
        expected: ChannelSequence,
    },

    /// A reassembled partial bunch exceeded the reassembly limit (SECURITY: possible memory exhaustion)
    #[error("Partial bunch on channel {ch_index} grew to {num_bytes} bytes, limit is {max_bytes}")]
    PartialBunchTooLarge {
        ch_index: ChannelIndex,
        num_bytes: usize,
        max_bytes: usize,
    },

    /// A reliable bunch arrived on a remotely opened channel before its open bunch
    #[error("Reliable bunch on channel {ch_index} before the channel was opened")]
    ReliableBeforeOpen { ch_index: ChannelIndex },

    /// The peer sent an open bunch for a channel this side opened
    #[error("Received an open bunch for locally opened channel {ch_index}")]
    OpenOnLocalChannel { ch_index: ChannelIndex },

    /// The first control message was not the handshake hello
    #[error("First control message must be Hello, got message type {message_type}")]
    MissingHello { message_type: u8 },

    /// Unknown control message type (SECURITY: possibly crafted data)
    #[error("Unknown control message type {message_type}")]
    UnknownControlMessage { message_type: u8 },

    /// An actor channel's open bunch did not name a valid actor
    #[error("Actor channel {ch_index} opened without a valid net guid")]
    InvalidActorGuid { ch_index: ChannelIndex },

    /// Bunch payload could not be read
    #[error("Failed to read bunch payload: {0}")]
    Serde(#[from] SerdeErr),
}
