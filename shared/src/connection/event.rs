use crate::{
    channel::{ChannelType, ControlMessage},
    types::{ActorId, ChannelIndex, NetGuid},
};

/// Something the host should react to, produced while processing received
/// packets or ticking the connection. Drained with
/// `Connection::take_events`.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    /// The peer opened a channel.
    ChannelOpened {
        ch_index: ChannelIndex,
        ch_type: ChannelType,
    },
    ControlMessage(ControlMessage),
    /// The first bunch of a remotely opened actor channel named its actor.
    ActorOpened {
        ch_index: ChannelIndex,
        guid: NetGuid,
    },
    /// Actor payload, delivered in reliable order for reliable bunches.
    ActorUpdate {
        ch_index: ChannelIndex,
        guid: NetGuid,
        reliable: bool,
        payload: Vec<u8>,
        num_bits: u32,
    },
    /// The peer closed an actor channel. `dormant` is set when the actor
    /// went dormant rather than being destroyed.
    ActorClosed {
        ch_index: ChannelIndex,
        guid: NetGuid,
        dormant: bool,
    },
    /// A locally opened actor channel closed itself for dormancy.
    ActorDormant {
        ch_index: ChannelIndex,
        actor: ActorId,
    },
    /// An unreliable update of this actor was lost and should be resent.
    ActorUpdateLost { actor: ActorId },
    VoicePacket { payload: Vec<u8>, num_bits: u32 },
    /// A channel was removed from the channel table.
    ChannelCleanedUp {
        ch_index: ChannelIndex,
        ch_type: ChannelType,
        actor: Option<ActorId>,
        dormant: bool,
    },
    /// The connection closed. No further packets will be sent.
    Closed,
}
