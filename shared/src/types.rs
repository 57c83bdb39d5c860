use std::fmt;

/// Monotonic packet counter. Only the low bits travel on the wire.
pub type PacketId = i32;

/// Reliable sequence number of a bunch within its channel.
pub type ChannelSequence = i32;

pub type ChannelIndex = u32;

/// Identifies an actor inside the host process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Actor({})", self.0)
    }
}

/// Network-stable identifier of a replicated object, shared by both peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NetGuid(pub u32);

impl NetGuid {
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NetGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetGuid({})", self.0)
    }
}

/// Inclusive range of packet ids a (possibly partial) bunch was sent in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketIdRange {
    pub first: PacketId,
    pub last: PacketId,
}

impl PacketIdRange {
    pub fn single(packet_id: PacketId) -> Self {
        Self {
            first: packet_id,
            last: packet_id,
        }
    }

    pub fn in_range(&self, packet_id: PacketId) -> bool {
        self.first <= packet_id && packet_id <= self.last
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Handshaking, the control channel is not open yet.
    Pending,
    Open,
    Closed,
}
