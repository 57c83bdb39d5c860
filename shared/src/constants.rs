// Channel table

/// Number of channel slots per connection. Index 0 is always the control channel.
pub const MAX_CHANNELS: u32 = 10240;

/// Fixed slot of the voice channel.
pub const VOICE_CHANNEL_INDEX: u32 = 1;

/// Exclusive upper bound of the channel type field on the wire.
pub const CHTYPE_MAX: u32 = 8;

// Reliability windows

/// Maximum number of unacknowledged (outgoing) or out-of-order (incoming)
/// reliable bunches a channel may hold.
pub const RELIABLE_BUFFER: usize = 256;

/// Packet ids travel modulo this value.
pub const MAX_PACKETID: u32 = 16384;

/// Reliable channel sequences travel modulo this value.
pub const MAX_CHSEQUENCE: u32 = 1024;

// Framing overhead

pub const MAX_BUNCH_HEADER_BITS: u32 = 64;
pub const MAX_PACKET_HEADER_BITS: u32 = 15;
pub const MAX_PACKET_TRAILER_BITS: u32 = 1;

/// Upper bound of a reassembled partial bunch.
pub const MAX_CONSTRUCTED_PARTIAL_SIZE_IN_BYTES: usize = 64 * 1024;

/// Number of sent packets remembered for lag measurement.
pub const LAG_HISTORY_SIZE: usize = 256;

/// A connection that has not heard from its peer for this long is not
/// considered for actor replication.
pub const CONNECTION_READY_RECEIVE_WINDOW: f64 = 1.5;

/// Timeout applied once a connection is pending destruction.
pub const PENDING_DESTROY_TIMEOUT: f32 = 2.0;

/// Per-packet transport overhead (IP + UDP headers) counted against the
/// bandwidth budget.
pub const PACKET_OVERHEAD: u32 = 28;

// Bandwidth

pub const DEFAULT_NET_SPEED: u32 = 2600;
pub const MIN_NET_SPEED: u32 = 1800;

// Control channel

/// Control messages held while the reliable window is full.
pub const MAX_QUEUED_CONTROL_MESSAGES: usize = 256;

/// Unacked control bunches are resent after this many seconds while the
/// control channel's open is not acknowledged.
pub const CONTROL_RESEND_INTERVAL: f64 = 1.0;

/// No control bunches are resent while more than this many are unacked.
pub const CONTROL_MAX_RESEND_BATCH: usize = 8;
