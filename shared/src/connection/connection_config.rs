use std::default::Default;

use crate::constants::DEFAULT_NET_SPEED;

/// Contains Config properties which will be used by a Connection
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Largest packet handed to the transport, in bytes.
    pub max_packet: u32,
    /// Bits at the end of every packet reserved for a packet handler layered
    /// beneath the connection (encryption, compression).
    pub max_packet_handler_bits: u32,
    /// Seconds of silence tolerated before the handshake completes.
    pub initial_connect_timeout: f32,
    /// Seconds of silence tolerated once the connection is open.
    pub connection_timeout: f32,
    /// Multiplies every timeout when `long_timeouts` is set. Non-positive
    /// values are ignored.
    pub timeout_multiplier_for_unoptimized_builds: f32,
    pub long_timeouts: bool,
    /// Never time out (debugging). A connection pending destruction still
    /// goes away after a short grace period.
    pub no_timeouts: bool,
    /// An empty packet is sent when nothing went out for this many seconds.
    pub keep_alive_time: f64,
    /// Seconds between connection statistics updates.
    pub stat_period: f64,
    /// Initial outgoing bandwidth budget in bytes per second.
    pub net_speed: u32,
    /// Upper bound for a rate requested by the peer's `NetSpeed` message.
    pub max_client_rate: u32,
    /// Every packet counts as acknowledged as soon as it is sent. Used when
    /// recording a replay, where there is no peer to ack anything.
    pub internal_ack: bool,
    /// An unreliable bunch split into at least this many partials is sent
    /// reliably instead. Zero disables the promotion.
    pub partial_bunch_reliable_threshold: usize,
    /// Number of security violations after which the connection is closed.
    pub security_violation_close_threshold: u32,
    /// Open the voice channel when the connection is created.
    pub enable_voice: bool,
    /// Acks carry how long this side's frame took, so the peer can exclude it
    /// from its lag measurement.
    pub ping_exclude_frame_time: bool,
    /// Sent in the handshake `Hello`.
    pub network_version: u32,
    /// Artificial network conditions, applied when built with `net_test`.
    pub packet_simulation: PacketSimulationSettings,
    /// Seed for the simulation's random source. `None` seeds from entropy.
    pub simulation_seed: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_packet: 1024,
            max_packet_handler_bits: 0,
            initial_connect_timeout: 120.0,
            connection_timeout: 60.0,
            timeout_multiplier_for_unoptimized_builds: 1.0,
            long_timeouts: false,
            no_timeouts: false,
            keep_alive_time: 0.2,
            stat_period: 1.0,
            net_speed: DEFAULT_NET_SPEED,
            max_client_rate: 15000,
            internal_ack: false,
            partial_bunch_reliable_threshold: 8,
            security_violation_close_threshold: 1,
            enable_voice: false,
            ping_exclude_frame_time: false,
            network_version: 1,
            packet_simulation: PacketSimulationSettings::default(),
            simulation_seed: None,
        }
    }
}

/// Channels the peer may open on a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RemoteChannelPolicy {
    /// Any channel type.
    #[default]
    AcceptAll,
    /// Only the control channel. Bunches on any other channel are a security
    /// violation until the connection is open, and channel opens are refused
    /// after that. Servers use this for client connections.
    ControlOnly,
}

/// Artificial loss, duplication, reordering and lag applied to outgoing
/// packets. Percentages are in `0..=100`; lag is in milliseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PacketSimulationSettings {
    pub pkt_loss: u32,
    pub pkt_dup: u32,
    pub pkt_order: bool,
    pub pkt_lag: u32,
    pub pkt_lag_variance: u32,
}

impl PacketSimulationSettings {
    pub fn is_active(&self) -> bool {
        self.pkt_loss > 0 || self.pkt_dup > 0 || self.pkt_order || self.pkt_lag > 0
    }
}
