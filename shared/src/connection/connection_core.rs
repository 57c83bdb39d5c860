use std::collections::HashMap;

use log::{error, trace};

use repnet_serde::{BitWrite, BitWriter, BitWriterMark};

use crate::{
    bunch::OutBunch,
    constants::{
        LAG_HISTORY_SIZE, MAX_BUNCH_HEADER_BITS, MAX_CHANNELS, MAX_PACKETID,
        MAX_PACKET_HEADER_BITS, MAX_PACKET_TRAILER_BITS, MIN_NET_SPEED, PACKET_OVERHEAD,
        PENDING_DESTROY_TIMEOUT,
    },
    packet_ring::PacketRing,
    types::{ActorId, ChannelIndex, ChannelSequence, ConnectionState, PacketId},
};

use super::{
    connection_config::ConnectionConfig, connection_stats::ConnectionStats,
    event::ConnectionEvent, packet_simulation::PacketSimulator, transport::PacketSender,
};

/// Send buffer position plus the bit counters at that position, so popping
/// a write restores the accounting exactly.
#[derive(Clone, Copy, Default)]
struct SendBufferMark {
    mark: BitWriterMark,
    num_packet_id_bits: u32,
    num_bunch_bits: u32,
    num_ack_bits: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Bunch,
    Ack,
}

struct LagRecord {
    sent_time: f64,
    out_kbytes_per_second: u32,
}

/// Close the connection once the current operation finished, optionally
/// telling the peer why first.
pub(crate) struct CloseRequest {
    pub failure: Option<String>,
}

/// Connection state shared with the channels: packet assembly, reliable
/// sequence counters, ack bookkeeping and the bandwidth budget. Channels
/// borrow it mutably while the connection owns the channel table.
pub(crate) struct ConnectionCore {
    config: ConnectionConfig,
    transport: Box<dyn PacketSender>,
    simulator: PacketSimulator,
    state: ConnectionState,

    // Time
    time: f64,
    frame_delta: f64,
    pub last_receive_time: f64,
    pub last_send_time: f64,
    pub last_tick_time: f64,

    // Packet ids
    pub in_packet_id: PacketId,
    pub out_packet_id: PacketId,
    pub out_ack_packet_id: PacketId,

    in_reliable: Vec<ChannelSequence>,
    out_reliable: Vec<ChannelSequence>,

    // Send buffer
    send_buffer: BitWriter,
    num_packet_id_bits: u32,
    num_bunch_bits: u32,
    num_ack_bits: u32,

    // Merging
    last_start: SendBufferMark,
    last_end: BitWriterMark,
    last_out: Option<OutBunch>,
    last_out_is_queued: bool,
    allow_merge: bool,
    pub time_sensitive: bool,

    // Acks
    queued_acks: Vec<PacketId>,
    resend_acks: Vec<PacketId>,
    lag_history: PacketRing<LagRecord, LAG_HISTORY_SIZE>,

    // Bandwidth
    queued_bits: i64,
    current_net_speed: u32,

    pub stats: ConnectionStats,
    pub pending_destroy: bool,
    pub use_short_connect_timeout: bool,
    pub security_violations: u32,
    pub remote_little_endian: Option<bool>,
    pub actor_channels: HashMap<ActorId, ChannelIndex>,
    close_request: Option<CloseRequest>,
    events: Vec<ConnectionEvent>,
}

impl ConnectionCore {
    pub fn new(config: ConnectionConfig, transport: Box<dyn PacketSender>, time: f64) -> Self {
        let send_buffer_bits = (config.max_packet * 8).saturating_sub(config.max_packet_handler_bits);
        let simulator = PacketSimulator::new(config.packet_simulation.clone(), config.simulation_seed);
        let current_net_speed = config.net_speed.max(MIN_NET_SPEED);
        Self {
            config,
            transport,
            simulator,
            state: ConnectionState::Pending,
            time,
            frame_delta: 0.0,
            last_receive_time: time,
            last_send_time: time,
            last_tick_time: time,
            in_packet_id: -1,
            out_packet_id: 0,
            out_ack_packet_id: -1,
            in_reliable: vec![0; MAX_CHANNELS as usize],
            out_reliable: vec![0; MAX_CHANNELS as usize],
            send_buffer: BitWriter::new(send_buffer_bits),
            num_packet_id_bits: 0,
            num_bunch_bits: 0,
            num_ack_bits: 0,
            last_start: SendBufferMark::default(),
            last_end: BitWriterMark::default(),
            last_out: None,
            last_out_is_queued: false,
            allow_merge: false,
            time_sensitive: false,
            queued_acks: Vec::new(),
            resend_acks: Vec::new(),
            lag_history: PacketRing::new(),
            queued_bits: 0,
            current_net_speed,
            stats: ConnectionStats::new(time),
            pending_destroy: false,
            use_short_connect_timeout: false,
            security_violations: 0,
            remote_little_endian: None,
            actor_channels: HashMap::new(),
            close_request: None,
            events: Vec::new(),
        }
    }

    // Accessors

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn simulator_mut(&mut self) -> &mut PacketSimulator {
        &mut self.simulator
    }

    pub fn simulator(&self) -> &PacketSimulator {
        &self.simulator
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn set_frame_delta(&mut self, delta: f64) {
        self.frame_delta = delta;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn is_internal_ack(&self) -> bool {
        self.config.internal_ack
    }

    pub fn current_net_speed(&self) -> u32 {
        self.current_net_speed
    }

    /// Clamps a rate requested by the peer into the allowed range.
    pub fn set_net_speed(&mut self, rate: u32) {
        let max = self.config.max_client_rate.max(MIN_NET_SPEED);
        self.current_net_speed = rate.clamp(MIN_NET_SPEED, max);
    }

    pub fn queued_bits(&self) -> i64 {
        self.queued_bits
    }

    pub fn max_packet_bits(&self) -> u32 {
        self.config.max_packet * 8
    }

    /// Largest payload a single bunch may carry: the packet minus worst-case
    /// packet header, bunch header, trailer and packet handler bits.
    pub fn max_single_bunch_size_bits(&self) -> u32 {
        self.max_packet_bits().saturating_sub(
            MAX_BUNCH_HEADER_BITS
                + MAX_PACKET_TRAILER_BITS
                + MAX_PACKET_HEADER_BITS
                + self.config.max_packet_handler_bits,
        )
    }

    // Reliable sequences

    pub fn in_reliable(&self, ch_index: ChannelIndex) -> ChannelSequence {
        self.in_reliable.get(ch_index as usize).copied().unwrap_or(0)
    }

    pub fn set_in_reliable(&mut self, ch_index: ChannelIndex, sequence: ChannelSequence) {
        if let Some(slot) = self.in_reliable.get_mut(ch_index as usize) {
            *slot = sequence;
        }
    }

    pub fn out_reliable(&self, ch_index: ChannelIndex) -> ChannelSequence {
        self.out_reliable.get(ch_index as usize).copied().unwrap_or(0)
    }

    /// Allocates the next outgoing reliable sequence of a channel.
    pub fn next_out_reliable(&mut self, ch_index: ChannelIndex) -> ChannelSequence {
        match self.out_reliable.get_mut(ch_index as usize) {
            Some(slot) => {
                *slot += 1;
                *slot
            }
            None => 0,
        }
    }

    // Events & close requests

    pub fn push_event(&mut self, event: ConnectionEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn request_close(&mut self, failure: Option<String>) {
        if self.close_request.is_none() {
            self.close_request = Some(CloseRequest { failure });
        }
    }

    pub fn take_close_request(&mut self) -> Option<CloseRequest> {
        self.close_request.take()
    }

    // Send buffer

    fn send_buffer_bits_free(&self) -> u32 {
        let used = if self.send_buffer.num_bits() > 0 {
            self.send_buffer.num_bits() + MAX_PACKET_TRAILER_BITS
        } else {
            MAX_PACKET_HEADER_BITS + MAX_PACKET_TRAILER_BITS
        };
        self.send_buffer.max_bits().saturating_sub(used)
    }

    fn write_packet_id(&mut self) {
        let before = self.send_buffer.num_bits();
        self.send_buffer
            .write_int_wrapped(self.out_packet_id as u32, MAX_PACKETID);
        self.num_packet_id_bits += self.send_buffer.num_bits() - before;
    }

    /// Appends `size` bits of `bits` followed by `extra_size` bits of
    /// `extra`, flushing first if they do not fit. Returns the id of the
    /// packet the bits went into.
    pub fn write_bits_to_send_buffer(
        &mut self,
        bits: &[u8],
        size: u32,
        extra: &[u8],
        extra_size: u32,
        kind: WriteKind,
    ) -> PacketId {
        let total = size + extra_size;
        if total > self.send_buffer_bits_free() {
            self.flush_net(false);
        }

        self.last_start = SendBufferMark {
            mark: self.send_buffer.mark(),
            num_packet_id_bits: self.num_packet_id_bits,
            num_bunch_bits: self.num_bunch_bits,
            num_ack_bits: self.num_ack_bits,
        };

        if self.send_buffer.is_empty() && !self.is_internal_ack() {
            self.write_packet_id();
        }

        if size > 0 {
            self.send_buffer.write_bits(bits, size);
        }
        if extra_size > 0 {
            self.send_buffer.write_bits(extra, extra_size);
        }
        match kind {
            WriteKind::Bunch => self.num_bunch_bits += total,
            WriteKind::Ack => self.num_ack_bits += total,
        }

        let packet_id = self.out_packet_id;
        if self.send_buffer_bits_free() == 0 {
            self.flush_net(false);
        }
        packet_id
    }

    /// Undoes the most recent `write_bits_to_send_buffer`.
    pub fn pop_last_start(&mut self) {
        self.last_start.mark.pop(&mut self.send_buffer);
        self.num_packet_id_bits = self.last_start.num_packet_id_bits;
        self.num_bunch_bits = self.last_start.num_bunch_bits;
        self.num_ack_bits = self.last_start.num_ack_bits;
    }

    // Merging

    /// Whether a `num_bits` bunch on `ch_index` can be folded into the
    /// bunch written last: nothing else was written since, merging was
    /// allowed for it and the combined payload still fits one bunch.
    pub fn can_merge(&self, ch_index: ChannelIndex, num_bits: u32, max_single_bits: u32) -> bool {
        let Some(last_out) = &self.last_out else {
            return false;
        };
        self.allow_merge
            && last_out.ch_index == ch_index
            && self.last_end.num_bits() != 0
            && self.last_end.num_bits() == self.send_buffer.num_bits()
            && last_out.num_bits() + num_bits <= max_single_bits
    }

    /// The last written bunch, and whether it sits in its channel's reliable
    /// window.
    pub fn take_last_out(&mut self) -> Option<(OutBunch, bool)> {
        let queued = self.last_out_is_queued;
        self.last_out.take().map(|bunch| (bunch, queued))
    }

    pub fn remember_last_out(&mut self, bunch: &OutBunch, queued: bool) {
        self.last_out = Some(bunch.clone());
        self.last_out_is_queued = queued;
        self.last_end = self.send_buffer.mark();
    }

    // Bunches & acks

    /// Writes a bunch header and payload into the send buffer.
    pub fn send_raw_bunch(&mut self, bunch: &mut OutBunch, allow_merge: bool) -> PacketId {
        self.time_sensitive = true;

        let mut header = BitWriter::new(MAX_BUNCH_HEADER_BITS);
        header.write_bit(false);
        bunch
            .header(self.is_internal_ack())
            .write(&mut header, self.max_packet_bits());
        if header.overflowed() {
            error!(
                "Bunch header for channel {} overflowed {} bits",
                bunch.ch_index, MAX_BUNCH_HEADER_BITS
            );
        }

        let packet_id = self.write_bits_to_send_buffer(
            header.data(),
            header.num_bits(),
            bunch.data(),
            bunch.num_bits(),
            WriteKind::Bunch,
        );
        trace!(
            "bunch ch {} seq {} ({} bits) into packet {}",
            bunch.ch_index,
            bunch.ch_sequence,
            bunch.num_bits(),
            packet_id
        );
        bunch.packet_id = packet_id;
        bunch.time = self.time;
        self.allow_merge = allow_merge;
        packet_id
    }

    /// Writes an ack for `ack_packet_id`. A first-time ack is remembered so
    /// it can be resent once on the next packet.
    pub fn send_ack(&mut self, ack_packet_id: PacketId, first_time: bool) {
        if self.is_internal_ack() {
            return;
        }
        if first_time {
            self.purge_acks();
            self.queued_acks.push(ack_packet_id);
        }

        let mut ack = BitWriter::new(64);
        ack.write_bit(true);
        ack.write_int_wrapped(ack_packet_id as u32, MAX_PACKETID);
        let send_frame_time = self.config.ping_exclude_frame_time;
        ack.write_bit(send_frame_time);
        if send_frame_time {
            let frame_ms = (self.frame_delta * 1000.0).clamp(0.0, 255.0) as u8;
            ack.write_byte(frame_ms);
        }
        ack.write_int_packed(self.stats.in_bytes_per_second / 1024);

        self.write_bits_to_send_buffer(ack.data(), ack.num_bits(), &[], 0, WriteKind::Ack);
        self.allow_merge = false;
        self.time_sensitive = true;
    }

    /// Resends every ack queued for a second transmission.
    pub fn purge_acks(&mut self) {
        let resend = std::mem::take(&mut self.resend_acks);
        for ack_packet_id in resend {
            self.send_ack(ack_packet_id, false);
        }
    }

    /// Records the round trip of an acknowledged packet. Each sent packet
    /// yields at most one sample.
    pub fn record_ack(&mut self, ack_packet_id: PacketId, remote_in_kbytes: u32, remote_frame_ms: u8) {
        if let Some(record) = self.lag_history.take(ack_packet_id) {
            let lag = (self.time - record.sent_time - f64::from(remote_frame_ms) / 1000.0).max(0.0);
            self.stats.record_lag(lag);
            self.stats
                .record_remote_saturation(remote_in_kbytes, record.out_kbytes_per_second);
        }
    }

    // Flushing

    fn keep_alive_due(&self) -> bool {
        self.time - self.last_send_time > self.config.keep_alive_time
            && !self.is_internal_ack()
            && !self.is_closed()
    }

    /// Whether tick should flush: time-sensitive data is waiting or the
    /// keepalive is due.
    pub fn should_flush(&self) -> bool {
        self.time_sensitive || self.keep_alive_due()
    }

    /// Terminates the send buffer and hands it to the transport (through the
    /// packet simulation unless `ignore_simulation`).
    pub fn flush_net(&mut self, ignore_simulation: bool) {
        self.last_end = BitWriterMark::default();
        self.time_sensitive = false;

        if !self.send_buffer.is_empty() || self.keep_alive_due() {
            if self.send_buffer.is_empty() && !self.is_internal_ack() {
                self.write_packet_id();
            }
            self.send_buffer.write_bit(true);

            if self.send_buffer.overflowed() {
                error!(
                    "Send buffer overflowed writing packet {} ({} bits), dropping it",
                    self.out_packet_id,
                    self.send_buffer.num_bits()
                );
            } else {
                let bypass = ignore_simulation || self.is_internal_ack() || self.is_closed();
                self.simulator.dispatch(
                    self.time,
                    self.send_buffer.data(),
                    self.send_buffer.num_bits(),
                    self.transport.as_mut(),
                    bypass,
                );
                trace!(
                    "sent packet {} ({} bunch bits, {} ack bits)",
                    self.out_packet_id,
                    self.num_bunch_bits,
                    self.num_ack_bits
                );

                self.lag_history.insert(
                    self.out_packet_id,
                    LagRecord {
                        sent_time: self.time,
                        out_kbytes_per_second: self.stats.out_bytes_per_second / 1024,
                    },
                );
                let num_bytes = self.send_buffer.num_bytes() as u32 + PACKET_OVERHEAD;
                self.stats.record_sent(num_bytes);
                self.queued_bits += i64::from(num_bytes) * 8;
                self.out_packet_id += 1;
                self.last_send_time = self.time;
            }

            self.send_buffer.reset();
            self.num_packet_id_bits = 0;
            self.num_bunch_bits = 0;
            self.num_ack_bits = 0;
        }

        self.resend_acks.append(&mut self.queued_acks);
    }

    pub fn send_delayed_packets(&mut self) {
        self.simulator.send_due(self.time, self.transport.as_mut());
    }

    // Bandwidth

    /// Whether the bandwidth budget allows more data this tick. With
    /// `saturate` the budget is spent first, so only data already in the
    /// send buffer counts.
    pub fn is_net_ready(&mut self, saturate: bool) -> bool {
        let buffered = i64::from(self.send_buffer.num_bits());
        if saturate {
            self.queued_bits = -buffered;
        }
        self.queued_bits + buffered <= 0
    }

    /// Drains the budget by what the net speed allows for `delta` seconds,
    /// never banking more than two ticks' worth.
    pub fn drain_queued_bits(&mut self, delta: f64) {
        let delta_bits = self.current_net_speed as f64 * delta * 8.0;
        self.queued_bits -= delta_bits.trunc() as i64;
        let allowed_lag = (2.0 * delta_bits).trunc() as i64;
        if self.queued_bits < -allowed_lag {
            self.queued_bits = -allowed_lag;
        }
    }

    // Timeouts

    pub fn timeout_value(&self) -> f32 {
        if self.config.no_timeouts {
            return if self.pending_destroy {
                PENDING_DESTROY_TIMEOUT
            } else {
                f32::MAX
            };
        }

        let mut timeout = self.config.initial_connect_timeout;
        if self.state != ConnectionState::Pending
            && (self.pending_destroy || self.use_short_connect_timeout)
        {
            timeout = if self.pending_destroy {
                PENDING_DESTROY_TIMEOUT
            } else {
                self.config.connection_timeout
            };
        }

        let multiplier = self.config.timeout_multiplier_for_unoptimized_builds;
        if self.config.long_timeouts && multiplier > 0.0 {
            timeout *= multiplier;
        }
        timeout
    }
}
