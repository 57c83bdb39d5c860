use std::collections::BTreeMap;

use log::{debug, error, info, trace, warn};

use repnet_serde::{BitReader, BitWrite};

use crate::{
    bunch::{BunchHeader, InBunch, OutBunch},
    channel::{Channel, ChannelError, ChannelType, ControlMessage},
    constants::{MAX_CHANNELS, MAX_CHSEQUENCE, MAX_PACKETID, PACKET_OVERHEAD, VOICE_CHANNEL_INDEX},
    types::{ActorId, ChannelIndex, ConnectionState, NetGuid, PacketId, PacketIdRange},
    wrapping_number::make_relative,
};

use super::{
    connection_config::{ConnectionConfig, PacketSimulationSettings, RemoteChannelPolicy},
    connection_core::ConnectionCore,
    connection_stats::ConnectionStats,
    error::{PacketError, SecurityEvent},
    event::ConnectionEvent,
    transport::PacketSender,
};

/// What to do with the rest of a packet after one of its bunches.
enum BunchFlow {
    Continue { skip_ack: bool },
    /// The connection closed; nothing else in the packet is processed.
    Stop,
}

/// One end of a replication link. Turns channel bunches into packets for the
/// transport, and received packets back into acks and per-channel bunches.
///
/// Every public operation leaves the channel table consistent: channels that
/// cleaned themselves up are removed, and a close requested by a channel is
/// carried out before the call returns.
pub struct Connection {
    core: ConnectionCore,
    channels: BTreeMap<ChannelIndex, Channel>,
    remote_channels: RemoteChannelPolicy,
}

impl Connection {
    pub fn new(config: ConnectionConfig, transport: Box<dyn PacketSender>, time: f64) -> Self {
        let enable_voice = config.enable_voice;
        let mut connection = Self {
            core: ConnectionCore::new(config, transport, time),
            channels: BTreeMap::new(),
            remote_channels: RemoteChannelPolicy::default(),
        };
        if enable_voice {
            connection.insert_channel(VOICE_CHANNEL_INDEX, ChannelType::Voice, true);
        }
        connection
    }

    // Accessors

    pub fn config(&self) -> &ConnectionConfig {
        self.core.config()
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Marks the handshake complete.
    pub fn set_open(&mut self) {
        if self.core.state() == ConnectionState::Pending {
            info!("Connection open");
            self.core.set_state(ConnectionState::Open);
        }
    }

    pub fn remote_channel_policy(&self) -> RemoteChannelPolicy {
        self.remote_channels
    }

    pub fn set_remote_channel_policy(&mut self, policy: RemoteChannelPolicy) {
        self.remote_channels = policy;
    }

    fn accepts_remote_channel(&self, ch_type: ChannelType) -> bool {
        match self.remote_channels {
            RemoteChannelPolicy::AcceptAll => true,
            RemoteChannelPolicy::ControlOnly => ch_type == ChannelType::Control,
        }
    }

    pub fn time(&self) -> f64 {
        self.core.time()
    }

    /// Advances the connection clock without ticking.
    pub fn set_time(&mut self, time: f64) {
        self.core.set_time(time);
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.core.stats
    }

    pub fn in_packet_id(&self) -> PacketId {
        self.core.in_packet_id
    }

    pub fn out_packet_id(&self) -> PacketId {
        self.core.out_packet_id
    }

    pub fn out_ack_packet_id(&self) -> PacketId {
        self.core.out_ack_packet_id
    }

    pub fn last_receive_time(&self) -> f64 {
        self.core.last_receive_time
    }

    pub fn current_net_speed(&self) -> u32 {
        self.core.current_net_speed()
    }

    pub fn queued_bits(&self) -> i64 {
        self.core.queued_bits()
    }

    pub fn security_violations(&self) -> u32 {
        self.core.security_violations
    }

    /// Byte order the peer announced in its `Hello`, once seen.
    pub fn remote_little_endian(&self) -> Option<bool> {
        self.core.remote_little_endian
    }

    pub fn max_single_bunch_size_bits(&self) -> u32 {
        self.core.max_single_bunch_size_bits()
    }

    pub fn channel(&self, ch_index: ChannelIndex) -> Option<&Channel> {
        self.channels.get(&ch_index)
    }

    pub fn channel_mut(&mut self, ch_index: ChannelIndex) -> Option<&mut Channel> {
        self.channels.get_mut(&ch_index)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Channel currently replicating `actor`, if any.
    pub fn actor_channel_index(&self, actor: ActorId) -> Option<ChannelIndex> {
        self.core.actor_channels.get(&actor).copied()
    }

    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        self.core.take_events()
    }

    pub fn set_pending_destroy(&mut self, pending_destroy: bool) {
        self.core.pending_destroy = pending_destroy;
    }

    pub fn set_use_short_connect_timeout(&mut self, value: bool) {
        self.core.use_short_connect_timeout = value;
    }

    pub fn packet_simulation(&self) -> &PacketSimulationSettings {
        self.core.simulator().settings()
    }

    pub fn set_packet_simulation(&mut self, settings: PacketSimulationSettings) {
        self.core.simulator_mut().set_settings(settings);
    }

    /// Seconds of silence after which `tick` closes the connection.
    pub fn timeout_value(&self) -> f32 {
        self.core.timeout_value()
    }

    // Bandwidth

    /// Whether the bandwidth budget allows sending more this tick.
    pub fn is_net_ready(&mut self, saturate: bool) -> bool {
        self.core.is_net_ready(saturate)
    }

    /// Like `is_net_ready`, but also false while the channel's reliable
    /// window is full.
    pub fn channel_is_net_ready(&mut self, ch_index: ChannelIndex, saturate: bool) -> bool {
        match self.channels.get(&ch_index) {
            Some(channel) => channel.is_net_ready(&mut self.core, saturate),
            None => false,
        }
    }

    // Channels

    /// Creates a locally opened channel. The control channel always takes
    /// index 0 and the voice channel its fixed index; actor channels take
    /// the lowest free index, and only once the control channel's open was
    /// acknowledged.
    pub fn create_channel(&mut self, ch_type: ChannelType) -> Result<ChannelIndex, ChannelError> {
        if self.core.is_closed() {
            return Err(ChannelError::ConnectionClosed);
        }
        let ch_index = match ch_type {
            ChannelType::Control => 0,
            ChannelType::Voice => VOICE_CHANNEL_INDEX,
            ChannelType::Actor => {
                let control_open = self
                    .channels
                    .get(&0)
                    .is_some_and(Channel::is_open_acked);
                if !control_open && !self.core.is_internal_ack() {
                    return Err(ChannelError::ControlChannelNotOpen { ch_type });
                }
                self.free_channel_index()
                    .ok_or(ChannelError::NoFreeChannel { ch_type })?
            }
        };
        if self.channels.contains_key(&ch_index) {
            return Err(ChannelError::ChannelIndexInUse { ch_index });
        }
        self.insert_channel(ch_index, ch_type, true);
        Ok(ch_index)
    }

    fn free_channel_index(&self) -> Option<ChannelIndex> {
        (1..MAX_CHANNELS).find(|index| !self.channels.contains_key(index))
    }

    fn insert_channel(&mut self, ch_index: ChannelIndex, ch_type: ChannelType, opened_locally: bool) {
        debug!(
            "creating {} channel {} (opened locally: {})",
            ch_type, ch_index, opened_locally
        );
        let channel = Channel::new(ch_index, ch_type, opened_locally, self.core.time());
        self.channels.insert(ch_index, channel);
    }

    /// Opens a channel for `actor`. The first bunch sent on it carries
    /// `guid` so the peer can resolve the actor. An actor that already has
    /// a channel keeps it.
    pub fn open_actor_channel(&mut self, actor: ActorId, guid: NetGuid) -> Result<ChannelIndex, ChannelError> {
        if let Some(ch_index) = self.actor_channel_index(actor) {
            return Ok(ch_index);
        }
        let ch_index = self.create_channel(ChannelType::Actor)?;
        if let Some(actor_channel) = self
            .channels
            .get_mut(&ch_index)
            .and_then(Channel::actor_channel_mut)
        {
            actor_channel.set_actor(actor, guid);
        }
        self.core.actor_channels.insert(actor, ch_index);
        Ok(ch_index)
    }

    /// Tells the peer to destroy an actor it has no channel for: opens an
    /// actor channel whose only bunch is a reliable close naming `guid`.
    pub fn send_actor_destruction(&mut self, guid: NetGuid) -> Result<ChannelIndex, ChannelError> {
        let ch_index = self.create_channel(ChannelType::Actor)?;
        let result = match self.channels.get_mut(&ch_index) {
            Some(channel) => {
                if let Some(actor_channel) = channel.actor_channel_mut() {
                    actor_channel.set_actor_for_destroy(guid);
                }
                channel.close(&mut self.core)
            }
            None => Err(ChannelError::NoSuchChannel { ch_index }),
        };
        self.settle();
        result.map(|_| ch_index)
    }

    /// A bunch for `ch_index`, sized to the single-bunch budget. It is
    /// already in error if the channel's reliable window is full.
    pub fn new_bunch(&self, ch_index: ChannelIndex, close: bool) -> Result<OutBunch, ChannelError> {
        let channel = self
            .channels
            .get(&ch_index)
            .ok_or(ChannelError::NoSuchChannel { ch_index })?;
        Ok(channel.new_bunch(&self.core, close))
    }

    /// Sends `bunch` on its channel. Returns the packets it went out in, or
    /// `None` if the control channel queued it.
    pub fn send_bunch(&mut self, bunch: OutBunch, merge: bool) -> Result<Option<PacketIdRange>, ChannelError> {
        let result = self.send_bunch_inner(bunch, merge);
        self.settle();
        result
    }

    fn send_bunch_inner(&mut self, bunch: OutBunch, merge: bool) -> Result<Option<PacketIdRange>, ChannelError> {
        if self.core.is_closed() {
            return Err(ChannelError::ConnectionClosed);
        }
        let ch_index = bunch.ch_index;
        let channel = self
            .channels
            .get_mut(&ch_index)
            .ok_or(ChannelError::NoSuchChannel { ch_index })?;
        if channel.ch_type() != bunch.ch_type {
            return Err(ChannelError::WrongChannelType {
                ch_index,
                expected: channel.ch_type(),
                actual: bunch.ch_type,
            });
        }
        channel.send_bunch(&mut self.core, bunch, merge)
    }

    /// Sends a reliable control message on channel 0.
    pub fn send_control_message(&mut self, message: &ControlMessage) -> Result<(), ChannelError> {
        let result = self.send_control_message_inner(message);
        self.settle();
        result
    }

    fn send_control_message_inner(&mut self, message: &ControlMessage) -> Result<(), ChannelError> {
        let mut bunch = self.new_bunch(0, false)?;
        bunch.flags.reliable = true;
        message.write(&mut bunch);
        trace!("sending control message {:?}", message);
        self.send_bunch_inner(bunch, true).map(|_| ())
    }

    /// Opens the control channel and sends `Hello`.
    pub fn begin_handshake(&mut self) -> Result<(), ChannelError> {
        self.create_channel(ChannelType::Control)?;
        let hello = ControlMessage::Hello {
            little_endian: cfg!(target_endian = "little"),
            network_version: self.core.config().network_version,
        };
        self.send_control_message(&hello)
    }

    /// Sends unreliable voice data on the voice channel.
    pub fn send_voice_packet(&mut self, payload: &[u8], num_bits: u32) -> Result<Option<PacketIdRange>, ChannelError> {
        let mut bunch = self.new_bunch(VOICE_CHANNEL_INDEX, false)?;
        bunch.write_bits(payload, num_bits);
        self.send_bunch(bunch, false)
    }

    /// Sends a reliable close bunch on `ch_index`. The channel goes away once
    /// the close is acknowledged.
    pub fn close_channel(&mut self, ch_index: ChannelIndex) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(&ch_index)
            .ok_or(ChannelError::NoSuchChannel { ch_index })?;
        let result = channel.close(&mut self.core);
        self.settle();
        result
    }

    /// Marks the actor's channel to close for dormancy once its reliable data
    /// is acknowledged.
    pub fn start_becoming_dormant(&mut self, actor: ActorId) -> bool {
        let Some(channel) = self
            .actor_channel_index(actor)
            .and_then(|ch_index| self.channels.get_mut(&ch_index))
        else {
            return false;
        };
        channel.start_becoming_dormant();
        true
    }

    /// Cancels a pending dormancy close of the actor's channel. Returns
    /// whether the actor still has a channel.
    pub fn flush_dormancy(&mut self, actor: ActorId) -> bool {
        let Some(channel) = self
            .actor_channel_index(actor)
            .and_then(|ch_index| self.channels.get_mut(&ch_index))
        else {
            return false;
        };
        channel.cancel_dormancy();
        true
    }

    /// Closes the control channel and the connection. Nothing is sent once
    /// closed.
    pub fn close(&mut self) {
        self.close_inner();
        self.settle();
    }

    fn close_inner(&mut self) {
        if self.core.is_closed() {
            return;
        }
        info!("Closing connection");
        if let Some(control) = self.channels.get_mut(&0) {
            if let Err(err) = control.close(&mut self.core) {
                debug!("Could not send the control channel close: {}", err);
            }
        }
        self.core.set_state(ConnectionState::Closed);
        self.core.flush_net(false);
        self.core.push_event(ConnectionEvent::Closed);
    }

    pub fn flush_net(&mut self) {
        self.core.flush_net(false);
    }

    // Deferred work

    fn sweep_channels(&mut self) {
        self.channels.retain(|_, channel| !channel.is_cleaned_up());
    }

    fn process_close_request(&mut self) {
        let Some(request) = self.core.take_close_request() else {
            return;
        };
        if self.core.is_closed() {
            return;
        }
        if let Some(reason) = request.failure {
            warn!("Closing connection: {}", reason);
            let failure = ControlMessage::Failure { reason };
            if let Err(err) = self.send_control_message_inner(&failure) {
                debug!("Could not send the failure message: {}", err);
            }
            self.core.flush_net(true);
        }
        self.close_inner();
    }

    fn settle(&mut self) {
        self.sweep_channels();
        self.process_close_request();
        self.sweep_channels();
    }

    // Receiving

    /// Processes one packet handed up by the transport.
    pub fn received_raw_packet(&mut self, data: &[u8]) {
        self.core
            .stats
            .record_received(data.len() as u32 + PACKET_OVERHEAD);

        let Some(&last_byte) = data.last() else {
            self.security_violation(PacketError::EmptyPacket);
            self.settle();
            return;
        };
        if last_byte == 0 {
            self.security_violation(PacketError::MissingTerminationBit {
                num_bytes: data.len(),
            });
            self.settle();
            return;
        }

        // the highest set bit of the last byte terminates the packet
        let num_bits = (data.len() as u32 - 1) * 8 + (7 - last_byte.leading_zeros());
        let mut reader = BitReader::with_bits(data, num_bits);
        self.received_packet(&mut reader);
        self.settle();
    }

    fn security_violation(&mut self, err: PacketError) {
        let event = err.security_event();
        warn!(target: "security", "{}: {}", event, err);
        self.core.security_violations += 1;
        let threshold = self.core.config().security_violation_close_threshold;
        if self.core.security_violations >= threshold && !self.core.is_closed() {
            warn!(
                target: "security",
                "{}: {} violations, closing connection",
                SecurityEvent::Closed,
                self.core.security_violations
            );
            self.close_inner();
        }
    }

    fn received_packet(&mut self, reader: &mut BitReader) {
        self.core.last_receive_time = self.core.time();

        let packet_id = if self.core.is_internal_ack() {
            self.core.in_packet_id + 1
        } else {
            match reader.read_int(MAX_PACKETID) {
                Ok(wrapped) => make_relative(wrapped as i32, self.core.in_packet_id, MAX_PACKETID),
                Err(err) => {
                    self.security_violation(PacketError::Truncated(err));
                    return;
                }
            }
        };

        if packet_id > self.core.in_packet_id {
            let lost = packet_id - self.core.in_packet_id - 1;
            if lost > 0 {
                debug!("{} incoming packets lost before {}", lost, packet_id);
                self.core.stats.in_packets_lost += lost as u32;
            }
            self.core.in_packet_id = packet_id;
        } else {
            debug!(
                "dropping packet {} (already processed up to {})",
                packet_id, self.core.in_packet_id
            );
            self.core.stats.in_packets_out_of_order += 1;
            return;
        }

        let mut skip_ack = false;
        while !reader.at_end() && !self.core.is_closed() {
            let is_ack = match reader.read_bit() {
                Ok(bit) => bit,
                Err(err) => {
                    self.security_violation(PacketError::Truncated(err));
                    return;
                }
            };

            if is_ack {
                if let Err(err) = self.received_ack_entry(reader) {
                    self.security_violation(err);
                    return;
                }
                continue;
            }

            match self.received_bunch_entry(reader, packet_id) {
                Ok(BunchFlow::Continue { skip_ack: skip }) => skip_ack |= skip,
                Ok(BunchFlow::Stop) => return,
                Err(err) => {
                    self.security_violation(err);
                    return;
                }
            }
        }

        if !skip_ack {
            self.core.send_ack(packet_id, true);
        }
    }

    fn received_ack_entry(&mut self, reader: &mut BitReader) -> Result<(), PacketError> {
        let wrapped = reader.read_int(MAX_PACKETID)?;
        let ack_packet_id = make_relative(wrapped as i32, self.core.out_ack_packet_id, MAX_PACKETID);
        let remote_frame_ms = if reader.read_bit()? { reader.read_byte()? } else { 0 };
        let remote_in_kbytes = reader.read_int_packed()?;

        if ack_packet_id > self.core.out_ack_packet_id {
            for nak_packet_id in self.core.out_ack_packet_id + 1..ack_packet_id {
                self.core.stats.out_packets_lost += 1;
                self.received_nak(nak_packet_id);
            }
            self.core.out_ack_packet_id = ack_packet_id;
        }

        self.core
            .record_ack(ack_packet_id, remote_in_kbytes, remote_frame_ms);

        for channel in self.channels.values_mut().rev() {
            channel.received_ack(&mut self.core, ack_packet_id);
        }
        self.sweep_channels();
        Ok(())
    }

    /// A packet was lost: resend its reliable bunches.
    fn received_nak(&mut self, nak_packet_id: PacketId) {
        trace!("nak for packet {}", nak_packet_id);
        for channel in self.channels.values_mut().rev() {
            channel.received_nak(&mut self.core, nak_packet_id);
            let open_lost = channel
                .open_packet_id()
                .is_some_and(|range| range.in_range(nak_packet_id));
            if open_lost {
                channel.received_acks(&mut self.core);
            }
        }
        self.sweep_channels();
    }

    fn received_bunch_entry(&mut self, reader: &mut BitReader, packet_id: PacketId) -> Result<BunchFlow, PacketError> {
        let header = BunchHeader::read(
            reader,
            self.core.is_internal_ack(),
            self.core.max_packet_bits(),
        )?;
        let ch_index = header.ch_index;
        let flags = header.flags;

        let in_reliable = self.core.in_reliable(ch_index);
        let ch_sequence = if flags.reliable {
            match header.wrapped_sequence {
                Some(wrapped) => make_relative(wrapped as i32, in_reliable, MAX_CHSEQUENCE),
                None => in_reliable + 1,
            }
        } else if flags.partial {
            packet_id
        } else {
            0
        };

        if header.payload_bits > reader.bits_left() {
            return Err(PacketError::BunchDataOverflow {
                ch_index,
                payload_bits: header.payload_bits,
                bits_left: reader.bits_left(),
            });
        }
        let data = reader.read_bits(header.payload_bits)?;

        if self.remote_channels == RemoteChannelPolicy::ControlOnly
            && ch_index != 0
            && self.core.state() != ConnectionState::Open
        {
            return Err(PacketError::BunchBeforeOpen { ch_index });
        }

        let exists = self.channels.contains_key(&ch_index);
        let names_control = ch_index == 0 && header.ch_type == Some(ChannelType::Control.to_wire());

        if !exists && !names_control && !self.channels.contains_key(&0) {
            info!(
                "Received a bunch for channel {} before the control channel was created, closing",
                ch_index
            );
            self.close_inner();
            return Ok(BunchFlow::Stop);
        }
        if !exists && names_control && flags.close {
            info!("Received a control channel close before its open, closing");
            self.close_inner();
            return Ok(BunchFlow::Stop);
        }

        if flags.reliable && ch_sequence <= in_reliable {
            trace!(
                "outdated bunch on channel {} (sequence {}, processed up to {})",
                ch_index,
                ch_sequence,
                in_reliable
            );
            return Ok(BunchFlow::Continue { skip_ack: false });
        }

        if !exists && !flags.reliable && !(flags.open && (flags.close || flags.partial)) {
            debug!(
                "unreliable bunch on unopened channel {}, not acking packet {}",
                ch_index, packet_id
            );
            return Ok(BunchFlow::Continue { skip_ack: true });
        }

        let ch_type = match header.ch_type {
            Some(raw) => Some(
                ChannelType::from_wire(raw)
                    .ok_or(PacketError::UnknownChannelType { ch_index, ch_type: raw })?,
            ),
            None => None,
        };

        match self.channels.get(&ch_index) {
            Some(channel) => {
                if let Some(ch_type) = ch_type {
                    if ch_type != channel.ch_type() {
                        return Err(PacketError::ChannelTypeMismatch {
                            ch_index,
                            ch_type: ch_type.to_wire(),
                            established: channel.ch_type().to_wire(),
                        });
                    }
                }
            }
            None => {
                let Some(ch_type) = ch_type else {
                    return Err(PacketError::UnknownChannelType { ch_index, ch_type: 0 });
                };
                if (ch_index == 0) != (ch_type == ChannelType::Control) {
                    return Err(PacketError::ChannelTypeMismatch {
                        ch_index,
                        ch_type: ch_type.to_wire(),
                        established: ChannelType::Control.to_wire(),
                    });
                }
                if !self.accepts_remote_channel(ch_type) {
                    warn!(
                        target: "security",
                        "{}: refused {} channel {} opened by the peer",
                        SecurityEvent::InvalidData,
                        ch_type,
                        ch_index
                    );
                    return Ok(BunchFlow::Continue { skip_ack: true });
                }
                self.insert_channel(ch_index, ch_type, false);
                self.core
                    .push_event(ConnectionEvent::ChannelOpened { ch_index, ch_type });
            }
        }

        let bunch = InBunch::new(
            packet_id,
            ch_index,
            ch_type,
            ch_sequence,
            flags,
            data,
            header.payload_bits,
        );

        let Some(channel) = self.channels.get_mut(&ch_index) else {
            return Ok(BunchFlow::Continue { skip_ack: false });
        };
        match channel.received_raw_bunch(&mut self.core, bunch) {
            Ok(outcome) => {
                if outcome.cleaned_up {
                    self.channels.remove(&ch_index);
                }
                Ok(BunchFlow::Continue {
                    skip_ack: outcome.skip_ack,
                })
            }
            Err(err) => {
                error!("Corrupt bunch on channel {}: {}, closing", ch_index, err);
                self.close_inner();
                Ok(BunchFlow::Continue { skip_ack: true })
            }
        }
    }

    // Ticking

    /// Advances the connection to `time`: acks everything in internal-ack
    /// mode, updates statistics, enforces the timeout, ticks the channels,
    /// flushes time-sensitive data and drains the bandwidth budget.
    pub fn tick(&mut self, time: f64) {
        let delta = (time - self.core.last_tick_time).max(0.0);
        self.core.set_time(time);
        self.core.set_frame_delta(delta);
        self.core.last_tick_time = time;

        self.core.send_delayed_packets();
        if self.core.is_closed() {
            return;
        }

        if self.core.is_internal_ack() {
            self.core.out_ack_packet_id = self.core.out_packet_id;
            self.core.last_receive_time = time;
            for channel in self.channels.values_mut().rev() {
                channel.ack_all(&mut self.core);
            }
            self.sweep_channels();
        }

        let stat_period = self.core.config().stat_period;
        self.core.stats.update(time, stat_period);

        let silence = time - self.core.last_receive_time;
        let timeout = f64::from(self.core.timeout_value());
        if silence > timeout {
            warn!(
                "Connection timed out after {:.2} seconds without traffic (limit {:.2})",
                silence, timeout
            );
            self.close_inner();
            self.settle();
            return;
        }

        for channel in self.channels.values_mut() {
            channel.tick(&mut self.core);
        }
        self.settle();

        let control_used = self.core.out_reliable(0) != 0 || self.core.in_reliable(0) != 0;
        if !self.core.is_closed() && !self.channels.contains_key(&0) && control_used {
            info!("Control channel is gone, connection closed");
            self.core.set_state(ConnectionState::Closed);
            self.core.push_event(ConnectionEvent::Closed);
            return;
        }

        self.core.purge_acks();
        if self.core.should_flush() {
            self.core.flush_net(false);
        }
        self.core.drain_queued_bits(delta);
    }
}
