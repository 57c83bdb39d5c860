use std::collections::BTreeMap;

use log::{debug, error, info, trace, warn};

use repnet_serde::BitWrite;

use crate::{
    bunch::{InBunch, OutBunch},
    channel::{
        actor_channel::ActorChannel, control_channel::ControlChannel, reliable_ring::ReliableRing,
        voice_channel::VoiceChannel, ChannelError, ChannelType,
    },
    connection::{ConnectionCore, ConnectionEvent},
    constants::{
        CONTROL_MAX_RESEND_BATCH, CONTROL_RESEND_INTERVAL, MAX_CONSTRUCTED_PARTIAL_SIZE_IN_BYTES,
        RELIABLE_BUFFER,
    },
    types::{ActorId, ChannelIndex, ChannelSequence, ConnectionState, PacketId, PacketIdRange},
};

/// Per-type payload handling of a channel.
pub enum ChannelKind {
    Control(ControlChannel),
    Actor(ActorChannel),
    Voice(VoiceChannel),
}

impl ChannelKind {
    fn new(ch_type: ChannelType, opened_locally: bool, time: f64) -> Self {
        match ch_type {
            ChannelType::Control => ChannelKind::Control(ControlChannel::new(opened_locally)),
            ChannelType::Actor => ChannelKind::Actor(ActorChannel::new(time)),
            ChannelType::Voice => ChannelKind::Voice(VoiceChannel),
        }
    }

    pub fn ch_type(&self) -> ChannelType {
        match self {
            ChannelKind::Control(_) => ChannelType::Control,
            ChannelKind::Actor(_) => ChannelType::Actor,
            ChannelKind::Voice(_) => ChannelType::Voice,
        }
    }
}

/// What the connection must do after a channel processed a received bunch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct BunchOutcome {
    /// Do not ack the packet, so the peer resends its reliable content.
    pub skip_ack: bool,
    /// The channel cleaned itself up and must leave the channel table.
    pub cleaned_up: bool,
}

impl BunchOutcome {
    fn skip_ack() -> Self {
        Self {
            skip_ack: true,
            cleaned_up: false,
        }
    }

    fn cleaned_up() -> Self {
        Self {
            skip_ack: false,
            cleaned_up: true,
        }
    }
}

/// A logical stream within a connection. Owns the reliability bookkeeping of
/// its bunches: the window of unacknowledged outgoing reliable bunches,
/// incoming reliable bunches that arrived ahead of sequence, and the partial
/// bunch being reassembled.
pub struct Channel {
    index: ChannelIndex,
    kind: ChannelKind,
    opened_locally: bool,
    /// Packets the open bunch went out in (or arrived in).
    pub(crate) open_packet_id: Option<PacketIdRange>,
    pub(crate) open_acked: bool,
    /// Opened by an unreliable bunch; goes away once the open is acked.
    open_temporary: bool,
    closing: bool,
    dormant: bool,
    pending_dormancy: bool,
    broken: bool,
    paused_until_reliable_ack: bool,
    cleaned_up: bool,
    pub(crate) out_rec: ReliableRing<OutBunch>,
    in_rec: BTreeMap<ChannelSequence, InBunch>,
    in_partial: Option<InBunch>,
}

impl Channel {
    pub(crate) fn new(index: ChannelIndex, ch_type: ChannelType, opened_locally: bool, time: f64) -> Self {
        Self {
            index,
            kind: ChannelKind::new(ch_type, opened_locally, time),
            opened_locally,
            open_packet_id: None,
            open_acked: false,
            open_temporary: false,
            closing: false,
            dormant: false,
            pending_dormancy: false,
            broken: false,
            paused_until_reliable_ack: false,
            cleaned_up: false,
            out_rec: ReliableRing::new(),
            in_rec: BTreeMap::new(),
            in_partial: None,
        }
    }

    // Accessors

    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    pub fn ch_type(&self) -> ChannelType {
        self.kind.ch_type()
    }

    pub fn kind(&self) -> &ChannelKind {
        &self.kind
    }

    pub fn actor_channel(&self) -> Option<&ActorChannel> {
        match &self.kind {
            ChannelKind::Actor(actor) => Some(actor),
            _ => None,
        }
    }

    pub fn actor_channel_mut(&mut self) -> Option<&mut ActorChannel> {
        match &mut self.kind {
            ChannelKind::Actor(actor) => Some(actor),
            _ => None,
        }
    }

    pub fn actor(&self) -> Option<ActorId> {
        self.actor_channel().and_then(ActorChannel::actor)
    }

    pub fn is_opened_locally(&self) -> bool {
        self.opened_locally
    }

    pub fn is_open_acked(&self) -> bool {
        self.open_acked
    }

    pub fn open_packet_id(&self) -> Option<PacketIdRange> {
        self.open_packet_id
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    pub fn is_pending_dormancy(&self) -> bool {
        self.pending_dormancy
    }

    /// Marks the channel to close for dormancy once all its reliable data is
    /// acknowledged.
    pub fn start_becoming_dormant(&mut self) {
        self.pending_dormancy = true;
    }

    /// Cancels a pending dormancy close.
    pub fn cancel_dormancy(&mut self) {
        self.pending_dormancy = false;
        self.dormant = false;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn is_cleaned_up(&self) -> bool {
        self.cleaned_up
    }

    pub fn num_out_rec(&self) -> usize {
        self.out_rec.len()
    }

    pub fn num_in_rec(&self) -> usize {
        self.in_rec.len()
    }

    pub fn has_partial_bunch(&self) -> bool {
        self.in_partial.is_some()
    }

    /// Whether replication may proceed. A channel that promoted a large
    /// bunch to reliable stays paused until every reliable bunch is acked.
    pub fn poll_replication_pause(&mut self) -> bool {
        if self.paused_until_reliable_ack {
            if !self.out_rec.is_empty() {
                return false;
            }
            self.paused_until_reliable_ack = false;
        }
        true
    }

    pub fn is_paused_until_reliable_ack(&self) -> bool {
        self.paused_until_reliable_ack
    }

    pub(crate) fn is_net_ready(&self, core: &mut ConnectionCore, saturate: bool) -> bool {
        if self.out_rec.len() >= RELIABLE_BUFFER - 1 {
            return false;
        }
        core.is_net_ready(saturate)
    }

    // Sending

    /// New outgoing bunch sized to the connection's single-bunch budget.
    /// Already overflowed if the reliable window cannot take another bunch;
    /// control bunches are exempt, they queue instead.
    pub(crate) fn new_bunch(&self, core: &ConnectionCore, close: bool) -> OutBunch {
        let mut bunch = OutBunch::new(self.index, self.ch_type(), core.max_single_bunch_size_bits());
        bunch.flags.close = close;
        let window_full = self.out_rec.len() >= RELIABLE_BUFFER - 1 + usize::from(close);
        if window_full && self.ch_type() != ChannelType::Control {
            bunch.set_error();
        }
        bunch
    }

    /// Sends `bunch`. Returns the packets it went out in, or `None` if the
    /// control channel queued it behind earlier messages.
    pub(crate) fn send_bunch(
        &mut self,
        core: &mut ConnectionCore,
        bunch: OutBunch,
        merge: bool,
    ) -> Result<Option<PacketIdRange>, ChannelError> {
        if let ChannelKind::Control(control) = &mut self.kind {
            if control.should_queue(self.out_rec.len(), bunch.flags.close) {
                control.queue(core, &bunch)?;
                return Ok(None);
            }
        }
        if bunch.is_error() {
            if self.ch_type() == ChannelType::Control {
                error!("Control channel bunch overflowed, closing connection");
                core.request_close(None);
            }
            return Err(ChannelError::BunchOverflowed {
                ch_index: self.index,
                max_bits: bunch.max_bits(),
            });
        }
        self.send_sequenced(core, bunch, merge).map(Some)
    }

    fn send_sequenced(
        &mut self,
        core: &mut ConnectionCore,
        mut bunch: OutBunch,
        mut merge: bool,
    ) -> Result<PacketIdRange, ChannelError> {
        let ch_index = self.index;
        if self.closing {
            return Err(ChannelError::ChannelClosing { ch_index });
        }

        if self.open_packet_id.is_none() && self.opened_locally {
            bunch.flags.open = true;
            // the voice channel lives as long as the connection
            self.open_temporary = !bunch.flags.reliable && self.ch_type() != ChannelType::Voice;
            if let ChannelKind::Actor(actor) = &self.kind {
                bunch = actor.with_open_header(bunch);
            }
        }

        if self.open_temporary && bunch.flags.reliable {
            error!("Reliable bunch on net-temporary channel {}", ch_index);
            return Err(ChannelError::ReliableOnTemporaryChannel { ch_index });
        }

        let max_single_bits = core.max_single_bunch_size_bits();
        let max_partial_bits = (max_single_bits / 8 * 8).max(8);

        // Section: fold into the previous bunch

        let mut merged_sequence = None;
        if merge && core.can_merge(ch_index, bunch.num_bits(), max_single_bits) {
            if let Some((mut last_out, queued)) = core.take_last_out() {
                last_out.write_bits(bunch.data(), bunch.num_bits());
                last_out.flags.reliable |= bunch.flags.reliable;
                last_out.flags.open |= bunch.flags.open;
                last_out.flags.close |= bunch.flags.close;
                if queued {
                    merged_sequence = Some(last_out.ch_sequence);
                }
                core.pop_last_start();
                trace!(
                    "merged {} bits into previous bunch on channel {}",
                    bunch.num_bits(),
                    ch_index
                );
                bunch = last_out;
            }
        }

        // Section: split into partials

        let mut master = bunch.flags;
        let fragments = if bunch.num_bits() > max_single_bits {
            merge = false;
            let total_bits = bunch.num_bits();
            let mut fragments = Vec::new();
            let mut offset = 0;
            while offset < total_bits {
                let num_bits = (total_bits - offset).min(max_partial_bits);
                let start = (offset / 8) as usize;
                fragments.push(bunch.fragment(&bunch.data()[start..], num_bits, max_single_bits));
                offset += num_bits;
            }
            debug!(
                "split {} bits on channel {} into {} partial bunches",
                total_bits,
                ch_index,
                fragments.len()
            );
            fragments
        } else {
            vec![bunch]
        };

        let num_new = fragments.len();
        let overflows_reliable =
            self.out_rec.len() + num_new >= RELIABLE_BUFFER + usize::from(master.close);

        let threshold = core.config().partial_bunch_reliable_threshold;
        if threshold > 0 && num_new >= threshold && !core.is_internal_ack() && !self.open_temporary {
            if !overflows_reliable {
                debug!(
                    "sending {} partial bunches on channel {} reliably",
                    num_new, ch_index
                );
                master.reliable = true;
                self.paused_until_reliable_ack = true;
            } else {
                warn!(
                    "Too many partial bunches on channel {} to send reliably ({} unacked, {} new)",
                    ch_index,
                    self.out_rec.len(),
                    num_new
                );
            }
        }

        if master.reliable && overflows_reliable {
            warn!(
                "Outgoing reliable buffer overflow on channel {} ({} unacked, {} new)",
                ch_index,
                self.out_rec.len(),
                num_new
            );
            core.request_close(Some("Outgoing reliable buffer overflow".to_string()));
            return Err(ChannelError::ReliableBufferOverflow {
                ch_index,
                num_out_rec: self.out_rec.len(),
                num_new,
            });
        }

        // Section: write each bunch

        let mut range: Option<PacketIdRange> = None;
        let last_index = num_new - 1;
        for (index, mut next) in fragments.into_iter().enumerate() {
            next.flags.reliable = master.reliable;
            next.flags.open = master.open;
            next.flags.close = master.close;
            next.flags.dormant = master.dormant;
            next.flags.is_replication_paused = master.is_replication_paused;
            next.flags.has_must_be_mapped_guids = master.has_must_be_mapped_guids;
            next.flags.has_package_map_exports = master.has_package_map_exports;
            if num_new > 1 {
                next.flags.partial = true;
                next.flags.partial_initial = index == 0;
                next.flags.partial_final = index == last_index;
                next.flags.open &= index == 0;
                next.flags.close &= index == last_index;
            }

            let queued = next.flags.reliable;
            if queued {
                next.ch_sequence = match merged_sequence {
                    Some(sequence) if self.out_rec.get(sequence).is_some() => sequence,
                    _ => core.next_out_reliable(ch_index),
                };
            }

            next.received_ack = false;
            let packet_id = core.send_raw_bunch(&mut next, merge);

            if queued {
                match self.out_rec.get_mut(next.ch_sequence) {
                    Some(slot) => *slot = next.clone(),
                    None => {
                        if self.out_rec.push_back(next.ch_sequence, next.clone()).is_err() {
                            error!(
                                "Reliable window of channel {} rejected sequence {}",
                                ch_index, next.ch_sequence
                            );
                        }
                    }
                }
            }

            if self.open_packet_id.is_none() && self.opened_locally {
                self.open_packet_id = Some(PacketIdRange::single(packet_id));
            }
            if next.flags.close {
                self.set_closing_flag(core);
            }

            range = Some(match range {
                None => PacketIdRange::single(packet_id),
                Some(range) => PacketIdRange {
                    first: range.first,
                    last: packet_id,
                },
            });
            core.remember_last_out(&next, queued);
        }

        let range = range.unwrap_or(PacketIdRange::single(core.out_packet_id));
        if master.open {
            self.open_packet_id = Some(range);
        }
        if !master.reliable {
            if let ChannelKind::Actor(actor) = &mut self.kind {
                actor.record_unreliable_send(range);
            }
        }
        Ok(range)
    }

    fn set_closing_flag(&mut self, core: &mut ConnectionCore) {
        self.closing = true;
        self.forget_actor(core);
    }

    fn forget_actor(&self, core: &mut ConnectionCore) {
        if let Some(actor) = self.actor() {
            if core.actor_channels.get(&actor) == Some(&self.index) {
                core.actor_channels.remove(&actor);
            }
        }
    }

    /// Sends a reliable close bunch, unless already closing.
    pub(crate) fn close(&mut self, core: &mut ConnectionCore) -> Result<(), ChannelError> {
        let state = core.state();
        if self.closing || !matches!(state, ConnectionState::Open | ConnectionState::Pending) {
            return Ok(());
        }
        let mut bunch = self.new_bunch(core, true);
        bunch.flags.reliable = true;
        bunch.flags.dormant = self.dormant;
        self.send_bunch(core, bunch, false)?;
        Ok(())
    }

    fn become_dormant(&mut self, core: &mut ConnectionCore) {
        self.pending_dormancy = false;
        self.dormant = true;
        if let Some(actor) = self.actor() {
            debug!("{} going dormant on channel {}", actor, self.index);
            core.push_event(ConnectionEvent::ActorDormant {
                ch_index: self.index,
                actor,
            });
        }
        if let Err(err) = self.close(core) {
            warn!("Failed to close channel {} for dormancy: {}", self.index, err);
        }
    }

    // Ticking

    pub(crate) fn tick(&mut self, core: &mut ConnectionCore) {
        if self.pending_dormancy && self.out_rec.is_empty() && !self.closing {
            self.become_dormant(core);
        }
        if let ChannelKind::Control(_) = self.kind {
            self.tick_control(core);
        }
    }

    fn tick_control(&mut self, core: &mut ConnectionCore) {
        if !self.open_acked {
            let unacked = self.out_rec.iter().filter(|out| !out.received_ack).count();
            if unacked > CONTROL_MAX_RESEND_BATCH {
                return;
            }
            for out in self.out_rec.iter_mut() {
                if !out.received_ack && core.time() - out.time > CONTROL_RESEND_INTERVAL {
                    debug!(
                        "Channel {} ack timeout, resending {}",
                        self.index, out.ch_sequence
                    );
                    core.send_raw_bunch(out, false);
                }
            }
            return;
        }

        while !self.closing {
            let ChannelKind::Control(control) = &mut self.kind else {
                return;
            };
            let Some(message) = control.pop_queued() else {
                return;
            };

            let mut bunch = self.new_bunch(core, false);
            if self.out_rec.len() >= RELIABLE_BUFFER - 1 {
                if let ChannelKind::Control(control) = &mut self.kind {
                    control.requeue_front(message);
                }
                return;
            }
            bunch.flags.reliable = true;
            bunch.write_bits(&message.data, message.num_bits);
            if bunch.is_error() {
                error!("Queued control message does not fit a bunch, closing connection");
                core.request_close(None);
                return;
            }
            if let Err(err) = self.send_sequenced(core, bunch, true) {
                warn!("Failed to send queued control message: {}", err);
                return;
            }
        }
    }

    // Acks

    /// Applies an ack for `ack_packet_id` to the bunches of this channel.
    pub(crate) fn received_ack(&mut self, core: &mut ConnectionCore, ack_packet_id: PacketId) {
        if self.open_packet_id.map(|range| range.last) == Some(ack_packet_id) {
            self.open_acked = true;
        }
        for out in self.out_rec.iter_mut() {
            if out.flags.open {
                // a reliable open is acked in `received_acks`, once every partial of it is
                self.open_acked = false;
            }
            if out.packet_id == ack_packet_id {
                out.received_ack = true;
            }
        }
        if let ChannelKind::Actor(actor) = &mut self.kind {
            actor.prune_unreliable_sends(core.out_ack_packet_id);
        }
        self.received_acks(core);
    }

    /// Every unacked bunch sent in the internal-ack mode counts as acked.
    pub(crate) fn ack_all(&mut self, core: &mut ConnectionCore) {
        for out in self.out_rec.iter_mut() {
            out.received_ack = true;
        }
        if self.opened_locally {
            self.open_acked = true;
        }
        self.received_acks(core);
    }

    /// Retires acknowledged reliable bunches from the front of the window.
    pub(crate) fn received_acks(&mut self, core: &mut ConnectionCore) {
        let mut do_close = false;
        while let Some(front) = self.out_rec.front() {
            if !front.received_ack {
                break;
            }
            if front.flags.open {
                let mut open_finished = true;
                if front.flags.partial {
                    for out in self.out_rec.iter() {
                        if !out.received_ack {
                            open_finished = false;
                            break;
                        }
                        if out.flags.partial_final {
                            break;
                        }
                    }
                }
                if !open_finished {
                    break;
                }
                self.open_acked = true;
            }
            if let Some(released) = self.out_rec.pop_front() {
                do_close |= released.flags.close;
            }
        }

        if do_close || (self.open_temporary && self.open_acked) {
            self.clean_up(core);
        }
    }

    /// Resends the reliable bunches that went out in a lost packet.
    pub(crate) fn received_nak(&mut self, core: &mut ConnectionCore, nak_packet_id: PacketId) {
        for out in self.out_rec.iter_mut() {
            if out.packet_id == nak_packet_id && !out.received_ack {
                debug!(
                    "Channel {} nak, resending {} (packet {})",
                    self.index, out.ch_sequence, nak_packet_id
                );
                core.send_raw_bunch(out, false);
            }
        }
        if let ChannelKind::Actor(actor) = &mut self.kind {
            actor.received_nak(core, nak_packet_id);
        }
    }

    /// Frees every buffered bunch and flags the channel for removal from the
    /// channel table. Cleaning up the control channel closes the connection.
    pub(crate) fn clean_up(&mut self, core: &mut ConnectionCore) {
        if self.cleaned_up {
            return;
        }
        if self.index == 0 && !self.closing {
            info!("Control channel closed by the peer, closing connection");
            core.request_close(None);
        }
        self.forget_actor(core);
        self.out_rec.clear();
        self.in_rec.clear();
        self.in_partial = None;
        self.cleaned_up = true;
        core.push_event(ConnectionEvent::ChannelCleanedUp {
            ch_index: self.index,
            ch_type: self.ch_type(),
            actor: self.actor(),
            dormant: self.dormant,
        });
    }

    // Receiving

    /// Accepts a bunch parsed out of a packet. Reliable bunches that arrive
    /// ahead of sequence are held until the gap is filled.
    pub(crate) fn received_raw_bunch(
        &mut self,
        core: &mut ConnectionCore,
        bunch: InBunch,
    ) -> Result<BunchOutcome, ChannelError> {
        if core.is_internal_ack() && self.broken {
            return Ok(BunchOutcome::default());
        }

        let ch_index = self.index;
        if bunch.flags.reliable && bunch.ch_sequence != core.in_reliable(ch_index) + 1 {
            if self.in_rec.contains_key(&bunch.ch_sequence) {
                trace!("duplicate queued bunch {} on channel {}", bunch.ch_sequence, ch_index);
                return Ok(BunchOutcome::default());
            }
            trace!(
                "queuing bunch {} on channel {} (waiting for {})",
                bunch.ch_sequence,
                ch_index,
                core.in_reliable(ch_index) + 1
            );
            self.in_rec.insert(bunch.ch_sequence, bunch);
            if self.in_rec.len() >= RELIABLE_BUFFER {
                error!("Too many queued reliable bunches on channel {}", ch_index);
                return Err(ChannelError::TooManyQueuedBunches {
                    ch_index,
                    expected: core.in_reliable(ch_index) + 1,
                });
            }
            return Ok(BunchOutcome::default());
        }

        let mut outcome = self.received_next_bunch(core, bunch)?;
        if outcome.cleaned_up {
            return Ok(outcome);
        }

        // deliver whatever the new bunch unblocked
        while let Some(entry) = self.in_rec.first_entry() {
            if *entry.key() != core.in_reliable(ch_index) + 1 {
                break;
            }
            let queued = entry.remove();
            let drained = self.received_next_bunch(core, queued)?;
            if drained.skip_ack {
                warn!("Queued bunch on channel {} asked to skip an ack already sent", ch_index);
            }
            if drained.cleaned_up {
                outcome.cleaned_up = true;
                return Ok(outcome);
            }
        }
        Ok(outcome)
    }

    fn received_next_bunch(
        &mut self,
        core: &mut ConnectionCore,
        bunch: InBunch,
    ) -> Result<BunchOutcome, ChannelError> {
        let ch_index = self.index;
        if bunch.flags.reliable {
            core.set_in_reliable(ch_index, bunch.ch_sequence);
        }

        let last_packet_id = bunch.packet_id;
        let handle = if bunch.flags.partial {
            match self.merge_partial(core, bunch)? {
                PartialProgress::Complete(handle) => handle,
                PartialProgress::Pending => return Ok(BunchOutcome::default()),
                PartialProgress::Rejected => return Ok(BunchOutcome::skip_ack()),
            }
        } else {
            bunch
        };

        let is_voice = self.ch_type() == ChannelType::Voice;
        if handle.flags.open {
            if !is_voice && self.opened_locally {
                return Err(ChannelError::OpenOnLocalChannel { ch_index });
            }
            self.open_packet_id = Some(PacketIdRange {
                first: handle.packet_id,
                last: last_packet_id,
            });
            self.open_acked = true;
        }

        if !is_voice && !self.opened_locally && !self.open_acked {
            if handle.flags.reliable {
                error!("Reliable bunch before open on channel {}", ch_index);
                return Err(ChannelError::ReliableBeforeOpen { ch_index });
            }
            if core.is_internal_ack() {
                self.broken = true;
                return Ok(BunchOutcome::default());
            }
            debug!("Unreliable bunch before open on channel {}, not acking", ch_index);
            return Ok(BunchOutcome::skip_ack());
        }

        self.received_sequenced_bunch(core, handle)
    }

    fn merge_partial(
        &mut self,
        core: &mut ConnectionCore,
        bunch: InBunch,
    ) -> Result<PartialProgress, ChannelError> {
        let ch_index = self.index;

        if bunch.flags.partial_initial {
            if let Some(existing) = &self.in_partial {
                if !existing.flags.partial_final && existing.flags.reliable {
                    warn!(
                        "Unreliable partial on channel {} trying to replace an unfinished reliable partial",
                        ch_index
                    );
                    return Ok(PartialProgress::Rejected);
                }
            }
            self.in_partial = Some(bunch);
        } else {
            let matches = self.in_partial.as_ref().is_some_and(|partial| {
                let reliable_matches = bunch.ch_sequence == partial.ch_sequence + 1;
                let sequence_matches = if partial.flags.reliable {
                    reliable_matches
                } else {
                    reliable_matches || bunch.ch_sequence == partial.ch_sequence
                };
                !partial.flags.partial_final
                    && sequence_matches
                    && partial.flags.reliable == bunch.flags.reliable
            });

            if !matches {
                if self
                    .in_partial
                    .as_ref()
                    .is_some_and(|partial| partial.flags.reliable)
                {
                    warn!(
                        "Unreliable partial on channel {} trying to replace a reliable partial",
                        ch_index
                    );
                    return Ok(PartialProgress::Rejected);
                }
                self.in_partial = None;
                return Ok(PartialProgress::Rejected);
            }

            if let Some(partial) = &mut self.in_partial {
                partial.append(&bunch);
                partial.ch_sequence = bunch.ch_sequence;
                if bunch.flags.partial_final {
                    partial.flags.partial_final = true;
                    partial.flags.close = bunch.flags.close;
                    partial.flags.dormant = bunch.flags.dormant;
                    partial.flags.is_replication_paused = bunch.flags.is_replication_paused;
                    partial.flags.has_must_be_mapped_guids = bunch.flags.has_must_be_mapped_guids;
                }
            }
        }

        let num_bytes = self.in_partial.as_ref().map_or(0, InBunch::num_bytes);
        if !core.is_internal_ack() && num_bytes > MAX_CONSTRUCTED_PARTIAL_SIZE_IN_BYTES {
            error!(
                "Partial bunch on channel {} exceeded {} bytes",
                ch_index, MAX_CONSTRUCTED_PARTIAL_SIZE_IN_BYTES
            );
            self.in_partial = None;
            return Err(ChannelError::PartialBunchTooLarge {
                ch_index,
                num_bytes,
                max_bytes: MAX_CONSTRUCTED_PARTIAL_SIZE_IN_BYTES,
            });
        }

        if self
            .in_partial
            .as_ref()
            .is_some_and(|partial| partial.flags.partial_final)
        {
            if let Some(complete) = self.in_partial.take() {
                return Ok(PartialProgress::Complete(complete));
            }
        }
        Ok(PartialProgress::Pending)
    }

    fn received_sequenced_bunch(
        &mut self,
        core: &mut ConnectionCore,
        bunch: InBunch,
    ) -> Result<BunchOutcome, ChannelError> {
        let ch_index = self.index;
        if !self.closing {
            match &mut self.kind {
                ChannelKind::Control(control) => control.received_bunch(core, &bunch)?,
                ChannelKind::Actor(actor) => actor.received_bunch(core, ch_index, &bunch)?,
                ChannelKind::Voice(voice) => voice.received_bunch(core, &bunch),
            }
        }

        if bunch.flags.close {
            self.dormant = bunch.flags.dormant;
            if let Some(first) = self.in_rec.keys().next() {
                warn!(
                    "Channel {} closed at sequence {} with bunch {} still queued",
                    ch_index, bunch.ch_sequence, first
                );
            }
            if let ChannelKind::Actor(actor) = &self.kind {
                actor.received_close(core, ch_index, self.dormant);
            }
            self.clean_up(core);
            return Ok(BunchOutcome::cleaned_up());
        }
        Ok(BunchOutcome::default())
    }
}

enum PartialProgress {
    /// The final partial arrived; this is the reassembled bunch.
    Complete(InBunch),
    /// More partials are expected.
    Pending,
    /// Out of sequence; the packet must not be acked.
    Rejected,
}
