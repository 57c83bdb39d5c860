use std::collections::VecDeque;

use log::debug;

use repnet_serde::BitWrite;

use crate::{
    bunch::{InBunch, OutBunch},
    channel::ChannelError,
    connection::{ConnectionCore, ConnectionEvent},
    types::{ActorId, ChannelIndex, NetGuid, PacketId, PacketIdRange},
};

/// Unreliable sends remembered for loss detection.
const MAX_TRACKED_UNRELIABLE_SENDS: usize = 32;

/// Replicates one actor. The open bunch starts with the actor's packed net
/// guid; everything after it, and every later bunch, is opaque actor payload.
pub struct ActorChannel {
    actor: Option<ActorId>,
    guid: NetGuid,
    relevant_time: f64,
    last_update_time: f64,
    unreliable_sends: VecDeque<PacketIdRange>,
}

impl ActorChannel {
    pub(crate) fn new(time: f64) -> Self {
        Self {
            actor: None,
            guid: NetGuid::default(),
            relevant_time: time,
            last_update_time: time,
            unreliable_sends: VecDeque::new(),
        }
    }

    /// Local actor this channel replicates. `None` on the receiving side.
    pub fn actor(&self) -> Option<ActorId> {
        self.actor
    }

    pub fn guid(&self) -> NetGuid {
        self.guid
    }

    pub(crate) fn set_actor(&mut self, actor: ActorId, guid: NetGuid) {
        self.actor = Some(actor);
        self.guid = guid;
    }

    /// Binds the channel to an actor that no longer exists locally, so its
    /// open bunch can name the guid the peer should destroy.
    pub(crate) fn set_actor_for_destroy(&mut self, guid: NetGuid) {
        self.actor = None;
        self.guid = guid;
    }

    /// Last time the actor was found relevant to the connection.
    pub fn relevant_time(&self) -> f64 {
        self.relevant_time
    }

    pub fn set_relevant_time(&mut self, time: f64) {
        self.relevant_time = time;
    }

    /// Last time the actor replicated on this channel.
    pub fn last_update_time(&self) -> f64 {
        self.last_update_time
    }

    pub fn set_last_update_time(&mut self, time: f64) {
        self.last_update_time = time;
    }

    /// Copy of `bunch` with the actor's guid in front of its payload.
    pub(crate) fn with_open_header(&self, bunch: OutBunch) -> OutBunch {
        let mut opened = OutBunch::new(bunch.ch_index, bunch.ch_type, bunch.max_bits());
        opened.allow_resize();
        opened.flags = bunch.flags;
        opened.write_int_packed(self.guid.0);
        opened.write_bits(bunch.data(), bunch.num_bits());
        opened
    }

    pub(crate) fn record_unreliable_send(&mut self, range: PacketIdRange) {
        if self.unreliable_sends.len() == MAX_TRACKED_UNRELIABLE_SENDS {
            self.unreliable_sends.pop_front();
        }
        self.unreliable_sends.push_back(range);
    }

    /// Forgets sends every packet of which the peer has acked or nakked.
    pub(crate) fn prune_unreliable_sends(&mut self, out_ack_packet_id: PacketId) {
        self.unreliable_sends
            .retain(|range| range.last > out_ack_packet_id);
    }

    pub(crate) fn received_nak(&mut self, core: &mut ConnectionCore, nak_packet_id: PacketId) {
        let Some(position) = self
            .unreliable_sends
            .iter()
            .position(|range| range.in_range(nak_packet_id))
        else {
            return;
        };
        self.unreliable_sends.remove(position);
        if let Some(actor) = self.actor {
            debug!("{} lost an unreliable update in packet {}", actor, nak_packet_id);
            core.push_event(ConnectionEvent::ActorUpdateLost { actor });
        }
    }

    pub(crate) fn received_bunch(
        &mut self,
        core: &mut ConnectionCore,
        ch_index: ChannelIndex,
        bunch: &InBunch,
    ) -> Result<(), ChannelError> {
        let mut reader = bunch.reader();
        if bunch.flags.open {
            let guid = NetGuid(reader.read_int_packed()?);
            if !guid.is_valid() {
                return Err(ChannelError::InvalidActorGuid { ch_index });
            }
            if !self.guid.is_valid() {
                self.guid = guid;
                core.push_event(ConnectionEvent::ActorOpened { ch_index, guid });
            }
        }
        if !self.guid.is_valid() {
            return Err(ChannelError::InvalidActorGuid { ch_index });
        }

        let num_bits = reader.bits_left();
        if num_bits > 0 {
            let payload = reader.read_bits(num_bits)?;
            core.push_event(ConnectionEvent::ActorUpdate {
                ch_index,
                guid: self.guid,
                reliable: bunch.flags.reliable,
                payload,
                num_bits,
            });
        }
        Ok(())
    }

    pub(crate) fn received_close(&self, core: &mut ConnectionCore, ch_index: ChannelIndex, dormant: bool) {
        if self.guid.is_valid() {
            core.push_event(ConnectionEvent::ActorClosed {
                ch_index,
                guid: self.guid,
                dormant,
            });
        }
    }
}
