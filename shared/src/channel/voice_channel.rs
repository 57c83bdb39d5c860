use crate::{
    bunch::InBunch,
    connection::{ConnectionCore, ConnectionEvent},
};

/// Unreliable voice data. Lives at a fixed index and may be opened by either
/// side.
#[derive(Default)]
pub struct VoiceChannel;

impl VoiceChannel {
    pub(crate) fn received_bunch(&mut self, core: &mut ConnectionCore, bunch: &InBunch) {
        if bunch.num_bits() == 0 {
            return;
        }
        core.push_event(ConnectionEvent::VoicePacket {
            payload: bunch.data().to_vec(),
            num_bits: bunch.num_bits(),
        });
    }
}
