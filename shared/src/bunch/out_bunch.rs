use repnet_serde::{BitWrite, BitWriter};

use crate::{
    bunch::bunch_header::{BunchFlags, BunchHeader},
    channel::ChannelType,
    constants::MAX_CONSTRUCTED_PARTIAL_SIZE_IN_BYTES,
    types::{ChannelIndex, ChannelSequence, PacketId},
};

/// An outgoing bunch. Payload bits are written through the `BitWrite` impl;
/// the bunch refuses writes beyond its bit budget by marking itself
/// overflowed instead of truncating.
#[derive(Clone, Debug)]
pub struct OutBunch {
    pub ch_index: ChannelIndex,
    pub ch_type: ChannelType,
    /// Assigned when a reliable bunch is queued for retransmission.
    pub ch_sequence: ChannelSequence,
    /// Packet the bunch was last written into.
    pub packet_id: PacketId,
    /// Driver time of the last (re)send.
    pub time: f64,
    pub flags: BunchFlags,
    pub received_ack: bool,
    payload: BitWriter,
}

impl OutBunch {
    pub(crate) fn new(ch_index: ChannelIndex, ch_type: ChannelType, max_bits: u32) -> Self {
        Self {
            ch_index,
            ch_type,
            ch_sequence: 0,
            packet_id: -1,
            time: 0.0,
            flags: BunchFlags::default(),
            received_ack: false,
            payload: BitWriter::new(max_bits),
        }
    }

    /// Lets the payload grow past a single packet, up to the largest bunch a
    /// receiver will reassemble. The channel splits such a bunch into
    /// partials when sending it.
    pub fn allow_resize(&mut self) {
        if !self.payload.overflowed() {
            self.payload
                .set_max_bits((MAX_CONSTRUCTED_PARTIAL_SIZE_IN_BYTES * 8) as u32);
        }
    }

    pub fn is_error(&self) -> bool {
        self.payload.overflowed()
    }

    pub(crate) fn set_error(&mut self) {
        self.payload.set_overflowed();
    }

    pub fn num_bits(&self) -> u32 {
        self.payload.num_bits()
    }

    pub fn data(&self) -> &[u8] {
        self.payload.data()
    }

    pub fn max_bits(&self) -> u32 {
        self.payload.max_bits()
    }

    pub(crate) fn header(&self, internal_ack: bool) -> BunchHeader {
        let flags = self.flags;
        let wrapped_sequence = if flags.reliable && !internal_ack {
            Some(self.ch_sequence as u32)
        } else {
            None
        };
        let ch_type = if flags.reliable || flags.open {
            Some(self.ch_type.to_wire())
        } else {
            None
        };
        BunchHeader {
            flags,
            ch_index: self.ch_index,
            wrapped_sequence,
            ch_type,
            payload_bits: self.num_bits(),
        }
    }

    /// Copy of this bunch's routing and flags holding only `num_bits` bits
    /// of `data`. Used to cut a large bunch into partials.
    pub(crate) fn fragment(&self, data: &[u8], num_bits: u32, max_bits: u32) -> Self {
        let mut fragment = Self::new(self.ch_index, self.ch_type, max_bits);
        fragment.payload.write_bits(data, num_bits);
        fragment
    }
}

impl BitWrite for OutBunch {
    fn write_bit(&mut self, bit: bool) {
        self.payload.write_bit(bit);
    }

    fn write_bits(&mut self, bytes: &[u8], num_bits: u32) {
        self.payload.write_bits(bytes, num_bits);
    }

    fn write_byte(&mut self, byte: u8) {
        self.payload.write_byte(byte);
    }

    fn write_u32(&mut self, value: u32, num_bits: u32) {
        self.payload.write_u32(value, num_bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_past_budget_overflow_instead_of_truncating() {
        let mut bunch = OutBunch::new(2, ChannelType::Actor, 16);
        bunch.write_u32(0xABCD, 16);
        assert!(!bunch.is_error());

        bunch.write_bit(true);

        assert!(bunch.is_error());
        assert_eq!(bunch.num_bits(), 16);
    }

    #[test]
    fn resizable_bunch_exceeds_single_packet_budget() {
        let mut bunch = OutBunch::new(2, ChannelType::Actor, 16);
        bunch.allow_resize();
        for _ in 0..100 {
            bunch.write_byte(0x5A);
        }

        assert!(!bunch.is_error());
        assert_eq!(bunch.num_bits(), 800);
    }
}
