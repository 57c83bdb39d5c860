use repnet_serde::{BitReader, BitWrite, BitWriter};

use crate::{
    bunch::bunch_header::BunchFlags,
    channel::ChannelType,
    types::{ChannelIndex, ChannelSequence, PacketId},
};

/// A bunch parsed out of an incoming packet, or a partial bunch being
/// reassembled.
#[derive(Clone, Debug)]
pub struct InBunch {
    pub packet_id: PacketId,
    pub ch_index: ChannelIndex,
    pub ch_type: Option<ChannelType>,
    pub ch_sequence: ChannelSequence,
    pub flags: BunchFlags,
    data: Vec<u8>,
    num_bits: u32,
}

impl InBunch {
    pub fn new(
        packet_id: PacketId,
        ch_index: ChannelIndex,
        ch_type: Option<ChannelType>,
        ch_sequence: ChannelSequence,
        flags: BunchFlags,
        data: Vec<u8>,
        num_bits: u32,
    ) -> Self {
        let num_bits = num_bits.min((data.len() as u32).saturating_mul(8));
        Self {
            packet_id,
            ch_index,
            ch_type,
            ch_sequence,
            flags,
            data,
            num_bits,
        }
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn num_bytes(&self) -> usize {
        self.num_bits.div_ceil(8) as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.num_bytes()]
    }

    pub fn reader(&self) -> BitReader<'_> {
        BitReader::with_bits(&self.data, self.num_bits)
    }

    /// Appends `other`'s payload bits. Byte-aligned buffers take the fast
    /// path; only the final partial of a sequence may end mid-byte.
    pub(crate) fn append(&mut self, other: &InBunch) {
        if self.num_bits % 8 == 0 {
            self.data.truncate(self.num_bytes());
            self.data.extend_from_slice(other.data());
            self.num_bits += other.num_bits;
            return;
        }

        let mut writer = BitWriter::unbounded();
        writer.write_bits(&self.data, self.num_bits);
        writer.write_bits(other.data(), other.num_bits);
        self.num_bits = writer.num_bits();
        self.data = writer.to_bytes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bunch(data: Vec<u8>, num_bits: u32) -> InBunch {
        InBunch::new(1, 2, None, 0, BunchFlags::default(), data, num_bits)
    }

    #[test]
    fn aligned_append_concatenates_bytes() {
        let mut first = bunch(vec![0x01, 0x02], 16);
        first.append(&bunch(vec![0x03], 5));

        assert_eq!(first.num_bits(), 21);
        assert_eq!(first.data(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn unaligned_append_shifts_bits() {
        let mut first = bunch(vec![0b0000_0101], 3);
        first.append(&bunch(vec![0b0000_0011], 2));

        assert_eq!(first.num_bits(), 5);
        assert_eq!(first.data(), &[0b0001_1101]);
    }
}
