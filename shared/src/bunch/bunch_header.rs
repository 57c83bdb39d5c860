use repnet_serde::{BitReader, BitWrite, SerdeErr};

use crate::{
    constants::{CHTYPE_MAX, MAX_CHANNELS, MAX_CHSEQUENCE},
    types::ChannelIndex,
};

/// Flag bits carried by a bunch header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BunchFlags {
    pub open: bool,
    pub close: bool,
    /// Only meaningful with `close`: the channel closes because the actor
    /// went dormant, not because it was destroyed.
    pub dormant: bool,
    pub is_replication_paused: bool,
    pub reliable: bool,
    pub has_package_map_exports: bool,
    pub has_must_be_mapped_guids: bool,
    pub partial: bool,
    pub partial_initial: bool,
    pub partial_final: bool,
}

impl BunchFlags {
    pub fn is_control(&self) -> bool {
        self.open || self.close
    }
}

/// A bunch header as it travels on the wire. The channel sequence is still
/// the wrapped value; the connection expands it against its own counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BunchHeader {
    pub flags: BunchFlags,
    pub ch_index: ChannelIndex,
    /// Present for reliable bunches unless the connection acks internally.
    pub wrapped_sequence: Option<u32>,
    /// Raw channel type, present for reliable or opening bunches.
    pub ch_type: Option<u32>,
    pub payload_bits: u32,
}

impl BunchHeader {
    /// Writes everything after the leading "is ack" bit.
    pub fn write(&self, writer: &mut dyn BitWrite, max_packet_bits: u32) {
        let flags = &self.flags;
        writer.write_bit(flags.is_control());
        if flags.is_control() {
            writer.write_bit(flags.open);
            writer.write_bit(flags.close);
            if flags.close {
                writer.write_bit(flags.dormant);
            }
        }
        writer.write_bit(flags.is_replication_paused);
        writer.write_bit(flags.reliable);
        writer.write_int_wrapped(self.ch_index, MAX_CHANNELS);
        writer.write_bit(flags.has_package_map_exports);
        writer.write_bit(flags.has_must_be_mapped_guids);
        writer.write_bit(flags.partial);

        if let Some(sequence) = self.wrapped_sequence {
            writer.write_int_wrapped(sequence, MAX_CHSEQUENCE);
        }

        if flags.partial {
            writer.write_bit(flags.partial_initial);
            writer.write_bit(flags.partial_final);
        }

        if let Some(ch_type) = self.ch_type {
            writer.write_int_wrapped(ch_type, CHTYPE_MAX);
        }

        writer.write_int_wrapped(self.payload_bits, max_packet_bits);
    }

    /// Reads a header whose "is ack" bit has already been consumed.
    pub fn read(
        reader: &mut BitReader,
        internal_ack: bool,
        max_packet_bits: u32,
    ) -> Result<Self, SerdeErr> {
        let mut flags = BunchFlags::default();

        let control = reader.read_bit()?;
        if control {
            flags.open = reader.read_bit()?;
            flags.close = reader.read_bit()?;
            if flags.close {
                flags.dormant = reader.read_bit()?;
            }
        }
        flags.is_replication_paused = reader.read_bit()?;
        flags.reliable = reader.read_bit()?;
        let ch_index = reader.read_int(MAX_CHANNELS)?;
        flags.has_package_map_exports = reader.read_bit()?;
        flags.has_must_be_mapped_guids = reader.read_bit()?;
        flags.partial = reader.read_bit()?;

        let wrapped_sequence = if flags.reliable && !internal_ack {
            Some(reader.read_int(MAX_CHSEQUENCE)?)
        } else {
            None
        };

        if flags.partial {
            flags.partial_initial = reader.read_bit()?;
            flags.partial_final = reader.read_bit()?;
        }

        let ch_type = if flags.reliable || flags.open {
            Some(reader.read_int(CHTYPE_MAX)?)
        } else {
            None
        };

        let payload_bits = reader.read_int(max_packet_bits)?;

        Ok(Self {
            flags,
            ch_index,
            wrapped_sequence,
            ch_type,
            payload_bits,
        })
    }
}
