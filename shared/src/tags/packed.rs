use repnet_serde::{BitReader, BitWrite, SerdeErr};

/// Writes a tag net index in two segments: `first_segment_bits` low bits and
/// a "more" bit, followed by the remaining `total_bits - first_segment_bits`
/// high bits only when the value does not fit the first segment. Without a
/// usable first segment the value is written flat in `total_bits` bits.
pub fn write_tag_net_index_packed(
    writer: &mut dyn BitWrite,
    value: u32,
    first_segment_bits: u32,
    total_bits: u32,
) {
    if first_segment_bits == 0 || first_segment_bits >= total_bits {
        writer.write_u32(value, total_bits);
        return;
    }

    let mask = (1u32 << first_segment_bits) - 1;
    writer.write_u32(value & mask, first_segment_bits);
    let more = value > mask;
    writer.write_bit(more);
    if more {
        writer.write_u32(value >> first_segment_bits, total_bits - first_segment_bits);
    }
}

pub fn read_tag_net_index_packed(
    reader: &mut BitReader,
    first_segment_bits: u32,
    total_bits: u32,
) -> Result<u32, SerdeErr> {
    if first_segment_bits == 0 || first_segment_bits >= total_bits {
        return reader.read_u32(total_bits);
    }

    let first = reader.read_u32(first_segment_bits)?;
    if !reader.read_bit()? {
        return Ok(first);
    }
    let second = reader.read_u32(total_bits - first_segment_bits)?;
    Ok((second << first_segment_bits) | first)
}

/// Bits `write_tag_net_index_packed` uses for `value`.
pub fn tag_net_index_packed_bits(value: u32, first_segment_bits: u32, total_bits: u32) -> u32 {
    if first_segment_bits == 0 || first_segment_bits >= total_bits {
        return total_bits;
    }
    if value >> first_segment_bits == 0 {
        first_segment_bits + 1
    } else {
        total_bits + 1
    }
}
