use crate::error::SerdeErr;

/// Reads an LSB-first bit stream of an exact bit length.
#[derive(Clone, Debug)]
pub struct BitReader<'b> {
    buffer: &'b [u8],
    num_bits: u32,
    position: u32,
}

impl<'b> BitReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self::with_bits(buffer, (buffer.len() as u32).saturating_mul(8))
    }

    /// Reader over the first `num_bits` bits of `buffer`. The bit count is
    /// clamped to what the buffer actually holds.
    pub fn with_bits(buffer: &'b [u8], num_bits: u32) -> Self {
        let available = (buffer.len() as u32).saturating_mul(8);
        Self {
            buffer,
            num_bits: num_bits.min(available),
            position: 0,
        }
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn bits_left(&self) -> u32 {
        self.num_bits - self.position
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.num_bits
    }

    fn ensure(&self, requested: u32) -> Result<(), SerdeErr> {
        if requested > self.bits_left() {
            return Err(SerdeErr::ReadPastEnd {
                requested,
                remaining: self.bits_left(),
            });
        }
        Ok(())
    }

    fn take_bit(&mut self) -> bool {
        let byte = self.buffer[(self.position / 8) as usize];
        let bit = (byte >> (self.position % 8)) & 1 != 0;
        self.position += 1;
        bit
    }

    pub fn read_bit(&mut self) -> Result<bool, SerdeErr> {
        self.ensure(1)?;
        Ok(self.take_bit())
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        self.ensure(8)?;
        let mut output = 0u8;
        for bit in 0..8 {
            if self.take_bit() {
                output |= 1 << bit;
            }
        }
        Ok(output)
    }

    /// Reads `num_bits` bits into a fresh byte buffer. All-or-nothing: on
    /// error the position does not move.
    pub fn read_bits(&mut self, num_bits: u32) -> Result<Vec<u8>, SerdeErr> {
        self.ensure(num_bits)?;
        let mut output = vec![0u8; num_bits.div_ceil(8) as usize];
        for index in 0..num_bits {
            if self.take_bit() {
                output[(index / 8) as usize] |= 1 << (index % 8);
            }
        }
        Ok(output)
    }

    pub fn read_u32(&mut self, num_bits: u32) -> Result<u32, SerdeErr> {
        let num_bits = num_bits.min(32);
        self.ensure(num_bits)?;
        let mut output = 0u32;
        for bit in 0..num_bits {
            if self.take_bit() {
                output |= 1 << bit;
            }
        }
        Ok(output)
    }

    /// Counterpart of `BitWrite::write_int_wrapped`. The result is always
    /// `< max` (or 0 when `max <= 1`).
    pub fn read_int(&mut self, max: u32) -> Result<u32, SerdeErr> {
        let mut value: u32 = 0;
        let mut mask: u32 = 1;
        while mask != 0 && value.saturating_add(mask) < max {
            if self.read_bit()? {
                value |= mask;
            }
            mask = mask.wrapping_shl(1);
        }
        Ok(value)
    }

    pub fn read_int_packed(&mut self) -> Result<u32, SerdeErr> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let more = self.read_bit()?;
            let chunk = u64::from(self.read_u32(7)?);
            value |= chunk << shift;
            shift += 7;
            if !more {
                break;
            }
            // five chunks cover 35 bits, anything longer is garbage
            if shift >= 35 {
                return Err(SerdeErr::ValueOutOfRange {
                    value,
                    max: u64::from(u32::MAX),
                });
            }
        }
        u32::try_from(value).map_err(|_| SerdeErr::ValueOutOfRange {
            value,
            max: u64::from(u32::MAX),
        })
    }

    pub fn read_string(&mut self) -> Result<String, SerdeErr> {
        let length = self.read_int_packed()?;
        self.ensure(length.saturating_mul(8))?;
        let mut bytes = Vec::with_capacity(length as usize);
        for _ in 0..length {
            bytes.push(self.read_byte()?);
        }
        String::from_utf8(bytes).map_err(|_| SerdeErr::InvalidUtf8 { length })
    }
}

#[cfg(test)]
mod tests {
    use crate::{BitWrite, BitWriter};

    use super::*;

    #[test]
    fn read_int_matches_wrapped_write_for_non_power_of_two_max() {
        for value in [0u32, 1, 5000, 8191, 8192, 10239] {
            let mut writer = BitWriter::unbounded();
            writer.write_int_wrapped(value, 10240);
            let bits = writer.num_bits();
            let buffer = writer.to_bytes();

            let mut reader = BitReader::with_bits(&buffer, bits);
            assert_eq!(reader.read_int(10240).unwrap(), value);
            assert!(reader.at_end());
        }
    }

    #[test]
    fn read_past_end_reports_remaining_bits() {
        let buffer = [0xFFu8];
        let mut reader = BitReader::with_bits(&buffer, 5);
        reader.read_u32(3).unwrap();

        let err = reader.read_byte().unwrap_err();
        assert_eq!(err, SerdeErr::ReadPastEnd { requested: 8, remaining: 2 });
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn packed_int_round_trip_edges() {
        for value in [0u32, 127, 128, 16_383, 16_384, u32::MAX] {
            let mut writer = BitWriter::unbounded();
            writer.write_int_packed(value);
            let buffer = writer.to_bytes();
            let mut reader = BitReader::new(&buffer);
            assert_eq!(reader.read_int_packed().unwrap(), value);
        }
    }

    #[test]
    fn string_round_trip() {
        let mut writer = BitWriter::unbounded();
        writer.write_bit(true);
        writer.write_string("Ability.Cooldown");
        let bits = writer.num_bits();
        let buffer = writer.to_bytes();

        let mut reader = BitReader::with_bits(&buffer, bits);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_string().unwrap(), "Ability.Cooldown");
        assert!(reader.at_end());
    }
}
