use crate::{bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr, serde::Serde};

/// Unsigned integer written with exactly `BITS` bits.
pub type UnsignedInteger<const BITS: u8> = SerdeInteger<false, BITS>;

/// Unsigned integer written as `BITS`-bit chunks, each chunk preceded by a
/// "proceed" bit. `UnsignedVariableInteger<7>` has the same layout as
/// `BitWrite::write_int_packed`.
pub type UnsignedVariableInteger<const BITS: u8> = SerdeInteger<true, BITS>;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct SerdeInteger<const VARIABLE: bool, const BITS: u8> {
    value: u64,
}

impl<const VARIABLE: bool, const BITS: u8> SerdeInteger<VARIABLE, BITS> {
    /// Panics if a fixed-width integer cannot hold `value`.
    pub fn new<T: Into<u64>>(value: T) -> Self {
        let value = value.into();
        assert!(BITS > 0 && BITS <= 64, "integer width must be within 1..=64 bits");
        if !VARIABLE && BITS < 64 {
            assert!(
                value < (1u64 << BITS),
                "with {} bits, can't encode number {}",
                BITS,
                value
            );
        }
        Self { value }
    }

    pub fn get(&self) -> u64 {
        self.value
    }

    pub fn to<T: TryFrom<u64>>(&self) -> Option<T> {
        T::try_from(self.value).ok()
    }
}

impl<const VARIABLE: bool, const BITS: u8> Serde for SerdeInteger<VARIABLE, BITS> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let mut value = self.value;
        if !VARIABLE {
            for _ in 0..BITS {
                writer.write_bit(value & 1 != 0);
                value >>= 1;
            }
            return;
        }
        loop {
            let proceed = BITS < 64 && value >= (1u64 << BITS);
            writer.write_bit(proceed);
            for _ in 0..BITS {
                writer.write_bit(value & 1 != 0);
                value >>= 1;
            }
            if !proceed {
                return;
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let proceed = if VARIABLE { reader.read_bit()? } else { false };
            for _ in 0..BITS {
                let bit = reader.read_bit()?;
                if bit {
                    if shift >= 64 {
                        return Err(SerdeErr::ValueOutOfRange { value, max: u64::MAX });
                    }
                    value |= 1 << shift;
                }
                shift += 1;
            }
            if !proceed {
                return Ok(Self { value });
            }
        }
    }

    fn bit_length(&self) -> u32 {
        if !VARIABLE {
            return u32::from(BITS);
        }
        let mut chunks = 1;
        let mut value = self.value;
        while BITS < 64 && value >= (1u64 << BITS) {
            value >>= BITS;
            chunks += 1;
        }
        chunks * (u32::from(BITS) + 1)
    }
}
