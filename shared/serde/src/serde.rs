use crate::{bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr};

/// A type that can be written to and read from the bit stream.
pub trait Serde: Sized + Clone + PartialEq {
    fn ser(&self, writer: &mut dyn BitWrite);

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr>;

    /// Number of bits `ser` will emit for this value.
    fn bit_length(&self) -> u32;
}

impl Serde for bool {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_bit(*self);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        reader.read_bit()
    }

    fn bit_length(&self) -> u32 {
        1
    }
}

macro_rules! impl_serde_for_uint {
    ($type:ty, $bits:expr) => {
        impl Serde for $type {
            fn ser(&self, writer: &mut dyn BitWrite) {
                let bytes = self.to_le_bytes();
                writer.write_bits(&bytes, $bits);
            }

            fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
                let bytes = reader.read_bits($bits)?;
                let mut array = [0u8; $bits / 8];
                array.copy_from_slice(&bytes);
                Ok(<$type>::from_le_bytes(array))
            }

            fn bit_length(&self) -> u32 {
                $bits
            }
        }
    };
}

impl_serde_for_uint!(u8, 8);
impl_serde_for_uint!(u16, 16);
impl_serde_for_uint!(u32, 32);
impl_serde_for_uint!(u64, 64);
impl_serde_for_uint!(i32, 32);

impl Serde for String {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_string(self);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        reader.read_string()
    }

    fn bit_length(&self) -> u32 {
        let length = self.len() as u32;
        packed_bit_length(length) + length * 8
    }
}

impl<T: Serde> Serde for Option<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            Some(value) => {
                writer.write_bit(true);
                value.ser(writer);
            }
            None => writer.write_bit(false),
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if reader.read_bit()? {
            Ok(Some(T::de(reader)?))
        } else {
            Ok(None)
        }
    }

    fn bit_length(&self) -> u32 {
        1 + self.as_ref().map_or(0, Serde::bit_length)
    }
}

/// Bits used by `BitWrite::write_int_packed` for `value`.
pub fn packed_bit_length(value: u32) -> u32 {
    let mut chunks = 1;
    let mut remaining = value >> 7;
    while remaining != 0 {
        chunks += 1;
        remaining >>= 7;
    }
    chunks * 8
}
