use thiserror::Error;

/// Errors raised while reading or writing the bit stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerdeErr {
    /// A read asked for more bits than the stream has left
    #[error("Attempted to read {requested} bits with only {remaining} bits left in the stream")]
    ReadPastEnd { requested: u32, remaining: u32 },

    /// A decoded value is outside the range its type allows (SECURITY: possibly crafted data)
    #[error("Decoded value {value} is out of range (maximum {max})")]
    ValueOutOfRange { value: u64, max: u64 },

    /// A length-prefixed string did not contain valid UTF-8
    #[error("String of {length} bytes is not valid UTF-8")]
    InvalidUtf8 { length: u32 },

    /// A write did not fit in the writer's bit budget
    #[error("Writer overflowed: needed {bits_needed} bits with {bits_free} bits free")]
    Overflow { bits_needed: u32, bits_free: u32 },
}
