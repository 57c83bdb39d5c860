use bytes::{Buf, BufMut};

use super::error::DemoHeaderError;

macro_rules! try_get_impl {
    ($try_getter:ident, $ty:ty, $getter:ident) => {
        fn $try_getter(&mut self, field: &'static str) -> Result<$ty, DemoHeaderError> {
            let needed = std::mem::size_of::<$ty>();
            if self.remaining() < needed {
                return Err(DemoHeaderError::Truncated {
                    field,
                    needed,
                    remaining: self.remaining(),
                });
            }
            Ok(self.$getter())
        }
    };
}

/// Reads the engine's little-endian archive layout.
pub(crate) trait ArchiveReadExt: Buf {
    try_get_impl!(try_get_u32_archive, u32, get_u32_le);
    try_get_impl!(try_get_i32_archive, i32, get_i32_le);
    try_get_impl!(try_get_u16_archive, u16, get_u16_le);

    /// A length-prefixed string. A positive length counts single-byte
    /// characters, a negative one UTF-16 units; both include a terminator.
    fn try_get_archive_string(&mut self, field: &'static str) -> Result<String, DemoHeaderError> {
        let length = self.try_get_i32_archive(field)?;
        if length == 0 {
            return Ok(String::new());
        }
        if length > 0 {
            let length = length as usize;
            if self.remaining() < length {
                return Err(DemoHeaderError::Truncated {
                    field,
                    needed: length,
                    remaining: self.remaining(),
                });
            }
            let mut bytes = vec![0u8; length];
            self.copy_to_slice(&mut bytes);
            if bytes.pop() != Some(0) {
                return Err(DemoHeaderError::CorruptString { field });
            }
            return Ok(bytes.into_iter().map(char::from).collect());
        }

        let units = length.checked_neg().ok_or(DemoHeaderError::CorruptString { field })? as usize;
        let mut wide = Vec::with_capacity(units.min(self.remaining() / 2));
        for _ in 0..units {
            wide.push(self.try_get_u16_archive(field)?);
        }
        if wide.pop() != Some(0) {
            return Err(DemoHeaderError::CorruptString { field });
        }
        String::from_utf16(&wide).map_err(|_| DemoHeaderError::CorruptString { field })
    }

    fn try_get_archive_count(&mut self, field: &'static str, min_entry_size: usize) -> Result<usize, DemoHeaderError> {
        let count = self.try_get_i32_archive(field)?;
        if count < 0 || (count as usize).saturating_mul(min_entry_size) > self.remaining() {
            return Err(DemoHeaderError::CorruptArray { field, count });
        }
        Ok(count as usize)
    }
}

impl<T: Buf> ArchiveReadExt for T {}

pub(crate) trait ArchiveWriteExt: BufMut {
    fn put_archive_string(&mut self, value: &str) {
        if value.is_empty() {
            self.put_i32_le(0);
            return;
        }
        if value.chars().all(|c| (c as u32) < 0x100) {
            self.put_i32_le(value.chars().count() as i32 + 1);
            for c in value.chars() {
                self.put_u8(c as u32 as u8);
            }
            self.put_u8(0);
            return;
        }
        let wide: Vec<u16> = value.encode_utf16().collect();
        self.put_i32_le(-(wide.len() as i32 + 1));
        for unit in wide {
            self.put_u16_le(unit);
        }
        self.put_u16_le(0);
    }

    fn put_archive_count(&mut self, count: usize) {
        self.put_i32_le(count as i32);
    }
}

impl<T: BufMut> ArchiveWriteExt for T {}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn narrow_strings_carry_a_terminator() {
        let mut buf = BytesMut::new();
        buf.put_archive_string("Lobby");
        assert_eq!(buf.len(), 4 + 6);

        let mut reader = buf.freeze();
        assert_eq!(reader.try_get_archive_string("level").unwrap(), "Lobby");
        assert!(!reader.has_remaining());
    }

    #[test]
    fn wide_strings_use_negative_length() {
        let mut buf = BytesMut::new();
        buf.put_archive_string("Ω-Map");
        assert_eq!(&buf[..4], &(-6i32).to_le_bytes());

        let mut reader = buf.freeze();
        assert_eq!(reader.try_get_archive_string("level").unwrap(), "Ω-Map");
    }

    #[test]
    fn missing_terminator_is_corrupt() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(2);
        buf.put_slice(b"ab");

        let mut reader = buf.freeze();
        assert!(matches!(
            reader.try_get_archive_string("level"),
            Err(DemoHeaderError::CorruptString { .. })
        ));
    }
}
