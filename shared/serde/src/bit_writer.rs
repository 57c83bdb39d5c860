/// Sink for bit-granular serialization. Bits are emitted least significant
/// bit first, both within a value and within each byte of the output.
pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);

    fn write_byte(&mut self, byte: u8) {
        let mut temp = byte;
        for _ in 0..8 {
            self.write_bit(temp & 1 != 0);
            temp >>= 1;
        }
    }

    /// Writes the first `num_bits` bits of `bytes`. Missing source bytes are
    /// treated as zero.
    fn write_bits(&mut self, bytes: &[u8], num_bits: u32) {
        let whole_bytes = (num_bits / 8) as usize;
        for index in 0..whole_bytes {
            self.write_byte(bytes.get(index).copied().unwrap_or(0));
        }
        let stray = num_bits % 8;
        if stray > 0 {
            let last = bytes.get(whole_bytes).copied().unwrap_or(0);
            for bit in 0..stray {
                self.write_bit((last >> bit) & 1 != 0);
            }
        }
    }

    /// Writes the low `num_bits` bits of `value`.
    fn write_u32(&mut self, value: u32, num_bits: u32) {
        for bit in 0..num_bits.min(32) {
            self.write_bit((value >> bit) & 1 != 0);
        }
    }

    /// Writes `value` bounded by `max` (exclusive). Stops emitting bits as
    /// soon as the next mask could only produce values `>= max`, so the
    /// reader needs nothing but `max` to decode it. Values are not range
    /// checked; out of range input wraps to the bits that are written.
    fn write_int_wrapped(&mut self, value: u32, max: u32) {
        let mut new_value: u32 = 0;
        let mut mask: u32 = 1;
        while mask != 0 && new_value.saturating_add(mask) < max {
            let set = value & mask != 0;
            self.write_bit(set);
            if set {
                new_value += mask;
            }
            mask = mask.wrapping_shl(1);
        }
    }

    /// Seven value bits per byte, preceded by a flag that is set when
    /// another byte follows.
    fn write_int_packed(&mut self, value: u32) {
        let mut remaining = value;
        loop {
            let more = remaining & !0x7f != 0;
            self.write_bit(more);
            for _ in 0..7 {
                self.write_bit(remaining & 1 != 0);
                remaining >>= 1;
            }
            if !more {
                return;
            }
        }
    }

    fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        self.write_int_packed(bytes.len() as u32);
        for byte in bytes {
            self.write_byte(*byte);
        }
    }
}

/// Bounded bit buffer. A write that does not fit sets the sticky
/// `overflowed` flag and leaves the contents untouched.
#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    num_bits: u32,
    max_bits: u32,
    overflowed: bool,
}

impl BitWriter {
    pub fn new(max_bits: u32) -> Self {
        Self {
            buffer: Vec::with_capacity(max_bits.div_ceil(8).min(4096) as usize),
            num_bits: 0,
            max_bits,
            overflowed: false,
        }
    }

    /// A writer without a practical bit budget, used for scratch data and
    /// reassembled partial payloads.
    pub fn unbounded() -> Self {
        Self::new(u32::MAX)
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn num_bytes(&self) -> usize {
        self.num_bits.div_ceil(8) as usize
    }

    pub fn max_bits(&self) -> u32 {
        self.max_bits
    }

    pub fn bits_free(&self) -> u32 {
        self.max_bits.saturating_sub(self.num_bits)
    }

    /// Changes the bit budget. Shrinking below what is already written marks
    /// the writer overflowed.
    pub fn set_max_bits(&mut self, max_bits: u32) {
        self.max_bits = max_bits;
        if self.num_bits > max_bits {
            self.overflowed = true;
        }
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn set_overflowed(&mut self) {
        self.overflowed = true;
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.num_bytes()]
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let mut buffer = self.buffer;
        buffer.truncate(self.num_bits.div_ceil(8) as usize);
        buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.num_bits = 0;
        self.overflowed = false;
    }

    /// Appends every bit held by `other`.
    pub fn append(&mut self, other: &BitWriter) {
        self.write_bits(other.data(), other.num_bits());
    }

    pub fn mark(&self) -> BitWriterMark {
        BitWriterMark {
            num_bits: self.num_bits,
            overflowed: self.overflowed,
        }
    }

    fn has_room_for(&mut self, num_bits: u32) -> bool {
        if self.overflowed {
            return false;
        }
        if self.num_bits.checked_add(num_bits).map_or(true, |total| total > self.max_bits) {
            self.overflowed = true;
            return false;
        }
        true
    }

    fn push_bit(&mut self, bit: bool) {
        let byte_index = (self.num_bits / 8) as usize;
        if byte_index == self.buffer.len() {
            self.buffer.push(0);
        }
        if bit {
            self.buffer[byte_index] |= 1 << (self.num_bits % 8);
        }
        self.num_bits += 1;
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        if self.has_room_for(1) {
            self.push_bit(bit);
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.write_bits(&[byte], 8);
    }

    fn write_u32(&mut self, value: u32, num_bits: u32) {
        self.write_bits(&value.to_le_bytes(), num_bits.min(32));
    }

    fn write_bits(&mut self, bytes: &[u8], num_bits: u32) {
        if !self.has_room_for(num_bits) {
            return;
        }
        for index in 0..num_bits {
            let byte = bytes.get((index / 8) as usize).copied().unwrap_or(0);
            self.push_bit((byte >> (index % 8)) & 1 != 0);
        }
    }
}

/// A saved writer position. Popping it discards everything written after
/// the mark was taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitWriterMark {
    num_bits: u32,
    overflowed: bool,
}

impl BitWriterMark {
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn pop(&self, writer: &mut BitWriter) {
        writer.buffer.truncate(self.num_bits.div_ceil(8) as usize);
        let stray = self.num_bits % 8;
        if stray > 0 {
            if let Some(last) = writer.buffer.last_mut() {
                *last &= (1u8 << stray) - 1;
            }
        }
        writer.num_bits = self.num_bits;
        writer.overflowed = self.overflowed;
    }
}
