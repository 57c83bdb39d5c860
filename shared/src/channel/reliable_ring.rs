use crate::{constants::RELIABLE_BUFFER, types::ChannelSequence};

/// Unacknowledged reliable bunches of one channel. Slots are keyed by the
/// channel sequence modulo `RELIABLE_BUFFER`; entries are pushed at the back
/// in contiguous sequence order and retired from the front, so a lookup by
/// sequence is O(1) and no two live entries can share a slot.
pub struct ReliableRing<T> {
    slots: Box<[Option<T>]>,
    first_sequence: ChannelSequence,
    len: usize,
}

impl<T> ReliableRing<T> {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(RELIABLE_BUFFER);
        slots.resize_with(RELIABLE_BUFFER, || None);
        Self {
            slots: slots.into_boxed_slice(),
            first_sequence: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == RELIABLE_BUFFER
    }

    fn slot(sequence: ChannelSequence) -> usize {
        (sequence as u32 as usize) & (RELIABLE_BUFFER - 1)
    }

    /// Sequence of the oldest live entry.
    pub fn front_sequence(&self) -> Option<ChannelSequence> {
        (self.len > 0).then_some(self.first_sequence)
    }

    /// Sequence the next pushed entry must carry, if the ring is non-empty.
    pub fn next_sequence(&self) -> Option<ChannelSequence> {
        (self.len > 0).then(|| self.first_sequence + self.len as ChannelSequence)
    }

    /// Appends `value` under `sequence`. Hands the value back if the ring is
    /// full or `sequence` does not directly follow the newest entry.
    pub fn push_back(&mut self, sequence: ChannelSequence, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        match self.next_sequence() {
            Some(expected) if expected != sequence => return Err(value),
            None => self.first_sequence = sequence,
            _ => {}
        }
        self.slots[Self::slot(sequence)] = Some(value);
        self.len += 1;
        Ok(())
    }

    pub fn front(&self) -> Option<&T> {
        self.get(self.front_sequence()?)
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let sequence = self.front_sequence()?;
        let value = self.slots[Self::slot(sequence)].take();
        self.first_sequence += 1;
        self.len -= 1;
        value
    }

    fn contains(&self, sequence: ChannelSequence) -> bool {
        self.len > 0
            && sequence >= self.first_sequence
            && sequence < self.first_sequence + self.len as ChannelSequence
    }

    pub fn get(&self, sequence: ChannelSequence) -> Option<&T> {
        if !self.contains(sequence) {
            return None;
        }
        self.slots[Self::slot(sequence)].as_ref()
    }

    pub fn get_mut(&mut self, sequence: ChannelSequence) -> Option<&mut T> {
        if !self.contains(sequence) {
            return None;
        }
        self.slots[Self::slot(sequence)].as_mut()
    }

    /// Front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let start = Self::slot(self.first_sequence);
        let (tail, head) = self.live_ranges(start);
        self.slots[start..start + tail]
            .iter()
            .chain(self.slots[..head].iter())
            .filter_map(Option::as_ref)
    }

    /// Front to back.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        let start = Self::slot(self.first_sequence);
        let (tail, head) = self.live_ranges(start);
        let (wrapped, from_start) = self.slots.split_at_mut(start);
        from_start[..tail]
            .iter_mut()
            .chain(wrapped[..head].iter_mut())
            .filter_map(Option::as_mut)
    }

    // (entries from `start` to the end of the slots, entries wrapped to the front)
    fn live_ranges(&self, start: usize) -> (usize, usize) {
        let tail = self.len.min(RELIABLE_BUFFER - start);
        (tail, self.len - tail)
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.len = 0;
    }
}

impl<T> Default for ReliableRing<T> {
    fn default() -> Self {
        Self::new()
    }
}
