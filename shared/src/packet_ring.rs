use crate::types::PacketId;

/// Fixed-capacity history keyed by packet id. Slot `id mod N` holds the most
/// recent entry written for any id with that residue; a lookup only succeeds
/// if the stored id matches, so stale wraparound entries are never returned.
/// `N` must be a power of two.
pub struct PacketRing<T, const N: usize> {
    slots: Box<[Option<(PacketId, T)>]>,
}

impl<T, const N: usize> PacketRing<T, N> {
    pub fn new() -> Self {
        assert!(N.is_power_of_two(), "packet ring capacity must be a power of two");
        let mut slots = Vec::with_capacity(N);
        slots.resize_with(N, || None);
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn slot_index(packet_id: PacketId) -> usize {
        (packet_id as u32 as usize) & (N - 1)
    }

    /// Records `value` for `packet_id`, evicting whatever shared its slot.
    pub fn insert(&mut self, packet_id: PacketId, value: T) {
        self.slots[Self::slot_index(packet_id)] = Some((packet_id, value));
    }

    pub fn get(&self, packet_id: PacketId) -> Option<&T> {
        match &self.slots[Self::slot_index(packet_id)] {
            Some((stored, value)) if *stored == packet_id => Some(value),
            _ => None,
        }
    }

    /// Removes and returns the entry for `packet_id`, so each entry can be
    /// consumed at most once.
    pub fn take(&mut self, packet_id: PacketId) -> Option<T> {
        let slot = &mut self.slots[Self::slot_index(packet_id)];
        match slot {
            Some((stored, _)) if *stored == packet_id => slot.take().map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl<T, const N: usize> Default for PacketRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::PacketRing;

    #[test]
    fn take_consumes_entry_once() {
        let mut ring: PacketRing<f64, 256> = PacketRing::new();
        ring.insert(7, 1.5);

        assert_eq!(ring.take(7), Some(1.5));
        assert_eq!(ring.take(7), None);
    }

    #[test]
    fn wrapped_id_evicts_older_entry() {
        let mut ring: PacketRing<u32, 256> = PacketRing::new();
        ring.insert(3, 10);
        ring.insert(3 + 256, 20);

        assert_eq!(ring.get(3), None, "stale id must not alias the newer entry");
        assert_eq!(ring.get(259), Some(&20));
    }

    #[test]
    fn negative_ids_map_into_range() {
        let mut ring: PacketRing<u8, 4> = PacketRing::new();
        ring.insert(-1, 9);
        assert_eq!(ring.get(-1), Some(&9));
    }
}
