/// The raw transport beneath a connection. `payload` holds `num_bits` bits,
/// padded with zeros to a whole number of bytes.
pub trait PacketSender {
    fn send(&mut self, payload: &[u8], num_bits: u32);
}
