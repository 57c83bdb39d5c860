/// In-memory transport for end-to-end tests
/// Routes packets between a server connection and a client connection
/// without network I/O. Packets wait in the wire until a test delivers,
/// drops or reorders them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use repnet_shared::PacketSender;

/// One direction of a link. Cloning shares the queue.
#[derive(Clone, Default)]
pub struct LocalWire {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl LocalWire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every packet in flight, oldest first.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Puts packets back in flight, behind anything already queued.
    pub fn requeue(&self, packets: Vec<Vec<u8>>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(packets);
        }
    }
}

impl PacketSender for LocalWire {
    fn send(&mut self, payload: &[u8], _num_bits: u32) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(payload.to_vec());
        }
    }
}

/// Both directions of a client/server link.
#[derive(Clone, Default)]
pub struct LocalSocketPair {
    /// Packets sent by the server, waiting for the client.
    pub to_client: LocalWire,
    /// Packets sent by the client, waiting for the server.
    pub to_server: LocalWire,
}

impl LocalSocketPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_sender(&self) -> Box<dyn PacketSender> {
        Box::new(self.to_client.clone())
    }

    pub fn client_sender(&self) -> Box<dyn PacketSender> {
        Box::new(self.to_server.clone())
    }
}

/// What happens to the packets in flight on one delivery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkConditioner {
    /// Positions (in send order) of the packets to lose.
    pub drop: Vec<usize>,
    /// Deliver the surviving packets newest first.
    pub reverse: bool,
}

impl LinkConditioner {
    pub fn drop_packets(positions: &[usize]) -> Self {
        Self {
            drop: positions.to_vec(),
            reverse: false,
        }
    }

    pub fn reversed() -> Self {
        Self {
            drop: Vec::new(),
            reverse: true,
        }
    }

    /// Applies the conditions to a batch of packets.
    pub fn condition(&self, packets: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut survivors: Vec<Vec<u8>> = packets
            .into_iter()
            .enumerate()
            .filter(|(position, _)| !self.drop.contains(position))
            .map(|(_, packet)| packet)
            .collect();
        if self.reverse {
            survivors.reverse();
        }
        survivors
    }
}
