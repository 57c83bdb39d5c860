pub mod test_server;
pub mod test_client;
pub mod assertions;
pub mod packet_exchange;

pub use test_server::{TestServer, FRAME_DELTA};
pub use test_client::TestClient;
pub use packet_exchange::{
    complete_handshakes, exchange_packets_n_times, tick_and_exchange, tick_and_exchange_with,
};
