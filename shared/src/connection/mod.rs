mod connection;
mod connection_config;
mod connection_core;
mod connection_stats;
mod error;
mod event;
mod packet_simulation;
mod transport;

pub use connection::Connection;
pub use connection_config::{ConnectionConfig, PacketSimulationSettings, RemoteChannelPolicy};
pub(crate) use connection_core::ConnectionCore;
pub use connection_stats::ConnectionStats;
pub use error::{PacketError, SecurityEvent};
pub use event::ConnectionEvent;
pub use packet_simulation::PacketSimulator;
pub use transport::PacketSender;
