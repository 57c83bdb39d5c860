//! # Repnet Server
//! The server side of repnet: a net driver that owns client connections,
//! walks the replicated actors every frame and sends each connection the
//! most important ones its bandwidth allows.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use repnet_shared::{
        ActorId, BitReader, BitWrite, BitWriter, ChannelIndex, ChannelType, Connection,
        ConnectionConfig, ConnectionEvent, ConnectionState, ControlMessage, NetGuid, OutBunch,
        PacketSender, SchemaProvider, Serde, SerdeErr,
    };
}

mod driver;
mod error;
mod world;

pub use driver::{
    compare_actor_priority, default_net_priority, destruction_priority, sort_priorities,
    to_fixed_priority, ActorPriority, ClientConnection, ConnectionKey, NetDriver, NetDriverConfig,
    PriorityTarget, CLOSE_PROXIMITY, FAR_SIGHT_THRESHOLD, MED_SIGHT_THRESHOLD,
    NEAR_SIGHT_THRESHOLD, PRIORITY_SCALE,
};
pub use error::DriverError;
pub use world::{
    ActorDestructionInfo, NetDormancy, NetViewer, NetworkActorSettings, NetworkObjectInfo,
    NetworkObjectList, ReplicationHost,
};
