mod network_object;
mod replication_host;

pub use network_object::{
    ActorDestructionInfo, NetDormancy, NetworkActorSettings, NetworkObjectInfo, NetworkObjectList,
};
pub use replication_host::{NetViewer, ReplicationHost};
