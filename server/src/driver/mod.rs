mod client_connection;
mod net_driver;
mod net_driver_config;
mod priority;

pub use client_connection::{ClientConnection, ConnectionKey};
pub use net_driver::NetDriver;
pub use net_driver_config::NetDriverConfig;
pub use priority::{
    compare_actor_priority, default_net_priority, destruction_priority, sort_priorities,
    to_fixed_priority, ActorPriority, PriorityTarget, CLOSE_PROXIMITY, FAR_SIGHT_THRESHOLD,
    MED_SIGHT_THRESHOLD, NEAR_SIGHT_THRESHOLD, PRIORITY_SCALE,
};
