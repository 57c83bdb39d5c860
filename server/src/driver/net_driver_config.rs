use std::default::Default;

use repnet_shared::ConnectionConfig;

/// Contains Config properties which will be used by the NetDriver
#[derive(Clone, Debug)]
pub struct NetDriverConfig {
    /// Server frame rate used to spread actor update times. Zero uses the
    /// frame delta instead.
    pub net_server_max_tick_rate: f32,
    /// Only tick as many connections per frame as this rate allows,
    /// rotating through them (listen servers).
    pub limit_client_ticks: bool,
    pub net_client_ticks_per_second: f32,
    /// Seconds an actor stays relevant after it was last found relevant.
    pub relevant_timeout: f64,
    /// Update age assumed for an actor without a channel yet.
    pub spawn_priority_seconds: f32,
    pub dormancy_enabled: bool,
    /// Connections whose net speed is below this many bytes per second are
    /// prioritized in low bandwidth mode. Zero disables it.
    pub low_bandwidth_net_speed: u32,
    /// Slow down actors that have not changed for a while.
    pub adaptive_net_update_frequency: bool,
    /// Version a client's `Hello` must carry.
    pub network_version: u32,
    /// Sent to clients in `Welcome`.
    pub level_name: String,
    pub game_mode: String,
    /// Used to configure the connections with clients
    pub connection: ConnectionConfig,
    /// Seed for update time jitter. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for NetDriverConfig {
    fn default() -> Self {
        Self {
            net_server_max_tick_rate: 30.0,
            limit_client_ticks: false,
            net_client_ticks_per_second: 200.0,
            relevant_timeout: 5.0,
            spawn_priority_seconds: 1.0,
            dormancy_enabled: true,
            low_bandwidth_net_speed: 0,
            adaptive_net_update_frequency: true,
            network_version: 1,
            level_name: String::new(),
            game_mode: String::new(),
            connection: ConnectionConfig::default(),
            seed: None,
        }
    }
}
