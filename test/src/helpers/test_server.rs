use glam::Vec3;

use repnet_server::{NetDriver, NetDriverConfig, NetworkActorSettings};
use repnet_shared::{ActorId, ConnectionConfig, NetGuid};

use crate::{helpers::TestClient, local_socket::LocalSocketPair, test_world::TestWorld};

/// Frame delta the helpers tick with, a 30 Hz server.
pub const FRAME_DELTA: f32 = 1.0 / 30.0;

/// A net driver plus the world it replicates.
pub struct TestServer {
    pub driver: NetDriver,
    pub world: TestWorld,
}

impl TestServer {
    /// A driver with a fixed seed and the level `TestLevel`.
    pub fn new() -> Self {
        Self::with_config(NetDriverConfig {
            level_name: "TestLevel".to_string(),
            game_mode: "TestGame".to_string(),
            seed: Some(7),
            ..Default::default()
        })
    }

    pub fn with_config(config: NetDriverConfig) -> Self {
        Self {
            driver: NetDriver::new(config),
            world: TestWorld::new(),
        }
    }

    /// Accepts a client and starts its handshake.
    pub fn connect(&mut self) -> TestClient {
        self.connect_with(ConnectionConfig::default())
    }

    pub fn connect_with(&mut self, client_config: ConnectionConfig) -> TestClient {
        let socket = LocalSocketPair::new();
        let key = self.driver.add_client_connection(socket.server_sender());
        let mut client = TestClient::new(key, socket, client_config, self.driver.time());
        client.connect();
        client
    }

    /// Spawns an actor in the world and registers it with the driver. Its
    /// net guid is its id.
    pub fn spawn_actor(&mut self, id: u64, location: Vec3, settings: NetworkActorSettings) -> ActorId {
        let actor = ActorId(id);
        self.world.spawn(actor, location);
        let settings = NetworkActorSettings {
            guid: NetGuid(id as u32),
            ..settings
        };
        if let Err(err) = self.driver.add_network_actor(actor, settings) {
            panic!("could not add {}: {}", actor, err);
        }
        actor
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}
