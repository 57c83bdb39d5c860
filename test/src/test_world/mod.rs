use std::{
    cell::Cell,
    collections::{BTreeMap, HashSet},
};

use glam::Vec3;

use repnet_server::{default_net_priority, ConnectionKey, NetViewer, NetworkObjectInfo, ReplicationHost};
use repnet_shared::{ActorId, BitWrite, OutBunch};

/// A replicated actor of the test world.
#[derive(Clone, Debug)]
pub struct TestActor {
    pub location: Vec3,
    /// Bytes written on every replication.
    pub state: Vec<u8>,
    pub reliable: bool,
    /// Relevant to every viewer when set.
    pub relevant: bool,
    pub initialized: bool,
}

impl TestActor {
    pub fn at(location: Vec3) -> Self {
        Self {
            location,
            state: vec![0xAB],
            reliable: false,
            relevant: true,
            initialized: true,
        }
    }
}

/// A world with one viewer per connection, standing at the origin and
/// looking down +X.
#[derive(Default)]
pub struct TestWorld {
    pub actors: BTreeMap<ActorId, TestActor>,
    /// Connections whose viewer has not spawned yet.
    pub hidden_connections: HashSet<ConnectionKey>,
    pub loaded_levels: HashSet<String>,
    /// Every replication the driver asked for, in order.
    pub replicated: Vec<(ActorId, ConnectionKey)>,
    /// Priorities computed in low bandwidth mode.
    pub low_bandwidth_priorities: Cell<usize>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, actor: ActorId, location: Vec3) -> &mut TestActor {
        self.actors.entry(actor).or_insert_with(|| TestActor::at(location))
    }

    pub fn actor_mut(&mut self, actor: ActorId) -> Option<&mut TestActor> {
        self.actors.get_mut(&actor)
    }

    pub fn replication_count(&self, actor: ActorId) -> usize {
        self.replicated.iter().filter(|(replicated, _)| *replicated == actor).count()
    }

    pub fn viewer() -> NetViewer {
        NetViewer {
            location: Vec3::ZERO,
            direction: Vec3::X,
            view_target: None,
            controller: None,
        }
    }
}

impl ReplicationHost for TestWorld {
    fn viewers(&self, connection: ConnectionKey) -> Vec<NetViewer> {
        if self.hidden_connections.contains(&connection) {
            return Vec::new();
        }
        vec![Self::viewer()]
    }

    fn actor_location(&self, actor: ActorId) -> Vec3 {
        self.actors.get(&actor).map_or(Vec3::ZERO, |actor| actor.location)
    }

    fn is_net_relevant_for(&self, actor: ActorId, _viewer: &NetViewer) -> bool {
        self.actors.get(&actor).is_some_and(|actor| actor.relevant)
    }

    fn replicate_actor(&mut self, actor: ActorId, connection: ConnectionKey, bunch: &mut OutBunch) -> bool {
        let Some(test_actor) = self.actors.get(&actor) else {
            return false;
        };
        bunch.flags.reliable = test_actor.reliable;
        for byte in &test_actor.state {
            bunch.write_byte(*byte);
        }
        self.replicated.push((actor, connection));
        !test_actor.state.is_empty()
    }

    fn net_priority(&self, info: &NetworkObjectInfo, viewer: &NetViewer, time: f32, low_bandwidth: bool) -> f32 {
        if low_bandwidth {
            self.low_bandwidth_priorities.set(self.low_bandwidth_priorities.get() + 1);
        }
        default_net_priority(
            info.actor,
            self.actor_location(info.actor),
            info.settings.net_priority,
            viewer,
            time,
        )
    }

    fn is_level_initialized(&self, level: &str, _connection: ConnectionKey) -> bool {
        self.loaded_levels.contains(level)
    }

    fn is_actor_initialized(&self, actor: ActorId) -> bool {
        self.actors.get(&actor).is_some_and(|actor| actor.initialized)
    }
}
