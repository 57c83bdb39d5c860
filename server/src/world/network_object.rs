use std::collections::{BTreeMap, HashSet};

use glam::Vec3;
use log::debug;

use repnet_shared::{ActorId, NetGuid};

use crate::driver::ConnectionKey;

/// When an actor may stop replicating to a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetDormancy {
    /// Never goes dormant.
    Never,
    /// Could go dormant, but is currently awake.
    #[default]
    Awake,
    /// Dormant on every connection.
    DormantAll,
    /// Dormant on connections for which the host agrees.
    DormantPartial,
    /// Placed in the level dormant; never replicated until flushed.
    Initial,
}

/// How an actor wants to replicate. Passed when the actor is added to the
/// driver.
#[derive(Clone, Debug)]
pub struct NetworkActorSettings {
    pub guid: NetGuid,
    /// Updates per second while the actor keeps changing.
    pub net_update_frequency: f32,
    /// Floor of the adaptive update rate. Zero means 2 updates per second.
    pub min_net_update_frequency: f32,
    pub net_priority: f32,
    pub dormancy: NetDormancy,
    /// Placed in the level rather than spawned at runtime.
    pub net_startup: bool,
    pub only_relevant_to_owner: bool,
    pub owner: Option<ConnectionKey>,
    pub level_name: Option<String>,
}

impl Default for NetworkActorSettings {
    fn default() -> Self {
        Self {
            guid: NetGuid::default(),
            net_update_frequency: 100.0,
            min_net_update_frequency: 2.0,
            net_priority: 1.0,
            dormancy: NetDormancy::Awake,
            net_startup: false,
            only_relevant_to_owner: false,
            owner: None,
            level_name: None,
        }
    }
}

/// Replication bookkeeping of one actor.
#[derive(Clone, Debug)]
pub struct NetworkObjectInfo {
    pub actor: ActorId,
    pub settings: NetworkActorSettings,
    /// Next time the actor is considered for replication.
    pub next_update_time: f64,
    /// Last time the actor asked for an update.
    pub last_net_update_time: f64,
    /// Last time the actor actually sent something. Zero until the first
    /// consideration.
    pub last_net_replicate_time: f64,
    /// Adaptive update interval.
    pub optimal_net_update_delta: f32,
    /// Consider the actor next tick regardless of `next_update_time`,
    /// because a connection could not take it this tick.
    pub pending_net_update: bool,
    pub force_relevant_next_update: bool,
    /// No longer replicates and is excluded from relevancy.
    pub tear_off: bool,
    pub dormant_connections: HashSet<ConnectionKey>,
    /// Connections the actor went dormant on since it last replicated.
    pub recently_dormant_connections: HashSet<ConnectionKey>,
}

impl NetworkObjectInfo {
    fn new(actor: ActorId, settings: NetworkActorSettings) -> Self {
        let optimal_net_update_delta = 1.0 / settings.net_update_frequency.max(f32::EPSILON);
        Self {
            actor,
            settings,
            next_update_time: 0.0,
            last_net_update_time: 0.0,
            last_net_replicate_time: 0.0,
            optimal_net_update_delta,
            pending_net_update: false,
            force_relevant_next_update: false,
            tear_off: false,
            dormant_connections: HashSet::new(),
            recently_dormant_connections: HashSet::new(),
        }
    }

    /// Interval the actor replicates at when it is busy.
    pub fn min_optimal_delta(&self) -> f32 {
        1.0 / self.settings.net_update_frequency.max(f32::EPSILON)
    }

    /// Slowest interval the adaptive rate may reach.
    pub fn max_optimal_delta(&self) -> f32 {
        let min_frequency = if self.settings.min_net_update_frequency <= 0.0 {
            2.0
        } else {
            self.settings.min_net_update_frequency
        };
        (1.0 / min_frequency).max(self.min_optimal_delta())
    }
}

/// Every actor the driver replicates, ordered by actor id.
#[derive(Default)]
pub struct NetworkObjectList {
    objects: BTreeMap<ActorId, NetworkObjectInfo>,
}

impl NetworkObjectList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `actor`. Returns false if it was already present.
    pub fn add(&mut self, actor: ActorId, settings: NetworkActorSettings) -> bool {
        if self.objects.contains_key(&actor) {
            return false;
        }
        debug!("adding {} ({}) to the network object list", actor, settings.guid);
        self.objects.insert(actor, NetworkObjectInfo::new(actor, settings));
        true
    }

    pub fn remove(&mut self, actor: ActorId) -> Option<NetworkObjectInfo> {
        self.objects.remove(&actor)
    }

    pub fn get(&self, actor: ActorId) -> Option<&NetworkObjectInfo> {
        self.objects.get(&actor)
    }

    pub fn get_mut(&mut self, actor: ActorId) -> Option<&mut NetworkObjectInfo> {
        self.objects.get_mut(&actor)
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.objects.contains_key(&actor)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkObjectInfo> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NetworkObjectInfo> {
        self.objects.values_mut()
    }

    /// Forgets `connection` in every dormancy set.
    pub fn remove_connection(&mut self, connection: ConnectionKey) {
        for info in self.objects.values_mut() {
            info.dormant_connections.remove(&connection);
            info.recently_dormant_connections.remove(&connection);
        }
    }
}

/// A destroyed actor the peers may still know about without a channel:
/// a level-placed actor, or one that was dormant when it died.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorDestructionInfo {
    pub guid: NetGuid,
    pub level_name: Option<String>,
    pub location: Vec3,
    /// Level-placed actors are also destroyed on connections that join later.
    pub net_startup: bool,
}
