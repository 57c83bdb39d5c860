use glam::Vec3;

use repnet_shared::{ActorId, OutBunch};

use crate::{
    driver::{default_net_priority, ConnectionKey},
    world::NetworkObjectInfo,
};

/// A point of view a connection replicates for.
#[derive(Clone, Debug, PartialEq)]
pub struct NetViewer {
    pub location: Vec3,
    /// Unit view direction.
    pub direction: Vec3,
    /// What the viewer is looking at, usually its pawn.
    pub view_target: Option<ActorId>,
    pub controller: Option<ActorId>,
}

/// The game world as the net driver sees it. The driver decides who
/// replicates what and when; the host answers questions about actors and
/// writes their state.
pub trait ReplicationHost {
    /// Viewers of `connection`. A connection without viewers has no view
    /// target and replicates nothing.
    fn viewers(&self, connection: ConnectionKey) -> Vec<NetViewer>;

    fn actor_location(&self, actor: ActorId) -> Vec3;

    fn is_net_relevant_for(&self, actor: ActorId, viewer: &NetViewer) -> bool;

    /// Writes the actor's state for `connection` into `bunch` and sets its
    /// reliability. Returns false when there is nothing to send; an actor
    /// whose channel is not open yet is sent regardless.
    fn replicate_actor(&mut self, actor: ActorId, connection: ConnectionKey, bunch: &mut OutBunch) -> bool;

    /// Priority of `actor` for one viewer. `low_bandwidth` is set when the
    /// connection's rate is below `NetDriverConfig::low_bandwidth_net_speed`.
    fn net_priority(&self, info: &NetworkObjectInfo, viewer: &NetViewer, time: f32, _low_bandwidth: bool) -> f32 {
        default_net_priority(
            info.actor,
            self.actor_location(info.actor),
            info.settings.net_priority,
            viewer,
            time,
        )
    }

    /// Whether the client behind `connection` has loaded `level`.
    fn is_level_initialized(&self, _level: &str, _connection: ConnectionKey) -> bool {
        true
    }

    /// Spawned but not yet ready to replicate.
    fn is_actor_initialized(&self, _actor: ActorId) -> bool {
        true
    }

    /// For partially dormant actors: whether the actor may go dormant for
    /// this viewer.
    fn net_dormancy(&self, _actor: ActorId, _viewer: &NetViewer, _low_bandwidth: bool) -> bool {
        true
    }

    /// Whether an owner-only actor belongs to `connection`, beyond the owner
    /// recorded in its settings.
    fn is_relevancy_owner(&self, _actor: ActorId, _connection: ConnectionKey) -> bool {
        false
    }
}
