use std::cmp::Ordering;

use glam::Vec3;

use repnet_shared::{ActorId, ChannelIndex, NetGuid};

use crate::world::NetViewer;

/// Distance below which an actor behind the viewer still counts as close.
pub const CLOSE_PROXIMITY: f32 = 500.0;
pub const NEAR_SIGHT_THRESHOLD: f32 = 2000.0;
pub const MED_SIGHT_THRESHOLD: f32 = 3162.0;
pub const FAR_SIGHT_THRESHOLD: f32 = 8000.0;

/// Fixed-point scale applied to float priorities before sorting.
pub const PRIORITY_SCALE: f32 = 65536.0;

/// What a prioritized entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityTarget {
    Actor {
        actor: ActorId,
        ch_index: Option<ChannelIndex>,
    },
    /// Tells the connection to destroy an actor it has no channel for.
    Destruction { guid: NetGuid },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActorPriority {
    pub priority: i32,
    pub target: PriorityTarget,
}

impl ActorPriority {
    pub fn actor(&self) -> Option<ActorId> {
        match self.target {
            PriorityTarget::Actor { actor, .. } => Some(actor),
            PriorityTarget::Destruction { .. } => None,
        }
    }
}

/// Higher priority first. Equal priorities put actors before destruction
/// entries, then order by ascending actor id or net guid, so the order
/// never depends on how the list was built.
pub fn compare_actor_priority(a: &ActorPriority, b: &ActorPriority) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| match (a.target, b.target) {
        (PriorityTarget::Actor { actor: left, .. }, PriorityTarget::Actor { actor: right, .. }) => left.cmp(&right),
        (PriorityTarget::Actor { .. }, PriorityTarget::Destruction { .. }) => Ordering::Less,
        (PriorityTarget::Destruction { .. }, PriorityTarget::Actor { .. }) => Ordering::Greater,
        (PriorityTarget::Destruction { guid: left }, PriorityTarget::Destruction { guid: right }) => left.cmp(&right),
    })
}

pub fn sort_priorities(list: &mut [ActorPriority]) {
    list.sort_by(compare_actor_priority);
}

pub fn to_fixed_priority(priority: f32) -> i32 {
    (PRIORITY_SCALE * priority).round() as i32
}

/// Distance and facing weighted priority of an actor at `location`, as seen
/// by `viewer`. `time` is how long the actor has waited for an update. The
/// viewer's own view target is always boosted.
pub fn default_net_priority(
    actor: ActorId,
    location: Vec3,
    net_priority: f32,
    viewer: &NetViewer,
    time: f32,
) -> f32 {
    let mut time = time;
    if viewer.view_target == Some(actor) || viewer.controller == Some(actor) {
        return 4.0 * net_priority * time;
    }

    let dir = location - viewer.location;
    let dist_sq = dir.length_squared();
    let facing = viewer.direction.dot(dir);
    if facing < 0.0 {
        if dist_sq > NEAR_SIGHT_THRESHOLD * NEAR_SIGHT_THRESHOLD {
            time *= 0.2;
        } else if dist_sq > CLOSE_PROXIMITY * CLOSE_PROXIMITY {
            time *= 0.4;
        }
    } else if dist_sq < FAR_SIGHT_THRESHOLD * FAR_SIGHT_THRESHOLD && facing * facing > 0.5 * dist_sq {
        time *= 2.0;
    } else if dist_sq > MED_SIGHT_THRESHOLD * MED_SIGHT_THRESHOLD {
        time *= 0.4;
    }
    net_priority * time
}

/// Priority of a destruction entry at the position the actor died.
pub fn destruction_priority(location: Vec3, viewer: &NetViewer, spawn_priority_seconds: f32) -> f32 {
    let mut time = spawn_priority_seconds;
    let dir = location - viewer.location;
    let dist_sq = dir.length_squared();
    if viewer.direction.dot(dir) < 0.0 {
        if dist_sq > NEAR_SIGHT_THRESHOLD * NEAR_SIGHT_THRESHOLD {
            time *= 0.2;
        } else if dist_sq > CLOSE_PROXIMITY * CLOSE_PROXIMITY {
            time *= 0.4;
        }
    } else if dist_sq > MED_SIGHT_THRESHOLD * MED_SIGHT_THRESHOLD {
        time *= 0.4;
    }
    time
}
