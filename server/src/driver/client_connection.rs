use std::{
    collections::{BTreeSet, HashSet},
    fmt,
};

use repnet_shared::{Connection, NetGuid};

use crate::world::NetViewer;

/// Identifies a client connection of a driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey(pub u64);

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({})", self.0)
    }
}

/// A connection plus the driver's per-client replication state.
pub struct ClientConnection {
    key: ConnectionKey,
    pub connection: Connection,
    /// Viewers found when connections were prepared this frame. Empty means
    /// no view target.
    pub(crate) viewers: Vec<NetViewer>,
    /// Destroyed actors this client has to be told about.
    pub(crate) destroyed_startup_or_dormant: BTreeSet<NetGuid>,
    pub(crate) visible_levels: HashSet<String>,
    pub(crate) joined: bool,
    pub(crate) tick_count: u64,
}

impl ClientConnection {
    pub(crate) fn new(key: ConnectionKey, connection: Connection) -> Self {
        Self {
            key,
            connection,
            viewers: Vec::new(),
            destroyed_startup_or_dormant: BTreeSet::new(),
            visible_levels: HashSet::new(),
            joined: false,
            tick_count: 0,
        }
    }

    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    pub fn has_view_target(&self) -> bool {
        !self.viewers.is_empty()
    }

    /// Has the client sent `Join` since its handshake.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn pending_destructions(&self) -> impl Iterator<Item = &NetGuid> {
        self.destroyed_startup_or_dormant.iter()
    }

    /// Records that the client finished loading `level`, so destruction
    /// entries from it may be sent.
    pub fn add_visible_level(&mut self, level: &str) {
        self.visible_levels.insert(level.to_string());
    }

    pub fn remove_visible_level(&mut self, level: &str) {
        self.visible_levels.remove(level);
    }

    pub fn is_level_visible(&self, level: &str) -> bool {
        self.visible_levels.contains(level)
    }
}
