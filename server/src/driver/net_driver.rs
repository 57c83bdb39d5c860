use std::{collections::HashMap, sync::Arc};

use log::{debug, info, trace, warn};

use repnet_shared::{
    ActorId, ChannelIndex, ClassNetCache, ClassNetCacheRegistry, Connection, ConnectionEvent,
    ConnectionState, ControlMessage, NetGuid, PacketSender, RemoteChannelPolicy, SchemaProvider,
    CONNECTION_READY_RECEIVE_WINDOW,
};

use crate::{
    driver::{
        client_connection::{ClientConnection, ConnectionKey},
        net_driver_config::NetDriverConfig,
        priority::{destruction_priority, sort_priorities, to_fixed_priority, ActorPriority, PriorityTarget},
    },
    error::DriverError,
    world::{
        ActorDestructionInfo, NetDormancy, NetViewer, NetworkActorSettings, NetworkObjectInfo,
        NetworkObjectList, ReplicationHost,
    },
};

/// Seconds without replicating before the adaptive rate starts to slow.
const SCALE_DOWN_START_TIME: f32 = 2.0;
/// Seconds over which the adaptive rate reaches its floor.
const SCALE_DOWN_TIME_RANGE: f32 = 5.0;
/// Already relevant actors are re-checked for relevancy this often.
const RELEVANCY_RECHECK_INTERVAL: f64 = 1.0;

/// Owns the client connections of a server and decides, every frame, which
/// actors replicate to which connection within each connection's bandwidth
/// budget.
pub struct NetDriver {
    config: NetDriverConfig,
    time: f64,
    connections: Vec<ClientConnection>,
    next_connection_key: u64,
    network_objects: NetworkObjectList,
    destroyed_startup_or_dormant: HashMap<NetGuid, ActorDestructionInfo>,
    class_net_cache: ClassNetCacheRegistry,
    events: Vec<(ConnectionKey, ConnectionEvent)>,
    delta_time_overflow: f32,
    replication_frame: u32,
    rng: fastrand::Rng,
}

impl NetDriver {
    pub fn new(config: NetDriverConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            config,
            time: 0.0,
            connections: Vec::new(),
            next_connection_key: 0,
            network_objects: NetworkObjectList::new(),
            destroyed_startup_or_dormant: HashMap::new(),
            class_net_cache: ClassNetCacheRegistry::new(),
            events: Vec::new(),
            delta_time_overflow: 0.0,
            replication_frame: 0,
            rng,
        }
    }

    pub fn config(&self) -> &NetDriverConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Incremented every time actors are replicated.
    pub fn replication_frame(&self) -> u32 {
        self.replication_frame
    }

    // Connections

    /// Accepts a new client. Level-placed actors destroyed before the client
    /// joined are queued for destruction on it.
    pub fn add_client_connection(&mut self, transport: Box<dyn PacketSender>) -> ConnectionKey {
        let key = ConnectionKey(self.next_connection_key);
        self.next_connection_key += 1;

        let mut connection = Connection::new(self.config.connection.clone(), transport, self.time);
        connection.set_remote_channel_policy(RemoteChannelPolicy::ControlOnly);
        let mut client = ClientConnection::new(key, connection);
        for (guid, destruction) in &self.destroyed_startup_or_dormant {
            if destruction.net_startup {
                client.destroyed_startup_or_dormant.insert(*guid);
            }
        }
        info!("Added client connection {}", key);
        self.connections.push(client);
        key
    }

    /// Closes and forgets a connection.
    pub fn remove_client_connection(&mut self, key: ConnectionKey) -> Result<(), DriverError> {
        let index = self.connection_index(key)?;
        let mut client = self.connections.remove(index);
        client.connection.close();
        self.network_objects.remove_connection(key);
        info!("Removed client connection {}", key);
        Ok(())
    }

    fn connection_index(&self, key: ConnectionKey) -> Result<usize, DriverError> {
        self.connections
            .iter()
            .position(|client| client.key() == key)
            .ok_or(DriverError::UnknownConnection { key })
    }

    pub fn client_connection(&self, key: ConnectionKey) -> Option<&ClientConnection> {
        self.connections.iter().find(|client| client.key() == key)
    }

    pub fn client_connection_mut(&mut self, key: ConnectionKey) -> Option<&mut ClientConnection> {
        self.connections.iter_mut().find(|client| client.key() == key)
    }

    /// Keys in the order connections are considered next frame.
    pub fn connection_keys(&self) -> Vec<ConnectionKey> {
        self.connections.iter().map(ClientConnection::key).collect()
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Hands a packet received from `key`'s peer to its connection.
    pub fn received_packet(&mut self, key: ConnectionKey, data: &[u8]) -> Result<(), DriverError> {
        let index = self.connection_index(key)?;
        self.connections[index].connection.received_raw_packet(data);
        self.process_connection_events(index);
        Ok(())
    }

    /// Connection events the driver does not consume itself, such as actor
    /// updates sent by clients.
    pub fn take_events(&mut self) -> Vec<(ConnectionKey, ConnectionEvent)> {
        std::mem::take(&mut self.events)
    }

    fn process_connection_events(&mut self, index: usize) {
        let key = self.connections[index].key();
        let events = self.connections[index].connection.take_events();
        for event in events {
            match &event {
                ConnectionEvent::ControlMessage(ControlMessage::Hello { network_version, .. }) => {
                    self.handle_hello(index, *network_version);
                }
                ConnectionEvent::ControlMessage(ControlMessage::Join) => {
                    let client = &mut self.connections[index];
                    client.joined = true;
                    client.connection.set_open();
                    info!("{} joined", key);
                }
                ConnectionEvent::ActorUpdateLost { actor } => {
                    if let Some(info) = self.network_objects.get_mut(*actor) {
                        trace!("{} marked for a pending update after loss", actor);
                        info.pending_net_update = true;
                    }
                }
                ConnectionEvent::ActorDormant { actor, .. } => {
                    if let Some(info) = self.network_objects.get_mut(*actor) {
                        info.dormant_connections.insert(key);
                        info.recently_dormant_connections.insert(key);
                    }
                }
                ConnectionEvent::Closed => info!("{} closed", key),
                _ => {}
            }
            self.events.push((key, event));
        }
    }

    fn handle_hello(&mut self, index: usize, remote_network_version: u32) {
        let client = &mut self.connections[index];
        let key = client.key();
        if remote_network_version != self.config.network_version {
            warn!(
                "{} has network version {}, expected {}",
                key, remote_network_version, self.config.network_version
            );
            let upgrade = ControlMessage::Upgrade {
                remote_network_version: self.config.network_version,
            };
            if let Err(err) = client.connection.send_control_message(&upgrade) {
                debug!("Could not send upgrade to {}: {}", key, err);
            }
            client.connection.flush_net();
            client.connection.close();
            return;
        }

        let welcome = ControlMessage::Welcome {
            level: self.config.level_name.clone(),
            game_mode: self.config.game_mode.clone(),
        };
        if let Err(err) = client.connection.send_control_message(&welcome) {
            warn!("Could not welcome {}: {}", key, err);
        }
    }

    // Actors

    pub fn add_network_actor(&mut self, actor: ActorId, settings: NetworkActorSettings) -> Result<(), DriverError> {
        if !self.network_objects.add(actor, settings) {
            return Err(DriverError::DuplicateActor { actor });
        }
        Ok(())
    }

    pub fn network_object(&self, actor: ActorId) -> Option<&NetworkObjectInfo> {
        self.network_objects.get(actor)
    }

    pub fn network_objects(&self) -> &NetworkObjectList {
        &self.network_objects
    }

    fn network_object_mut(&mut self, actor: ActorId) -> Result<&mut NetworkObjectInfo, DriverError> {
        self.network_objects
            .get_mut(actor)
            .ok_or(DriverError::UnknownActor { actor })
    }

    /// Makes the actor replicate on the next frame.
    pub fn force_net_update(&mut self, actor: ActorId) -> Result<(), DriverError> {
        let time = self.time;
        let info = self.network_object_mut(actor)?;
        force_net_update(info, time);
        if info.settings.dormancy > NetDormancy::Awake {
            self.flush_actor_dormancy(actor)?;
        }
        Ok(())
    }

    /// The actor stops replicating; its channels close once it has sent its
    /// final state.
    pub fn tear_off_actor(&mut self, actor: ActorId) -> Result<(), DriverError> {
        let time = self.time;
        let info = self.network_object_mut(actor)?;
        info.tear_off = true;
        force_net_update(info, time);
        Ok(())
    }

    /// Wakes a dormant actor on every connection. Its dormancy setting is
    /// unchanged, so it goes dormant again after replicating.
    pub fn flush_actor_dormancy(&mut self, actor: ActorId) -> Result<(), DriverError> {
        let info = self.network_object_mut(actor)?;
        if info.settings.dormancy == NetDormancy::Initial {
            info.settings.dormancy = NetDormancy::DormantAll;
        }
        info.dormant_connections.clear();
        for client in &mut self.connections {
            client.connection.flush_dormancy(actor);
        }
        debug!("flushed dormancy of {}", actor);
        Ok(())
    }

    pub fn is_network_actor_update_frequency_throttled(&self, actor: ActorId) -> bool {
        if !self.config.adaptive_net_update_frequency {
            return false;
        }
        self.network_objects.get(actor).is_some_and(|info| {
            info.last_net_replicate_time != 0.0 && info.optimal_net_update_delta > info.min_optimal_delta()
        })
    }

    /// Restores the actor's full update rate and schedules it soon.
    pub fn cancel_adaptive_replication(&mut self, actor: ActorId) -> Result<(), DriverError> {
        if !self.config.adaptive_net_update_frequency {
            return Ok(());
        }
        let jitter = 0.5 + 0.5 * self.rng.f64();
        let time = self.time;
        let info = self.network_object_mut(actor)?;
        let expected = info.min_optimal_delta();
        info.next_update_time = time + jitter * f64::from(expected);
        info.optimal_net_update_delta = expected;
        Ok(())
    }

    /// Removes a destroyed actor. Its channels close; connections that know
    /// the actor without a channel (level-placed or dormant actors) get a
    /// destruction entry instead.
    pub fn notify_actor_destroyed(&mut self, actor: ActorId, location: glam::Vec3) -> Result<(), DriverError> {
        let info = self
            .network_objects
            .remove(actor)
            .ok_or(DriverError::UnknownActor { actor })?;
        let guid = info.settings.guid;
        let destruction = ActorDestructionInfo {
            guid,
            level_name: info.settings.level_name.clone(),
            location,
            net_startup: info.settings.net_startup,
        };
        if destruction.net_startup {
            self.destroyed_startup_or_dormant.insert(guid, destruction.clone());
        }

        for client in &mut self.connections {
            let key = client.key();
            if let Some(ch_index) = client.connection.actor_channel_index(actor) {
                if let Err(err) = client.connection.close_channel(ch_index) {
                    debug!("Could not close channel {} of {} on {}: {}", ch_index, actor, key, err);
                }
                continue;
            }
            let knew_dormant =
                info.dormant_connections.contains(&key) || info.recently_dormant_connections.contains(&key);
            if destruction.net_startup || knew_dormant {
                self.destroyed_startup_or_dormant
                    .entry(guid)
                    .or_insert_with(|| destruction.clone());
                client.destroyed_startup_or_dormant.insert(guid);
            }
        }
        debug!("{} destroyed", actor);
        Ok(())
    }

    pub fn destruction_info(&self, guid: NetGuid) -> Option<&ActorDestructionInfo> {
        self.destroyed_startup_or_dormant.get(&guid)
    }

    // Class net caches

    /// Net field cache of `class`, built from `provider` on first use.
    pub fn class_net_cache(
        &mut self,
        provider: &dyn SchemaProvider,
        class: &str,
    ) -> Result<Arc<ClassNetCache>, DriverError> {
        Ok(self.class_net_cache.get_class_net_cache(provider, class)?)
    }

    /// Drops every class net cache. Call after class layouts change.
    pub fn clear_class_net_cache(&mut self) {
        self.class_net_cache.clear();
    }

    // Ticking

    /// Advances the driver clock. Call before handing it this frame's
    /// received packets.
    pub fn tick_dispatch(&mut self, delta: f32) {
        self.time += f64::from(delta);
        for client in &mut self.connections {
            client.connection.set_time(self.time);
        }
    }

    /// Replicates actors, ticks every connection and drops closed ones.
    /// Returns how many actor replications were attempted.
    pub fn tick_flush(&mut self, delta: f32, host: &mut dyn ReplicationHost) -> usize {
        let updated = self.server_replicate_actors(delta, host);

        for index in 0..self.connections.len() {
            self.connections[index].connection.tick(self.time);
            self.process_connection_events(index);
        }

        let mut closed = Vec::new();
        self.connections.retain(|client| {
            let open = client.connection.state() != ConnectionState::Closed;
            if !open {
                closed.push(client.key());
            }
            open
        });
        for key in closed {
            info!("Dropping closed connection {}", key);
            self.network_objects.remove_connection(key);
        }
        updated
    }

    /// One replication pass over every connection.
    pub fn server_replicate_actors(&mut self, delta: f32, host: &mut dyn ReplicationHost) -> usize {
        if self.connections.is_empty() {
            return 0;
        }
        self.replication_frame = self.replication_frame.wrapping_add(1);

        let num_clients_to_tick = self.prep_connections(delta, host);
        if num_clients_to_tick == 0 {
            return 0;
        }

        let server_tick_time = if self.config.net_server_max_tick_rate <= 0.0 {
            delta
        } else {
            1.0 / self.config.net_server_max_tick_rate
        };
        let consider_list = self.build_consider_list(server_tick_time, host);

        let mut updated = 0;
        for index in 0..self.connections.len() {
            if index >= num_clients_to_tick {
                self.mark_skipped_connection_pending(index, &consider_list);
            } else if self.connections[index].has_view_target() {
                let priorities = self.prioritize_actors(index, &consider_list, host);
                let processed = self.process_prioritized_actors(index, &priorities, host, &mut updated);
                self.defer_unprocessed(index, &priorities[processed..], host);
            }
        }

        // connections ticked this frame go to the back of the line
        if num_clients_to_tick < self.connections.len() {
            self.connections.rotate_left(num_clients_to_tick);
        }
        updated
    }

    /// Finds each connection's viewers. Returns how many connections may
    /// tick this frame, zero if none is ready.
    fn prep_connections(&mut self, delta: f32, host: &dyn ReplicationHost) -> usize {
        let mut num_clients_to_tick = self.connections.len();

        if self.config.limit_client_ticks {
            let updates_this_frame = self.config.net_client_ticks_per_second * (delta + self.delta_time_overflow);
            num_clients_to_tick = num_clients_to_tick.min(updates_this_frame.max(0.0) as usize);
            if num_clients_to_tick == 0 {
                self.delta_time_overflow += delta;
                return 0;
            }
            self.delta_time_overflow = 0.0;
        }

        let mut found_ready_connection = false;
        for client in &mut self.connections {
            let ready = client.connection.state() == ConnectionState::Open
                && self.time - client.connection.last_receive_time() < CONNECTION_READY_RECEIVE_WINDOW;
            if ready {
                client.viewers = host.viewers(client.key());
                found_ready_connection |= client.has_view_target();
            } else {
                client.viewers.clear();
            }
        }

        if found_ready_connection {
            num_clients_to_tick
        } else {
            0
        }
    }

    /// Actors due for an update this frame. Schedules their next update.
    fn build_consider_list(&mut self, server_tick_time: f32, host: &dyn ReplicationHost) -> Vec<ActorId> {
        let time = self.time;
        let adaptive = self.config.adaptive_net_update_frequency;
        let mut consider_list = Vec::with_capacity(self.network_objects.len());

        for info in self.network_objects.iter_mut() {
            if !info.pending_net_update && time <= info.next_update_time {
                continue;
            }
            if !host.is_actor_initialized(info.actor) {
                continue;
            }
            // level-placed actors that start dormant wait for a flush
            if info.settings.dormancy == NetDormancy::Initial && info.settings.net_startup {
                continue;
            }

            if info.last_net_replicate_time == 0.0 {
                info.last_net_replicate_time = time;
                info.optimal_net_update_delta = info.min_optimal_delta();
            }

            let last_replicate_delta = (time - info.last_net_replicate_time) as f32;
            if last_replicate_delta > SCALE_DOWN_START_TIME {
                let alpha =
                    ((last_replicate_delta - SCALE_DOWN_START_TIME) / SCALE_DOWN_TIME_RANGE).clamp(0.0, 1.0);
                let min_delta = info.min_optimal_delta();
                let max_delta = info.max_optimal_delta();
                info.optimal_net_update_delta = min_delta + (max_delta - min_delta) * alpha;
            }

            // a pending update keeps the schedule it already had
            if !info.pending_net_update {
                let next_update_delta = if adaptive {
                    info.optimal_net_update_delta
                } else {
                    info.min_optimal_delta()
                };
                info.next_update_time =
                    time + self.rng.f64() * f64::from(server_tick_time) + f64::from(next_update_delta);
                info.last_net_update_time = time;
            }
            info.pending_net_update = false;
            consider_list.push(info.actor);
        }

        trace!("considering {} of {} actors", consider_list.len(), self.network_objects.len());
        consider_list
    }

    /// A connection skipped by throttling keeps actors it has not seen the
    /// latest state of pending, so they are considered again next frame.
    fn mark_skipped_connection_pending(&mut self, index: usize, consider_list: &[ActorId]) {
        let connection = &self.connections[index].connection;
        for actor in consider_list {
            let Some(info) = self.network_objects.get_mut(*actor) else {
                continue;
            };
            if info.pending_net_update {
                continue;
            }
            let stale = actor_channel_times(connection, connection.actor_channel_index(*actor))
                .is_some_and(|(_, last_update_time)| last_update_time < info.last_net_update_time);
            if stale {
                info.pending_net_update = true;
            }
        }
    }

    fn prioritize_actors(
        &mut self,
        index: usize,
        consider_list: &[ActorId],
        host: &dyn ReplicationHost,
    ) -> Vec<ActorPriority> {
        let NetDriver {
            config,
            time,
            connections,
            network_objects,
            destroyed_startup_or_dormant,
            ..
        } = self;
        let time = *time;
        let client = &mut connections[index];
        let key = client.key();
        client.tick_count += 1;
        let low_bandwidth = client.connection.current_net_speed() < config.low_bandwidth_net_speed;

        let mut priorities = Vec::with_capacity(consider_list.len() + client.destroyed_startup_or_dormant.len());

        for actor in consider_list {
            let actor = *actor;
            let Some(info) = network_objects.get(actor) else {
                continue;
            };
            let ch_index = client.connection.actor_channel_index(actor);
            let channel_times = actor_channel_times(&client.connection, ch_index);

            if info.settings.only_relevant_to_owner {
                let owned = info.settings.owner == Some(key) || host.is_relevancy_owner(actor, key);
                if !owned {
                    if let (Some(ch_index), Some((relevant_time, _))) = (ch_index, channel_times) {
                        if time - relevant_time >= config.relevant_timeout {
                            debug!("closing channel {} of {}, not owned by {}", ch_index, actor, key);
                            if let Err(err) = client.connection.close_channel(ch_index) {
                                debug!("Could not close channel {}: {}", ch_index, err);
                            }
                        }
                    }
                    continue;
                }
            } else if config.dormancy_enabled {
                if info.dormant_connections.contains(&key) {
                    continue;
                }
                if should_go_dormant(info, &client.viewers, &client.connection, ch_index, low_bandwidth, host) {
                    trace!("{} starting to become dormant on {}", actor, key);
                    client.connection.start_becoming_dormant(actor);
                }
            }

            if ch_index.is_none() {
                if !is_level_initialized(host, info, key) {
                    continue;
                }
                if !is_actor_relevant(host, actor, &client.viewers) {
                    continue;
                }
            }

            let wait_time = match channel_times {
                Some((_, last_update_time)) => (time - last_update_time) as f32,
                None => config.spawn_priority_seconds,
            };
            let priority = client
                .viewers
                .iter()
                .map(|viewer| to_fixed_priority(host.net_priority(info, viewer, wait_time, low_bandwidth)))
                .max()
                .unwrap_or(0)
                .max(0);
            priorities.push(ActorPriority {
                priority,
                target: PriorityTarget::Actor { actor, ch_index },
            });
        }

        for guid in &client.destroyed_startup_or_dormant {
            let Some(destruction) = destroyed_startup_or_dormant.get(guid) else {
                continue;
            };
            let priority = client
                .viewers
                .iter()
                .map(|viewer| {
                    to_fixed_priority(destruction_priority(
                        destruction.location,
                        viewer,
                        config.spawn_priority_seconds,
                    ))
                })
                .max()
                .unwrap_or(0);
            priorities.push(ActorPriority {
                priority,
                target: PriorityTarget::Destruction { guid: *guid },
            });
        }

        sort_priorities(&mut priorities);
        trace!("{} prioritized {} entries", key, priorities.len());
        priorities
    }

    /// Walks the sorted list until the connection saturates. Returns how
    /// many entries were processed.
    fn process_prioritized_actors(
        &mut self,
        index: usize,
        priorities: &[ActorPriority],
        host: &mut dyn ReplicationHost,
        updated: &mut usize,
    ) -> usize {
        let NetDriver {
            config,
            time,
            connections,
            network_objects,
            destroyed_startup_or_dormant,
            rng,
            ..
        } = self;
        let time = *time;
        let client = &mut connections[index];
        let key = client.key();

        if !client.connection.is_net_ready(false) {
            trace!("{} saturated, replicating nothing", key);
            return 0;
        }

        for (position, entry) in priorities.iter().enumerate() {
            let (actor, listed_channel) = match entry.target {
                PriorityTarget::Destruction { guid } => {
                    let Some(destruction) = destroyed_startup_or_dormant.get(&guid) else {
                        continue;
                    };
                    if let Some(level) = &destruction.level_name {
                        if !client.is_level_visible(level) {
                            continue;
                        }
                    }
                    match client.connection.send_actor_destruction(guid) {
                        Ok(ch_index) => {
                            debug!("sent destruction of {} to {} on channel {}", guid, key, ch_index);
                            client.destroyed_startup_or_dormant.remove(&guid);
                        }
                        Err(err) => debug!("Could not send destruction of {} to {}: {}", guid, key, err),
                    }
                    if !client.connection.is_net_ready(false) {
                        trace!("{} saturated by destructions after {} entries", key, position + 1);
                        return position + 1;
                    }
                    continue;
                }
                PriorityTarget::Actor { actor, ch_index } => (actor, ch_index),
            };

            let Some(info) = network_objects.get_mut(actor) else {
                continue;
            };

            // the channel may have closed while prioritizing
            let mut ch_index = client.connection.actor_channel_index(actor);
            if listed_channel.is_some() && ch_index != listed_channel {
                continue;
            }

            let level_initialized = is_level_initialized(host, info, key);
            let channel_times = actor_channel_times(&client.connection, ch_index);

            let mut is_relevant = false;
            if level_initialized && !info.tear_off {
                let recheck = channel_times
                    .map_or(true, |(relevant_time, _)| time - relevant_time > RELEVANCY_RECHECK_INTERVAL);
                if recheck && is_actor_relevant(host, actor, &client.viewers) {
                    is_relevant = true;
                }
            }

            let is_recently_relevant = is_relevant
                || channel_times.is_some_and(|(relevant_time, _)| time - relevant_time < config.relevant_timeout)
                || info.force_relevant_next_update;
            info.force_relevant_next_update = false;

            if is_recently_relevant {
                if ch_index.is_none() {
                    if level_initialized {
                        match client.connection.open_actor_channel(actor, info.settings.guid) {
                            Ok(opened) => ch_index = Some(opened),
                            Err(err) => debug!("Could not open a channel for {} on {}: {}", actor, key, err),
                        }
                    } else if info.settings.net_update_frequency < 1.0 {
                        info.next_update_time = time + 0.2 * rng.f64();
                    }
                }

                if let Some(ch_index) = ch_index {
                    if is_relevant {
                        set_relevant_time(&mut client.connection, ch_index, time + 0.5 * rng.f64());
                    }
                    if client.connection.channel_is_net_ready(ch_index, false) {
                        if replicate_actor(&mut client.connection, ch_index, actor, key, time, host) {
                            let min_delta = info.min_optimal_delta();
                            let max_delta = info.max_optimal_delta();
                            let between = (time - info.last_net_replicate_time) as f32;
                            info.optimal_net_update_delta = (between * 0.7).clamp(min_delta, max_delta);
                            info.last_net_replicate_time = time;
                        }
                        *updated += 1;
                    } else {
                        trace!("channel {} of {} saturated, forcing a pending update", ch_index, actor);
                        force_net_update(info, time);
                    }

                    if !client.connection.is_net_ready(false) {
                        trace!("{} saturated after {} entries", key, position + 1);
                        return position + 1;
                    }
                }
            }

            if (!is_recently_relevant || info.tear_off) && ch_index.is_some() {
                // level-placed actors keep their channels
                if !level_initialized || !info.settings.net_startup {
                    if let Some(ch_index) = ch_index {
                        debug!("closing channel {} of no longer relevant {}", ch_index, actor);
                        if let Err(err) = client.connection.close_channel(ch_index) {
                            debug!("Could not close channel {}: {}", ch_index, err);
                        }
                    }
                }
            }
        }
        priorities.len()
    }

    /// Relevant actors a saturated connection could not take this frame are
    /// considered again next frame.
    fn defer_unprocessed(&mut self, index: usize, remaining: &[ActorPriority], host: &dyn ReplicationHost) {
        let NetDriver {
            time,
            connections,
            network_objects,
            rng,
            ..
        } = self;
        let time = *time;
        let client = &mut connections[index];

        for entry in remaining {
            let PriorityTarget::Actor { actor, .. } = entry.target else {
                continue;
            };
            let Some(info) = network_objects.get_mut(actor) else {
                continue;
            };
            let ch_index = client.connection.actor_channel_index(actor);
            let channel_times = actor_channel_times(&client.connection, ch_index);

            if channel_times.is_some_and(|(relevant_time, _)| time - relevant_time <= RELEVANCY_RECHECK_INTERVAL) {
                trace!("{} deferred to the next frame", actor);
                info.pending_net_update = true;
            } else if is_actor_relevant(host, actor, &client.viewers) {
                trace!("{} deferred to the next frame", actor);
                info.pending_net_update = true;
                if let Some(ch_index) = ch_index {
                    set_relevant_time(&mut client.connection, ch_index, time + 0.5 * rng.f64());
                }
            }
        }
    }
}

fn force_net_update(info: &mut NetworkObjectInfo, time: f64) {
    info.pending_net_update = true;
    info.next_update_time = info.next_update_time.min(time - 0.01);
}

/// Relevant and last update times of an actor channel.
fn actor_channel_times(connection: &Connection, ch_index: Option<ChannelIndex>) -> Option<(f64, f64)> {
    let actor_channel = connection.channel(ch_index?)?.actor_channel()?;
    Some((actor_channel.relevant_time(), actor_channel.last_update_time()))
}

fn set_relevant_time(connection: &mut Connection, ch_index: ChannelIndex, relevant_time: f64) {
    if let Some(actor_channel) = connection
        .channel_mut(ch_index)
        .and_then(|channel| channel.actor_channel_mut())
    {
        actor_channel.set_relevant_time(relevant_time);
    }
}

fn is_actor_relevant(host: &dyn ReplicationHost, actor: ActorId, viewers: &[NetViewer]) -> bool {
    viewers.iter().any(|viewer| host.is_net_relevant_for(actor, viewer))
}

fn is_level_initialized(host: &dyn ReplicationHost, info: &NetworkObjectInfo, key: ConnectionKey) -> bool {
    info.settings
        .level_name
        .as_deref()
        .map_or(true, |level| host.is_level_initialized(level, key))
}

fn should_go_dormant(
    info: &NetworkObjectInfo,
    viewers: &[NetViewer],
    connection: &Connection,
    ch_index: Option<ChannelIndex>,
    low_bandwidth: bool,
    host: &dyn ReplicationHost,
) -> bool {
    if info.settings.dormancy <= NetDormancy::Awake {
        return false;
    }
    let Some(channel) = ch_index.and_then(|ch_index| connection.channel(ch_index)) else {
        return false;
    };
    if channel.is_pending_dormancy() || channel.is_dormant() {
        return false;
    }
    if info.settings.dormancy == NetDormancy::DormantPartial {
        return viewers.iter().all(|viewer| host.net_dormancy(info.actor, viewer, low_bandwidth));
    }
    true
}

/// Asks the host for the actor's state and sends it. A channel that has not
/// opened yet always sends, reliably. Returns whether a bunch went out.
fn replicate_actor(
    connection: &mut Connection,
    ch_index: ChannelIndex,
    actor: ActorId,
    key: ConnectionKey,
    time: f64,
    host: &mut dyn ReplicationHost,
) -> bool {
    let opening = connection
        .channel(ch_index)
        .is_some_and(|channel| channel.open_packet_id().is_none());
    let mut bunch = match connection.new_bunch(ch_index, false) {
        Ok(bunch) => bunch,
        Err(err) => {
            debug!("No bunch for {} on channel {}: {}", actor, ch_index, err);
            return false;
        }
    };
    if bunch.is_error() {
        return false;
    }

    let wrote = host.replicate_actor(actor, key, &mut bunch);
    if let Some(actor_channel) = connection
        .channel_mut(ch_index)
        .and_then(|channel| channel.actor_channel_mut())
    {
        actor_channel.set_last_update_time(time);
    }
    if !wrote && !opening {
        return false;
    }
    if opening {
        bunch.flags.reliable = true;
    }
    if bunch.is_error() {
        warn!("State of {} does not fit a bunch, not sending it", actor);
        return false;
    }

    match connection.send_bunch(bunch, true) {
        Ok(_) => true,
        Err(err) => {
            warn!("Failed to replicate {} on channel {}: {}", actor, ch_index, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_with_actor() -> (NetDriver, ActorId) {
        let mut driver = NetDriver::new(NetDriverConfig {
            seed: Some(1),
            ..Default::default()
        });
        let actor = ActorId(4);
        driver
            .add_network_actor(
                actor,
                NetworkActorSettings {
                    guid: NetGuid(4),
                    net_update_frequency: 10.0,
                    min_net_update_frequency: 1.0,
                    dormancy: NetDormancy::DormantAll,
                    ..Default::default()
                },
            )
            .unwrap();
        (driver, actor)
    }

    #[test]
    fn force_net_update_schedules_now() {
        let (mut driver, actor) = driver_with_actor();
        driver.tick_dispatch(2.0);
        driver.network_objects.get_mut(actor).unwrap().next_update_time = 10.0;

        driver.force_net_update(actor).unwrap();

        let info = driver.network_object(actor).unwrap();
        assert!(info.pending_net_update);
        assert!(info.next_update_time < driver.time());
    }

    #[test]
    fn throttled_actor_is_restored_by_cancel() {
        let (mut driver, actor) = driver_with_actor();
        driver.tick_dispatch(1.0);
        {
            let info = driver.network_objects.get_mut(actor).unwrap();
            info.last_net_replicate_time = 0.5;
            info.optimal_net_update_delta = info.max_optimal_delta();
        }
        assert!(driver.is_network_actor_update_frequency_throttled(actor));

        driver.cancel_adaptive_replication(actor).unwrap();

        let info = driver.network_object(actor).unwrap();
        assert_eq!(info.optimal_net_update_delta, info.min_optimal_delta());
        assert!(info.next_update_time <= driver.time() + f64::from(info.min_optimal_delta()));
        assert!(!driver.is_network_actor_update_frequency_throttled(actor));
    }

    #[test]
    fn unknown_actor_is_an_error() {
        let (mut driver, _) = driver_with_actor();
        let missing = ActorId(99);

        assert!(matches!(
            driver.tear_off_actor(missing),
            Err(DriverError::UnknownActor { actor }) if actor == missing
        ));
        assert!(driver.flush_actor_dormancy(missing).is_err());
        assert!(driver.notify_actor_destroyed(missing, glam::Vec3::ZERO).is_err());
    }

    #[test]
    fn destroyed_startup_actor_is_remembered() {
        let mut driver = NetDriver::new(NetDriverConfig::default());
        let actor = ActorId(1);
        let settings = NetworkActorSettings {
            guid: NetGuid(11),
            net_startup: true,
            level_name: Some("Arena".to_string()),
            ..Default::default()
        };
        driver.add_network_actor(actor, settings).unwrap();

        driver.notify_actor_destroyed(actor, glam::Vec3::new(1.0, 2.0, 3.0)).unwrap();

        let destruction = driver.destruction_info(NetGuid(11)).unwrap();
        assert_eq!(destruction.level_name.as_deref(), Some("Arena"));
        assert!(driver.network_object(actor).is_none());
    }
}
