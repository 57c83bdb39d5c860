/// Tests for server side actor replication through the net driver
/// Covers channel opening, bandwidth saturation fairness, destruction of
/// level actors for late joiners, destroyed actors and dormancy

use glam::Vec3;

use repnet_server::{NetDormancy, NetDriverConfig, NetworkActorSettings};
use repnet_shared::{ActorId, ConnectionEvent, NetGuid};
use repnet_test::{
    assert_client_event, assert_no_client_event, complete_handshakes, exchange_packets_n_times,
    tick_and_exchange, TestClient, TestServer,
};

fn joined_server() -> (TestServer, TestClient) {
    let mut server = TestServer::new();
    let mut client = server.connect();
    assert!(complete_handshakes(&mut server, &mut [&mut client], 10));
    server.world.replicated.clear();
    (server, client)
}

fn count_opened(client: &TestClient, guid: u32) -> usize {
    client.opened_guids().into_iter().filter(|opened| *opened == guid).count()
}

#[test]
fn relevant_actor_opens_a_channel_and_replicates() {
    let (mut server, mut client) = joined_server();
    let actor = server.spawn_actor(1, Vec3::new(100.0, 0.0, 0.0), NetworkActorSettings::default());

    exchange_packets_n_times(&mut server, &mut [&mut client], 3);

    assert_client_event!(client, ConnectionEvent::ActorOpened { guid: NetGuid(1), .. });
    assert!(client.events.iter().any(|event| matches!(
        event,
        ConnectionEvent::ActorUpdate { guid: NetGuid(1), payload, .. } if payload == &vec![0xAB]
    )));
    assert!(server.world.replication_count(actor) >= 1);
    assert!(server
        .driver
        .client_connection(client.key)
        .unwrap()
        .connection
        .actor_channel_index(actor)
        .is_some());
}

#[test]
fn irrelevant_actor_is_not_replicated() {
    let (mut server, mut client) = joined_server();
    let actor = server.spawn_actor(1, Vec3::new(100.0, 0.0, 0.0), NetworkActorSettings::default());
    server.world.actor_mut(actor).unwrap().relevant = false;

    exchange_packets_n_times(&mut server, &mut [&mut client], 5);

    assert_eq!(server.world.replication_count(actor), 0);
    assert_no_client_event!(client, ConnectionEvent::ActorOpened { .. });
}

#[test]
fn saturated_connection_takes_highest_priority_first_and_retries_the_rest() {
    let (mut server, mut client) = joined_server();

    // all in front of the viewer, so priority follows net priority
    let num_actors = 40u64;
    let mut actors = Vec::new();
    for id in 1..=num_actors {
        let settings = NetworkActorSettings {
            net_priority: id as f32,
            ..Default::default()
        };
        actors.push(server.spawn_actor(id, Vec3::new(100.0, 0.0, 0.0), settings));
    }

    tick_and_exchange(&mut server, &mut [&mut client]);

    let first_frame: Vec<ActorId> = server.world.replicated.iter().map(|(actor, _)| *actor).collect();
    let chosen = first_frame.len();
    assert!(chosen >= 1, "the budget allows at least one actor");
    assert!(chosen < actors.len(), "the budget must not allow every actor");

    let mut by_priority = actors.clone();
    by_priority.reverse();
    assert_eq!(first_frame, by_priority[..chosen].to_vec());

    for actor in &by_priority[chosen..] {
        let info = server.driver.network_object(*actor).unwrap();
        assert!(info.pending_net_update, "{} must be retried next frame", actor);
    }

    // nothing changes from here on, only channel opens cost bandwidth
    for actor in &actors {
        server.world.actor_mut(*actor).unwrap().state.clear();
    }
    exchange_packets_n_times(&mut server, &mut [&mut client], 60);

    for actor in &actors {
        assert!(
            server.world.replication_count(*actor) >= 1,
            "{} was dropped instead of retried",
            actor
        );
        assert_eq!(count_opened(&client, actor.0 as u32), 1);
    }
}

#[test]
fn destroyed_level_actor_is_destroyed_on_late_joiner() {
    let mut server = TestServer::new();
    let actor = server.spawn_actor(
        5,
        Vec3::new(200.0, 0.0, 0.0),
        NetworkActorSettings {
            net_startup: true,
            ..Default::default()
        },
    );
    server.driver.notify_actor_destroyed(actor, Vec3::new(200.0, 0.0, 0.0)).unwrap();
    assert!(server.driver.destruction_info(NetGuid(5)).is_some());

    let mut client = server.connect();
    let pending: Vec<NetGuid> = server
        .driver
        .client_connection(client.key)
        .unwrap()
        .pending_destructions()
        .copied()
        .collect();
    assert_eq!(pending, vec![NetGuid(5)]);

    assert!(complete_handshakes(&mut server, &mut [&mut client], 10));
    exchange_packets_n_times(&mut server, &mut [&mut client], 3);

    assert_client_event!(client, ConnectionEvent::ActorOpened { guid: NetGuid(5), .. });
    assert_client_event!(
        client,
        ConnectionEvent::ActorClosed { guid: NetGuid(5), dormant: false, .. }
    );
    let connection = server.driver.client_connection(client.key).unwrap();
    assert_eq!(connection.pending_destructions().count(), 0);
}

#[test]
fn destroyed_actor_closes_its_channel() {
    let (mut server, mut client) = joined_server();
    let actor = server.spawn_actor(1, Vec3::new(100.0, 0.0, 0.0), NetworkActorSettings::default());
    exchange_packets_n_times(&mut server, &mut [&mut client], 3);
    assert_client_event!(client, ConnectionEvent::ActorOpened { guid: NetGuid(1), .. });

    server.driver.notify_actor_destroyed(actor, Vec3::ZERO).unwrap();
    server.world.actors.remove(&actor);
    exchange_packets_n_times(&mut server, &mut [&mut client], 3);

    assert_client_event!(
        client,
        ConnectionEvent::ActorClosed { guid: NetGuid(1), dormant: false, .. }
    );
    assert!(server.driver.network_object(actor).is_none());
    assert!(server.driver.notify_actor_destroyed(actor, Vec3::ZERO).is_err());
}

#[test]
fn dormant_actor_closes_until_flushed() {
    let (mut server, mut client) = joined_server();
    let actor = server.spawn_actor(
        1,
        Vec3::new(100.0, 0.0, 0.0),
        NetworkActorSettings {
            dormancy: NetDormancy::DormantAll,
            ..Default::default()
        },
    );

    exchange_packets_n_times(&mut server, &mut [&mut client], 10);

    assert_client_event!(client, ConnectionEvent::ActorClosed { guid: NetGuid(1), dormant: true, .. });
    let info = server.driver.network_object(actor).unwrap();
    assert!(info.dormant_connections.contains(&client.key));

    // dormant actors cost nothing
    let replications = server.world.replication_count(actor);
    exchange_packets_n_times(&mut server, &mut [&mut client], 10);
    assert_eq!(server.world.replication_count(actor), replications);

    server.driver.flush_actor_dormancy(actor).unwrap();
    assert!(server.driver.network_object(actor).unwrap().dormant_connections.is_empty());
    exchange_packets_n_times(&mut server, &mut [&mut client], 10);

    assert!(server.world.replication_count(actor) > replications);
    assert_eq!(count_opened(&client, 1), 2, "the flushed actor reopens its channel");
}

#[test]
fn initially_dormant_level_actor_waits_for_a_flush() {
    let (mut server, mut client) = joined_server();
    let actor = server.spawn_actor(
        3,
        Vec3::new(100.0, 0.0, 0.0),
        NetworkActorSettings {
            dormancy: NetDormancy::Initial,
            net_startup: true,
            ..Default::default()
        },
    );

    exchange_packets_n_times(&mut server, &mut [&mut client], 5);
    assert_eq!(server.world.replication_count(actor), 0);

    server.driver.force_net_update(actor).unwrap();
    assert_eq!(
        server.driver.network_object(actor).unwrap().settings.dormancy,
        NetDormancy::DormantAll
    );
    exchange_packets_n_times(&mut server, &mut [&mut client], 3);

    assert!(server.world.replication_count(actor) >= 1);
    assert_client_event!(client, ConnectionEvent::ActorOpened { guid: NetGuid(3), .. });
}

#[test]
fn owner_only_actor_replicates_to_its_owner_only() {
    let mut server = TestServer::new();
    let mut owner = server.connect();
    let mut other = server.connect();
    assert!(complete_handshakes(&mut server, &mut [&mut owner, &mut other], 10));

    server.spawn_actor(
        8,
        Vec3::new(100.0, 0.0, 0.0),
        NetworkActorSettings {
            only_relevant_to_owner: true,
            owner: Some(owner.key),
            ..Default::default()
        },
    );
    exchange_packets_n_times(&mut server, &mut [&mut owner, &mut other], 5);

    assert_client_event!(owner, ConnectionEvent::ActorOpened { guid: NetGuid(8), .. });
    assert_no_client_event!(other, ConnectionEvent::ActorOpened { guid: NetGuid(8), .. });
}

#[test]
fn connection_without_view_target_replicates_nothing() {
    let (mut server, mut client) = joined_server();
    server.world.hidden_connections.insert(client.key);
    let actor = server.spawn_actor(1, Vec3::new(100.0, 0.0, 0.0), NetworkActorSettings::default());

    let updated = exchange_packets_n_times(&mut server, &mut [&mut client], 5);

    assert_eq!(updated, 0);
    assert_eq!(server.world.replication_count(actor), 0);
}

#[test]
fn adding_an_actor_twice_fails() {
    let mut server = TestServer::new();
    server.spawn_actor(1, Vec3::ZERO, NetworkActorSettings::default());
    let again = server
        .driver
        .add_network_actor(ActorId(1), NetworkActorSettings::default());
    assert!(again.is_err());
}

#[test]
fn slow_connection_is_prioritized_in_low_bandwidth_mode() {
    for (threshold, expect_low) in [(0, false), (5000, true)] {
        let mut server = TestServer::with_config(NetDriverConfig {
            low_bandwidth_net_speed: threshold,
            seed: Some(7),
            ..Default::default()
        });
        let mut client = server.connect();
        assert!(complete_handshakes(&mut server, &mut [&mut client], 10));
        let actor = server.spawn_actor(1, Vec3::new(100.0, 0.0, 0.0), NetworkActorSettings::default());

        exchange_packets_n_times(&mut server, &mut [&mut client], 3);

        assert!(server.world.replication_count(actor) >= 1);
        assert_eq!(server.world.low_bandwidth_priorities.get() > 0, expect_low, "threshold {}", threshold);
    }
}

#[test]
fn destruction_burst_is_spread_over_frames() {
    let mut server = TestServer::new();
    let count = 100u64;
    for id in 1..=count {
        let location = Vec3::new(200.0, 0.0, 0.0);
        let settings = NetworkActorSettings {
            net_startup: true,
            ..Default::default()
        };
        let actor = server.spawn_actor(id, location, settings);
        server.driver.notify_actor_destroyed(actor, location).unwrap();
    }

    let mut client = server.connect();
    assert!(complete_handshakes(&mut server, &mut [&mut client], 10));
    tick_and_exchange(&mut server, &mut [&mut client]);

    let remaining = server.driver.client_connection(client.key).unwrap().pending_destructions().count();
    assert!(remaining > 0, "every destruction went out in one frame");

    exchange_packets_n_times(&mut server, &mut [&mut client], 120);

    let connection = server.driver.client_connection(client.key).unwrap();
    assert_eq!(connection.pending_destructions().count(), 0);
    let mut closed: Vec<u32> = client
        .events
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::ActorClosed { guid, dormant: false, .. } => Some(guid.0),
            _ => None,
        })
        .collect();
    closed.sort_unstable();
    closed.dedup();
    assert_eq!(closed, (1..=count as u32).collect::<Vec<_>>());
}
