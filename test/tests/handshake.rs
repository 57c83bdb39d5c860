/// Tests for the Hello / Welcome / Join handshake through the net driver
/// Covers joining, network version mismatch, dropping closed connections and
/// channels opened by clients

use repnet_server::{ConnectionKey, NetDriverConfig};
use repnet_shared::{
    ActorId, BitWrite, ChannelIndex, Connection, ConnectionConfig, ConnectionEvent, ConnectionState,
    ControlMessage, NetGuid,
};
use repnet_test::{
    assert_client_event, complete_handshakes, exchange_packets_n_times, tick_and_exchange, TestClient,
    TestServer, FRAME_DELTA,
};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

#[test]
fn client_is_welcomed_and_joins() {
    init_logging();
    let mut server = TestServer::new();
    let mut client = server.connect();

    assert!(complete_handshakes(&mut server, &mut [&mut client], 10));

    assert_eq!(client.welcomed_level.as_deref(), Some("TestLevel"));
    assert_eq!(client.connection.state(), ConnectionState::Open);
    let connection = server.driver.client_connection(client.key).unwrap();
    assert_eq!(connection.connection.state(), ConnectionState::Open);
    assert_client_event!(
        client,
        ConnectionEvent::ControlMessage(ControlMessage::Welcome { .. })
    );

    let events = server.driver.take_events();
    assert!(events.iter().any(|(key, event)| *key == client.key
        && matches!(event, ConnectionEvent::ControlMessage(ControlMessage::Hello { .. }))));
    assert!(events.iter().any(|(key, event)| *key == client.key
        && matches!(event, ConnectionEvent::ControlMessage(ControlMessage::Join))));
}

#[test]
fn network_version_mismatch_is_upgraded_and_dropped() {
    init_logging();
    let mut server = TestServer::new();
    let mut client = server.connect_with(ConnectionConfig {
        network_version: 9,
        ..Default::default()
    });

    tick_and_exchange(&mut server, &mut [&mut client]);

    assert_client_event!(
        client,
        ConnectionEvent::ControlMessage(ControlMessage::Upgrade { remote_network_version: 1 })
    );
    assert!(client.welcomed_level.is_none());
    assert_eq!(server.driver.num_connections(), 0);
}

#[test]
fn silent_client_times_out() {
    init_logging();
    let mut server = TestServer::with_config(NetDriverConfig {
        connection: ConnectionConfig {
            initial_connect_timeout: 1.0,
            connection_timeout: 1.0,
            ..Default::default()
        },
        seed: Some(3),
        ..Default::default()
    });
    let mut client = server.connect();
    assert!(complete_handshakes(&mut server, &mut [&mut client], 10));

    // the client stops talking: only the server ticks
    exchange_packets_n_times(&mut server, &mut [], 45);

    assert_eq!(server.driver.num_connections(), 0);
    assert!(server
        .driver
        .take_events()
        .iter()
        .any(|(key, event)| *key == client.key && matches!(event, ConnectionEvent::Closed)));
}

#[test]
fn removed_connection_is_forgotten() {
    let mut server = TestServer::new();
    let mut first = server.connect();
    let mut second = server.connect();
    assert!(complete_handshakes(&mut server, &mut [&mut first, &mut second], 10));

    server.driver.remove_client_connection(first.key).unwrap();

    assert_eq!(server.driver.connection_keys(), vec![second.key]);
    assert!(server.driver.remove_client_connection(first.key).is_err());
    tick_and_exchange(&mut server, &mut [&mut first, &mut second]);
    assert_client_event!(first, ConnectionEvent::Closed);
}

/// Opens an actor channel from the client side and sends one reliable bunch
/// on it.
fn send_client_actor_bunch(connection: &mut Connection) -> ChannelIndex {
    let ch_index = connection.open_actor_channel(ActorId(999), NetGuid(999)).unwrap();
    let mut bunch = connection.new_bunch(ch_index, false).unwrap();
    bunch.flags.reliable = true;
    bunch.write_byte(7);
    connection.send_bunch(bunch, false).unwrap();
    connection.flush_net();
    ch_index
}

fn deliver_to_server(server: &mut TestServer, client: &TestClient) {
    for packet in client.socket.to_server.drain() {
        server.driver.received_packet(client.key, &packet).unwrap();
    }
}

fn client_opened_channels(events: &[(ConnectionKey, ConnectionEvent)]) -> usize {
    events
        .iter()
        .filter(|(_, event)| match event {
            ConnectionEvent::ActorOpened { .. } => true,
            ConnectionEvent::ChannelOpened { ch_index, .. } => *ch_index != 0,
            _ => false,
        })
        .count()
}

#[test]
fn actor_bunch_before_join_closes_the_connection() {
    init_logging();
    let mut server = TestServer::new();
    let mut client = server.connect();

    // the client sees its control channel acked but never answers Welcome
    server.driver.tick_dispatch(FRAME_DELTA);
    deliver_to_server(&mut server, &client);
    server.driver.tick_flush(FRAME_DELTA, &mut server.world);
    for packet in client.socket.to_client.drain() {
        client.connection.received_raw_packet(&packet);
    }
    assert!(client.connection.channel(0).unwrap().is_open_acked());
    server.driver.take_events();

    send_client_actor_bunch(&mut client.connection);
    server.driver.tick_dispatch(FRAME_DELTA);
    deliver_to_server(&mut server, &client);

    let connection = &server.driver.client_connection(client.key).unwrap().connection;
    assert!(connection.is_closed());
    assert_eq!(connection.security_violations(), 1);
    assert_eq!(client_opened_channels(&server.driver.take_events()), 0);

    server.driver.tick_flush(FRAME_DELTA, &mut server.world);
    assert_eq!(server.driver.num_connections(), 0);
}

#[test]
fn joined_client_cannot_open_actor_channels() {
    init_logging();
    let mut server = TestServer::new();
    let mut client = server.connect();
    assert!(complete_handshakes(&mut server, &mut [&mut client], 10));
    server.driver.take_events();

    let ch_index = send_client_actor_bunch(&mut client.connection);
    exchange_packets_n_times(&mut server, &mut [&mut client], 3);

    let connection = &server.driver.client_connection(client.key).unwrap().connection;
    assert!(!connection.is_closed());
    assert!(connection.channel(ch_index).is_none());
    assert_eq!(connection.security_violations(), 0);
    assert_eq!(client_opened_channels(&server.driver.take_events()), 0);
}
