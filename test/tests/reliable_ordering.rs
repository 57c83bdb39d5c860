/// Tests for reliable bunch delivery between two connections
/// Covers channel open gating, retransmission after loss and in-order
/// application under packet reordering

use proptest::prelude::*;

use repnet_shared::{
    ActorId, BitWrite, ChannelError, ChannelType, Connection, ConnectionConfig, ConnectionEvent,
    NetGuid,
};
use repnet_test::{LinkConditioner, LocalSocketPair, LocalWire};

const ACTOR_CHANNEL: u32 = 1;

struct Link {
    client: Connection,
    server: Connection,
    socket: LocalSocketPair,
}

fn deliver(wire: &LocalWire, to: &mut Connection, conditioner: &LinkConditioner) {
    for packet in conditioner.condition(wire.drain()) {
        to.received_raw_packet(&packet);
    }
}

/// A client whose control channel the server has acknowledged.
fn open_link() -> Link {
    let socket = LocalSocketPair::new();
    let mut client = Connection::new(ConnectionConfig::default(), socket.client_sender(), 0.0);
    let mut server = Connection::new(ConnectionConfig::default(), socket.server_sender(), 0.0);

    client.begin_handshake().unwrap();
    let err = client.create_channel(ChannelType::Actor).unwrap_err();
    assert!(matches!(err, ChannelError::ControlChannelNotOpen { .. }));

    client.flush_net();
    deliver(&socket.to_server, &mut server, &LinkConditioner::default());
    server.flush_net();
    deliver(&socket.to_client, &mut client, &LinkConditioner::default());
    assert!(client.channel(0).unwrap().is_open_acked());

    server.take_events();
    client.take_events();
    Link { client, server, socket }
}

/// Sends `count` reliable one-byte bunches on the actor channel, one packet
/// each.
fn send_reliable_bunches(client: &mut Connection, count: u8) {
    let ch_index = client.open_actor_channel(ActorId(1), NetGuid(10)).unwrap();
    assert_eq!(ch_index, ACTOR_CHANNEL);
    for value in 1..=count {
        let mut bunch = client.new_bunch(ch_index, false).unwrap();
        bunch.flags.reliable = true;
        bunch.write_byte(value);
        client.send_bunch(bunch, false).unwrap();
        client.flush_net();
    }
}

/// Payloads the receiver applied on the actor channel, in order.
fn applied_payloads(events: &[ConnectionEvent]) -> Vec<Vec<u8>> {
    events
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::ActorUpdate { ch_index: ACTOR_CHANNEL, payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

/// Lossless round trips until both sides have nothing left to say.
fn settle(link: &mut Link, events: &mut Vec<ConnectionEvent>) {
    for _ in 0..10 {
        link.server.flush_net();
        deliver(&link.socket.to_client, &mut link.client, &LinkConditioner::default());
        link.client.flush_net();
        deliver(&link.socket.to_server, &mut link.server, &LinkConditioner::default());
        events.extend(link.server.take_events());
    }
}

#[test]
fn lost_bunch_is_retransmitted_and_applied_in_order() {
    let mut link = open_link();
    send_reliable_bunches(&mut link.client, 3);

    // the packet carrying bunch 2 never arrives; acks go back one per packet
    let packets = link.socket.to_server.drain();
    assert_eq!(packets.len(), 3);
    link.server.received_raw_packet(&packets[0]);
    link.server.flush_net();
    link.server.received_raw_packet(&packets[2]);
    link.server.flush_net();

    let mut events = link.server.take_events();
    assert!(events.contains(&ConnectionEvent::ActorOpened {
        ch_index: ACTOR_CHANNEL,
        guid: NetGuid(10)
    }));
    assert_eq!(applied_payloads(&events), vec![vec![1]], "bunch 3 must wait for bunch 2");

    deliver(&link.socket.to_client, &mut link.client, &LinkConditioner::default());
    assert_eq!(link.client.stats().out_packets_lost, 1);

    settle(&mut link, &mut events);

    assert_eq!(applied_payloads(&events), vec![vec![1], vec![2], vec![3]]);
    assert_eq!(link.client.channel(ACTOR_CHANNEL).unwrap().num_out_rec(), 0);
}

#[test]
fn lost_ack_causes_retransmission_without_duplicate_application() {
    let mut link = open_link();
    send_reliable_bunches(&mut link.client, 3);

    let mut events = Vec::new();
    for packet in link.socket.to_server.drain() {
        link.server.received_raw_packet(&packet);
        link.server.flush_net();
    }
    events.extend(link.server.take_events());
    assert_eq!(applied_payloads(&events), vec![vec![1], vec![2], vec![3]]);

    // every packet carrying the ack of bunch 2 is lost
    let acks = link.socket.to_client.drain();
    assert_eq!(acks.len(), 3);
    link.client.received_raw_packet(&acks[0]);
    assert_eq!(link.client.channel(ACTOR_CHANNEL).unwrap().num_out_rec(), 2);

    settle(&mut link, &mut events);

    assert!(link.client.stats().out_packets_lost >= 1, "bunch 2 must be resent");
    assert_eq!(
        applied_payloads(&events),
        vec![vec![1], vec![2], vec![3]],
        "the retransmitted bunch must not be applied twice"
    );
    assert_eq!(link.client.channel(ACTOR_CHANNEL).unwrap().num_out_rec(), 0);
}

#[test]
fn reversed_packets_are_applied_in_send_order() {
    let mut link = open_link();
    send_reliable_bunches(&mut link.client, 3);

    deliver(&link.socket.to_server, &mut link.server, &LinkConditioner::reversed());
    let mut events = link.server.take_events();
    settle(&mut link, &mut events);

    assert_eq!(applied_payloads(&events), vec![vec![1], vec![2], vec![3]]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reliable_bunches_survive_any_arrival_order(
        order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let mut link = open_link();
        send_reliable_bunches(&mut link.client, 5);

        let packets = link.socket.to_server.drain();
        for position in &order {
            link.server.received_raw_packet(&packets[*position]);
        }
        let mut events = link.server.take_events();
        settle(&mut link, &mut events);

        let expected: Vec<Vec<u8>> = (1..=5u8).map(|value| vec![value]).collect();
        prop_assert_eq!(applied_payloads(&events), expected);
    }
}
