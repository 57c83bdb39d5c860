use crate::{
    helpers::{test_server::FRAME_DELTA, TestClient, TestServer},
    local_socket::LinkConditioner,
};

/// One server frame: the server receives what the clients sent, replicates
/// and flushes, then every client receives and ticks. Returns how many
/// actor replications the driver attempted.
pub fn tick_and_exchange(server: &mut TestServer, clients: &mut [&mut TestClient]) -> usize {
    tick_and_exchange_with(server, clients, &LinkConditioner::default(), &LinkConditioner::default())
}

/// Like `tick_and_exchange`, with the packets of each direction passed
/// through a conditioner.
pub fn tick_and_exchange_with(
    server: &mut TestServer,
    clients: &mut [&mut TestClient],
    to_server: &LinkConditioner,
    to_client: &LinkConditioner,
) -> usize {
    server.driver.tick_dispatch(FRAME_DELTA);
    for client in clients.iter_mut() {
        let packets = to_server.condition(client.socket.to_server.drain());
        for packet in packets {
            // a client whose connection the server dropped just loses its packets
            if server.driver.received_packet(client.key, &packet).is_err() {
                break;
            }
        }
    }

    let updated = server.driver.tick_flush(FRAME_DELTA, &mut server.world);

    let time = server.driver.time();
    for client in clients.iter_mut() {
        client.receive(time, to_client);
        client.tick(time);
    }
    updated
}

/// Runs `frames` frames without loss.
pub fn exchange_packets_n_times(server: &mut TestServer, clients: &mut [&mut TestClient], frames: usize) -> usize {
    (0..frames).map(|_| tick_and_exchange(server, clients)).sum()
}

/// Runs frames until every client has been welcomed and joined, at most
/// `max_frames`. Returns whether they all did.
pub fn complete_handshakes(server: &mut TestServer, clients: &mut [&mut TestClient], max_frames: usize) -> bool {
    for _ in 0..max_frames {
        tick_and_exchange(server, clients);
        let all_joined = clients.iter().all(|client| {
            server
                .driver
                .client_connection(client.key)
                .is_some_and(|connection| connection.is_joined())
        });
        if all_joined {
            return true;
        }
    }
    false
}
