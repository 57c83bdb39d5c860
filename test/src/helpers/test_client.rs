use log::debug;

use repnet_server::ConnectionKey;
use repnet_shared::{Connection, ConnectionConfig, ConnectionEvent, ControlMessage};

use crate::local_socket::{LinkConditioner, LocalSocketPair};

/// The client end of a loopback link. Completes the handshake by itself:
/// `Welcome` is answered with `Join`.
pub struct TestClient {
    pub key: ConnectionKey,
    pub connection: Connection,
    pub socket: LocalSocketPair,
    /// Everything the client connection reported, in order.
    pub events: Vec<ConnectionEvent>,
    pub welcomed_level: Option<String>,
}

impl TestClient {
    pub fn new(key: ConnectionKey, socket: LocalSocketPair, config: ConnectionConfig, time: f64) -> Self {
        let connection = Connection::new(config, socket.client_sender(), time);
        Self {
            key,
            connection,
            socket,
            events: Vec::new(),
            welcomed_level: None,
        }
    }

    /// Opens the control channel and sends `Hello`.
    pub fn connect(&mut self) {
        if let Err(err) = self.connection.begin_handshake() {
            panic!("client {} could not start the handshake: {}", self.key, err);
        }
        self.connection.flush_net();
    }

    /// Receives everything the server sent, through `conditioner`.
    pub fn receive(&mut self, time: f64, conditioner: &LinkConditioner) {
        self.connection.set_time(time);
        let packets = conditioner.condition(self.socket.to_client.drain());
        for packet in packets {
            self.connection.received_raw_packet(&packet);
        }
        self.process_events();
    }

    pub fn tick(&mut self, time: f64) {
        self.connection.tick(time);
        self.process_events();
    }

    fn process_events(&mut self) {
        for event in self.connection.take_events() {
            if let ConnectionEvent::ControlMessage(ControlMessage::Welcome { level, .. }) = &event {
                debug!("client {} welcomed to {}", self.key, level);
                self.welcomed_level = Some(level.clone());
                if let Err(err) = self.connection.send_control_message(&ControlMessage::Join) {
                    panic!("client {} could not join: {}", self.key, err);
                }
                self.connection.set_open();
            }
            self.events.push(event);
        }
    }

    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Net guids of actors whose channel the server opened.
    pub fn opened_guids(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ConnectionEvent::ActorOpened { guid, .. } => Some(guid.0),
                _ => None,
            })
            .collect()
    }
}
