use std::collections::VecDeque;

use log::{error, info, warn};

use crate::{
    bunch::{InBunch, OutBunch},
    channel::{ChannelError, ControlMessage},
    connection::{ConnectionCore, ConnectionEvent},
    constants::{MAX_QUEUED_CONTROL_MESSAGES, RELIABLE_BUFFER},
};

pub(crate) struct QueuedMessage {
    pub data: Vec<u8>,
    pub num_bits: u32,
}

/// Control channel state. Messages that cannot enter the reliable window
/// right away wait in a queue so they still go out in order.
pub struct ControlChannel {
    needs_endian_inspection: bool,
    queued_messages: VecDeque<QueuedMessage>,
}

impl ControlChannel {
    pub(crate) fn new(opened_locally: bool) -> Self {
        Self {
            needs_endian_inspection: !opened_locally,
            queued_messages: VecDeque::new(),
        }
    }

    pub fn num_queued_messages(&self) -> usize {
        self.queued_messages.len()
    }

    pub(crate) fn should_queue(&self, num_out_rec: usize, close: bool) -> bool {
        !self.queued_messages.is_empty() || num_out_rec >= RELIABLE_BUFFER - 1 + usize::from(close)
    }

    pub(crate) fn queue(&mut self, core: &mut ConnectionCore, bunch: &OutBunch) -> Result<(), ChannelError> {
        if self.queued_messages.len() >= MAX_QUEUED_CONTROL_MESSAGES {
            error!(
                "Control channel message queue overflowed ({} queued), closing connection",
                self.queued_messages.len()
            );
            core.request_close(None);
            return Err(ChannelError::ControlQueueFull {
                queued: self.queued_messages.len(),
            });
        }
        self.queued_messages.push_back(QueuedMessage {
            data: bunch.data().to_vec(),
            num_bits: bunch.num_bits(),
        });
        Ok(())
    }

    pub(crate) fn pop_queued(&mut self) -> Option<QueuedMessage> {
        self.queued_messages.pop_front()
    }

    pub(crate) fn requeue_front(&mut self, message: QueuedMessage) {
        self.queued_messages.push_front(message);
    }

    pub(crate) fn received_bunch(
        &mut self,
        core: &mut ConnectionCore,
        bunch: &InBunch,
    ) -> Result<(), ChannelError> {
        let mut reader = bunch.reader();

        // the peer's first message must be the hello carrying its endianness
        if self.needs_endian_inspection {
            let mut peek = reader.clone();
            let message_type = peek.read_byte()?;
            if message_type != ControlMessage::HELLO {
                return Err(ChannelError::MissingHello { message_type });
            }
            let little_endian = peek.read_byte()? != 0;
            if !little_endian {
                info!("Remote peer reports a big endian platform");
            }
            core.remote_little_endian = Some(little_endian);
            self.needs_endian_inspection = false;
        }

        while !reader.at_end() && !core.is_closed() {
            let message = ControlMessage::read(&mut reader)?;
            match &message {
                ControlMessage::NetSpeed { rate } => core.set_net_speed(*rate),
                ControlMessage::Failure { reason } => {
                    warn!("Remote peer reported failure: {}", reason);
                }
                _ => {}
            }
            core.push_event(ConnectionEvent::ControlMessage(message));
        }
        Ok(())
    }
}
