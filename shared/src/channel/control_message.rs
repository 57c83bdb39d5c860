use repnet_serde::{BitReader, BitWrite, Serde};

use crate::channel::ChannelError;

/// Messages carried on the control channel. The first byte of each message
/// is its type; the handshake `Hello` also carries the sender's endianness
/// so the receiver can inspect it before anything else is read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    Hello {
        little_endian: bool,
        network_version: u32,
    },
    Welcome {
        level: String,
        game_mode: String,
    },
    NetSpeed {
        rate: u32,
    },
    /// The peer's network version is incompatible.
    Upgrade {
        remote_network_version: u32,
    },
    Failure {
        reason: String,
    },
    Join,
}

impl ControlMessage {
    pub const HELLO: u8 = 0;
    pub const WELCOME: u8 = 1;
    pub const UPGRADE: u8 = 2;
    pub const NET_SPEED: u8 = 4;
    pub const FAILURE: u8 = 6;
    pub const JOIN: u8 = 9;

    pub fn message_type(&self) -> u8 {
        match self {
            ControlMessage::Hello { .. } => Self::HELLO,
            ControlMessage::Welcome { .. } => Self::WELCOME,
            ControlMessage::NetSpeed { .. } => Self::NET_SPEED,
            ControlMessage::Upgrade { .. } => Self::UPGRADE,
            ControlMessage::Failure { .. } => Self::FAILURE,
            ControlMessage::Join => Self::JOIN,
        }
    }

    pub fn write(&self, writer: &mut dyn BitWrite) {
        writer.write_byte(self.message_type());
        match self {
            ControlMessage::Hello {
                little_endian,
                network_version,
            } => {
                writer.write_byte(u8::from(*little_endian));
                network_version.ser(writer);
            }
            ControlMessage::Welcome { level, game_mode } => {
                writer.write_string(level);
                writer.write_string(game_mode);
            }
            ControlMessage::NetSpeed { rate } => rate.ser(writer),
            ControlMessage::Upgrade {
                remote_network_version,
            } => remote_network_version.ser(writer),
            ControlMessage::Failure { reason } => writer.write_string(reason),
            ControlMessage::Join => {}
        }
    }

    pub fn read(reader: &mut BitReader) -> Result<Self, ChannelError> {
        let message_type = reader.read_byte()?;
        let message = match message_type {
            Self::HELLO => ControlMessage::Hello {
                little_endian: reader.read_byte()? != 0,
                network_version: u32::de(reader)?,
            },
            Self::WELCOME => ControlMessage::Welcome {
                level: reader.read_string()?,
                game_mode: reader.read_string()?,
            },
            Self::NET_SPEED => ControlMessage::NetSpeed {
                rate: u32::de(reader)?,
            },
            Self::UPGRADE => ControlMessage::Upgrade {
                remote_network_version: u32::de(reader)?,
            },
            Self::FAILURE => ControlMessage::Failure {
                reason: reader.read_string()?,
            },
            Self::JOIN => ControlMessage::Join,
            _ => return Err(ChannelError::UnknownControlMessage { message_type }),
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use repnet_serde::BitWriter;

    use super::*;

    #[test]
    fn messages_read_back_in_order() {
        let messages = vec![
            ControlMessage::Hello {
                little_endian: true,
                network_version: 7,
            },
            ControlMessage::Welcome {
                level: "/Game/Maps/Arena".to_string(),
                game_mode: "Deathmatch".to_string(),
            },
            ControlMessage::Join,
        ];
        let mut writer = BitWriter::unbounded();
        messages.iter().for_each(|message| message.write(&mut writer));
        let bits = writer.num_bits();
        let buffer = writer.to_bytes();

        let mut reader = BitReader::with_bits(&buffer, bits);
        let mut read = Vec::new();
        while !reader.at_end() {
            read.push(ControlMessage::read(&mut reader).unwrap());
        }

        assert_eq!(read, messages);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let buffer = [200u8];
        let mut reader = BitReader::new(&buffer);

        let err = ControlMessage::read(&mut reader).unwrap_err();
        assert!(matches!(err, ChannelError::UnknownControlMessage { message_type: 200 }));
    }
}
