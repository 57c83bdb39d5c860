mod actor_channel;
mod channel;
mod channel_type;
mod control_channel;
mod control_message;
mod error;
mod reliable_ring;
mod voice_channel;

pub use actor_channel::ActorChannel;
pub use channel::{Channel, ChannelKind};
pub use channel_type::ChannelType;
pub use control_channel::ControlChannel;
pub use control_message::ControlMessage;
pub use error::ChannelError;
pub use reliable_ring::ReliableRing;
pub use voice_channel::VoiceChannel;
