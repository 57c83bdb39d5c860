use std::fmt;

/// Payload interpretation of a channel. The numeric values are the ones
/// carried in bunch headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// Connection handshake and control messages. Always lives at index 0.
    Control,
    /// Replicated state of a single actor.
    Actor,
    /// Unreliable voice data, opened from either side.
    Voice,
}

impl ChannelType {
    pub fn to_wire(self) -> u32 {
        match self {
            ChannelType::Control => 1,
            ChannelType::Actor => 2,
            ChannelType::Voice => 4,
        }
    }

    /// Returns `None` for values this build does not know how to create.
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(ChannelType::Control),
            2 => Some(ChannelType::Actor),
            4 => Some(ChannelType::Voice),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelType::Control => "Control",
            ChannelType::Actor => "Actor",
            ChannelType::Voice => "Voice",
        };
        f.write_str(name)
    }
}
