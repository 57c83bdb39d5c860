use thiserror::Error;

use repnet_shared::{ActorId, ChannelError, ClassNetCacheError};

use crate::driver::ConnectionKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("No connection with key {key}")]
    UnknownConnection { key: ConnectionKey },

    #[error("{actor} is not in the network object list")]
    UnknownActor { actor: ActorId },

    #[error("{actor} is already in the network object list")]
    DuplicateActor { actor: ActorId },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    ClassNetCache(#[from] ClassNetCacheError),
}
