//! # Repnet Shared
//! The replication data path shared by both ends of a connection: bunch
//! framing, channels, the connection's packet reliability layer, class field
//! checksums, the packed tag codec and the replay demo header.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

mod bunch;
mod channel;
mod class_net_cache;
mod connection;
mod constants;
mod demo;
mod packet_ring;
mod tags;
mod types;
mod wrapping_number;

pub use repnet_serde::{
    packed_bit_length, BitReader, BitWrite, BitWriter, BitWriterMark, Serde, SerdeErr,
    UnsignedInteger, UnsignedVariableInteger,
};

pub use bunch::{BunchFlags, BunchHeader, InBunch, OutBunch};
pub use channel::{
    ActorChannel, Channel, ChannelError, ChannelKind, ChannelType, ControlChannel, ControlMessage,
    ReliableRing, VoiceChannel,
};
pub use class_net_cache::{
    compare_properties, function_checksum, property_checksum, sort_properties, ClassNetCache,
    ClassNetCacheError, ClassNetCacheRegistry, ClassSchema, FieldNetCache, FunctionSchema,
    NestedSchema, NetField, PropertySchema, SchemaProvider, StaticSchema,
};
pub use connection::{
    Connection, ConnectionConfig, ConnectionEvent, ConnectionStats, PacketError, PacketSender,
    PacketSimulationSettings, PacketSimulator, RemoteChannelPolicy, SecurityEvent,
};
pub use constants::{
    CONNECTION_READY_RECEIVE_WINDOW, DEFAULT_NET_SPEED, MAX_CHANNELS, MAX_CHSEQUENCE, MAX_PACKETID,
    RELIABLE_BUFFER, VOICE_CHANNEL_INDEX,
};
pub use demo::{
    read_deleted_startup_actors, write_deleted_startup_actors, DemoHeaderError, LevelNameAndTime,
    NetworkDemoHeader, HISTORY_DELETED_STARTUP_ACTORS, HISTORY_EXTRA_VERSION, HISTORY_MULTIPLE_LEVELS,
    MIN_NETWORK_DEMO_VERSION, NETWORK_DEMO_MAGIC, NETWORK_DEMO_VERSION,
};
pub use packet_ring::PacketRing;
pub use tags::{
    read_tag_net_index_packed, tag_net_index_packed_bits, write_tag_net_index_packed,
    GameplayTag, GameplayTagContainer, TagError, TagExportReader, TagExportWriter, TagNetConfig,
    TagNetIndex, TagNetIndexTable, TagWarnings,
};
pub use types::{ActorId, ChannelIndex, ChannelSequence, ConnectionState, NetGuid, PacketId, PacketIdRange};
pub use wrapping_number::{best_signed_difference, make_relative};
