mod archive;
mod demo_header;
mod error;

pub use demo_header::{
    read_deleted_startup_actors, write_deleted_startup_actors, LevelNameAndTime, NetworkDemoHeader,
    HISTORY_DELETED_STARTUP_ACTORS, HISTORY_EXTRA_VERSION, HISTORY_MULTIPLE_LEVELS,
    MIN_NETWORK_DEMO_VERSION, NETWORK_DEMO_MAGIC, NETWORK_DEMO_VERSION,
};
pub use error::DemoHeaderError;
