pub mod helpers;
pub mod local_socket;
pub mod test_world;

pub use helpers::*;
pub use local_socket::{LinkConditioner, LocalSocketPair, LocalWire};
pub use test_world::{TestActor, TestWorld};

