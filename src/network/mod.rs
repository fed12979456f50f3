pub mod grpc;
pub mod local;
pub mod messages;
pub mod node;

pub use local::LocalNetwork;
pub use node::ChordPeer;
