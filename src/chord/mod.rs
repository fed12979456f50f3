pub mod lookup;
pub mod membership;
pub mod node;
pub mod routing;
pub mod stabilize;
pub mod transport;
pub mod types;
pub mod workers;

pub use node::{ChordNode, NodeSnapshot};
pub use transport::Transport;
pub use types::{IdSpace, NodeId, NodeRef, NodeStatus};
pub use workers::Maintenance;
