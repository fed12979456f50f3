//! A Chord ring member: consistent identifier routing over an m-bit ring
//! that repairs itself under joins, graceful leaves and crashes.
//!
//! [`chord`] holds the protocol (identifier space, routing tables, lookup,
//! stabilization, membership) independent of any wire format. [`network`]
//! carries it over gRPC, or in-process through [`network::LocalNetwork`].

pub mod chord;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod simulation;

pub use chord::{ChordNode, IdSpace, NodeId, NodeRef};
pub use config::ChordConfig;
pub use error::{ChordError, NetworkError, RingError};
