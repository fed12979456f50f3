use crate::chord::types::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RingError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Chord protocol error: {0}")]
    Chord(#[from] ChordError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single remote call. Always local to one hop: it says nothing
/// about whether the peer is alive for anyone else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Remote call timed out")]
    Timeout,

    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    /// The peer answered but could not complete the request itself.
    #[error("Remote peer failed: {0}")]
    Remote(String),

    #[error("gRPC error: {0}")]
    Rpc(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl NetworkError {
    /// Whether this failure means the peer itself should be presumed gone.
    /// A peer that answered, even with an error status, is still alive.
    pub fn is_peer_failure(&self) -> bool {
        !matches!(self, NetworkError::Remote(_) | NetworkError::Rpc(_))
    }
}

#[derive(Error, Debug)]
pub enum ChordError {
    #[error("Lookup for {id} failed: {reason}")]
    LookupFailed { id: NodeId, reason: String },

    #[error("Failed to join ring: {0}")]
    JoinFailed(String),

    #[error("Identifier {id} is already held by {existing}")]
    IdentifierCollision { id: NodeId, existing: String },

    #[error("Node is its own successor while {known_peers} peer(s) are known")]
    DegenerateRing { known_peers: usize },

    #[error("Invalid node state: {0}")]
    InvalidState(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_silent_peers_count_as_failed() {
        assert!(NetworkError::Timeout.is_peer_failure());
        assert!(NetworkError::Unreachable("a".into()).is_peer_failure());
        assert!(NetworkError::Transport("bad uri".into()).is_peer_failure());
        assert!(!NetworkError::Remote("no route".into()).is_peer_failure());
        assert!(!NetworkError::Rpc("unimplemented".into()).is_peer_failure());
    }
}
