use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// NodeId represents a position on the m-bit Chord ring. Keys are hashed into
/// the same space, so a NodeId doubles as a lookup target.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        NodeId(value)
    }
}

impl NodeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Hex form of the full 8-byte identifier, for logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Whether `self` lies strictly clockwise between `start` and `end`.
    /// When `start == end` the interval covers the whole ring except `start`.
    pub fn between(&self, start: &NodeId, end: &NodeId) -> bool {
        if start < end {
            self > start && self < end
        } else {
            self > start || self < end
        }
    }

    /// Whether `self` lies in `(start, end]`. When `start == end` this is the
    /// whole ring.
    pub fn in_half_open(&self, start: &NodeId, end: &NodeId) -> bool {
        self == end || self.between(start, end)
    }
}

/// The m-bit identifier space. Fixed when a node starts and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSpace {
    bits: u32,
}

impl IdSpace {
    pub const MAX_BITS: u32 = 64;

    pub fn new(bits: u32) -> Result<Self, ConfigError> {
        if bits == 0 || bits > Self::MAX_BITS {
            return Err(ConfigError::Invalid(format!(
                "ring width must be between 1 and {} bits, got {}",
                Self::MAX_BITS,
                bits
            )));
        }
        Ok(Self { bits })
    }

    /// Number of bits m; also the finger table length.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    fn mask(&self) -> u64 {
        if self.bits == Self::MAX_BITS {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// Reduces an arbitrary integer onto the ring.
    pub fn id(&self, value: u64) -> NodeId {
        NodeId(value & self.mask())
    }

    /// Hashes bytes onto the ring, keeping the most significant m bits of
    /// the SHA-256 digest prefix.
    pub fn hash(&self, bytes: &[u8]) -> NodeId {
        let digest = Sha256::digest(bytes);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let value = u64::from_be_bytes(prefix);
        NodeId(value >> (Self::MAX_BITS - self.bits))
    }

    /// Identifier for a peer's network address.
    pub fn hash_address(&self, address: &str) -> NodeId {
        self.hash(address.as_bytes())
    }

    /// `id + 2^i mod 2^m`, the start of finger `i`.
    pub fn add_pow2(&self, id: NodeId, i: u32) -> NodeId {
        debug_assert!(i < self.bits);
        NodeId(id.0.wrapping_add(1u64 << i) & self.mask())
    }

    /// Clockwise distance from `from` to `to`.
    pub fn distance(&self, from: NodeId, to: NodeId) -> u64 {
        to.0.wrapping_sub(from.0) & self.mask()
    }
}

/// A peer as seen from the outside: identifier plus network address. Plain
/// value, exchanged over the wire and re-queried rather than followed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub addr: String,
}

impl NodeRef {
    pub fn new(id: NodeId, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

/// Local lifecycle of a node. A failed peer is never a state here: it only
/// exists as an eviction in somebody else's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Joining,
    Active,
    Leaving,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u64) -> NodeId {
        NodeId::from(v)
    }

    #[test]
    fn between_is_exclusive_and_wraps() {
        assert!(id(4).between(&id(3), &id(6)));
        assert!(!id(3).between(&id(3), &id(6)));
        assert!(!id(6).between(&id(3), &id(6)));

        // Wrapping interval (6, 3)
        assert!(id(7).between(&id(6), &id(3)));
        assert!(id(0).between(&id(6), &id(3)));
        assert!(!id(4).between(&id(6), &id(3)));

        // Degenerate interval (a, a) is everything but a
        assert!(id(5).between(&id(2), &id(2)));
        assert!(!id(2).between(&id(2), &id(2)));
    }

    #[test]
    fn half_open_includes_end() {
        assert!(id(6).in_half_open(&id(3), &id(6)));
        assert!(!id(3).in_half_open(&id(3), &id(6)));
        assert!(id(0).in_half_open(&id(6), &id(0)));
        assert!(id(2).in_half_open(&id(2), &id(2)));
    }

    #[test]
    fn add_pow2_wraps_modulo_ring() {
        let space = IdSpace::new(3).unwrap();
        assert_eq!(space.add_pow2(id(0), 0), id(1));
        assert_eq!(space.add_pow2(id(6), 1), id(0));
        assert_eq!(space.add_pow2(id(6), 2), id(2));

        let full = IdSpace::new(64).unwrap();
        assert_eq!(full.add_pow2(id(u64::MAX), 0), id(0));
    }

    #[test]
    fn distance_is_clockwise() {
        let space = IdSpace::new(3).unwrap();
        assert_eq!(space.distance(id(6), id(1)), 3);
        assert_eq!(space.distance(id(1), id(6)), 5);
        assert_eq!(space.distance(id(4), id(4)), 0);
    }

    #[test]
    fn hash_stays_inside_ring() {
        let space = IdSpace::new(3).unwrap();
        for port in 7000..7100 {
            let id = space.hash_address(&format!("127.0.0.1:{}", port));
            assert!(id.as_u64() < 8);
        }
        let wide = IdSpace::new(64).unwrap();
        assert_eq!(
            wide.hash_address("127.0.0.1:7000"),
            wide.hash_address("127.0.0.1:7000")
        );
        assert_ne!(
            wide.hash_address("127.0.0.1:7000"),
            wide.hash_address("127.0.0.1:7001")
        );
    }

    #[test]
    fn rejects_invalid_widths() {
        assert!(IdSpace::new(0).is_err());
        assert!(IdSpace::new(65).is_err());
        assert_eq!(IdSpace::new(16).unwrap().id(0x1_0005), id(5));
    }
}
