//! In-process rings for experiments and tests.
//!
//! Rings are built on [`LocalNetwork`] with maintenance driven by hand, one
//! round at a time, so runs are repeatable.

use crate::chord::node::ChordNode;
use crate::chord::types::{IdSpace, NodeId, NodeRef};
use crate::config::ChordConfig;
use crate::error::ChordError;
use crate::network::local::LocalNetwork;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

/// A set of nodes sharing one in-process network.
pub struct SimRing {
    pub network: Arc<LocalNetwork>,
    pub space: IdSpace,
    pub config: ChordConfig,
    pub nodes: Vec<Arc<ChordNode>>,
}

impl SimRing {
    pub fn new(space: IdSpace, config: ChordConfig) -> Self {
        Self {
            network: LocalNetwork::new(),
            space,
            config,
            nodes: Vec::new(),
        }
    }

    /// Creates a node with an explicit identifier and registers it.
    pub async fn spawn_node(&mut self, id: NodeId, addr: impl Into<String>) -> Arc<ChordNode> {
        let node = Arc::new(ChordNode::new(
            NodeRef::new(id, addr),
            self.space,
            self.config.clone(),
            self.network.clone(),
        ));
        self.network.register(&node).await;
        self.nodes.push(node.clone());
        node
    }

    /// Creates a node whose identifier is the hash of its address.
    pub async fn spawn_hashed(&mut self, addr: impl Into<String>) -> Arc<ChordNode> {
        let addr = addr.into();
        let id = self.space.hash_address(&addr);
        self.spawn_node(id, addr).await
    }

    pub fn node(&self, id: u64) -> Option<&Arc<ChordNode>> {
        self.nodes.iter().find(|n| n.id().as_u64() == id)
    }

    /// Simulates a crash: the node stops answering and leaves no notice.
    pub async fn kill(&mut self, id: u64) -> Option<Arc<ChordNode>> {
        let index = self.nodes.iter().position(|n| n.id().as_u64() == id)?;
        let node = self.nodes.remove(index);
        self.network.disconnect(&node.local().addr).await;
        Some(node)
    }

    /// Builds a ring from explicit identifiers: the first creates the ring,
    /// the rest join through it, each join settled before the next.
    pub async fn with_ids(
        space: IdSpace,
        config: ChordConfig,
        ids: &[u64],
    ) -> Result<Self, ChordError> {
        let mut ring = Self::new(space, config);
        for (i, &id) in ids.iter().enumerate() {
            let node = ring.spawn_node(space.id(id), format!("node-{}", id)).await;
            if i == 0 {
                node.create().await?;
            } else {
                node.join(&ring.nodes[0].local().addr).await?;
                ring.settle_join().await;
            }
        }
        Ok(ring)
    }

    /// Two rounds are enough for a single join into a consistent ring: the
    /// first lets the joiner notify its successor, the second lets the old
    /// predecessor adopt the joiner.
    async fn settle_join(&self) {
        self.stabilize_round().await;
        self.stabilize_round().await;
    }

    /// One stabilize call on every node, in insertion order.
    pub async fn stabilize_round(&self) {
        for node in &self.nodes {
            // Failures are part of the scenario; eviction already happened.
            let _ = node.stabilize().await;
        }
    }

    /// Runs stabilize rounds until the ring is closed-loop consistent.
    /// Returns the number of rounds used, or `None` if `max_rounds` ran out.
    pub async fn converge(&self, max_rounds: usize) -> Option<usize> {
        for round in 0..=max_rounds {
            if self.is_consistent().await {
                return Some(round);
            }
            if round < max_rounds {
                self.stabilize_round().await;
            }
        }
        None
    }

    pub async fn fix_all_fingers(&self) {
        for node in &self.nodes {
            let _ = node.fix_all_fingers().await;
        }
    }

    pub async fn check_predecessors(&self) {
        for node in &self.nodes {
            let _ = node.check_predecessor().await;
        }
    }

    /// Every node's successor is the next live identifier clockwise, and
    /// that successor's predecessor is the node itself.
    pub async fn is_consistent(&self) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        let by_addr: HashMap<&str, &Arc<ChordNode>> = self
            .nodes
            .iter()
            .map(|n| (n.local().addr.as_str(), n))
            .collect();

        for node in &self.nodes {
            let successor = node.successor().await;
            let expected = self.expected_owner(self.space.add_pow2(node.id(), 0));
            if successor.id != expected.id {
                return false;
            }
            let Some(peer) = by_addr.get(successor.addr.as_str()) else {
                return false;
            };
            if self.nodes.len() > 1 && peer.predecessor().await.map(|p| p.id) != Some(node.id()) {
                return false;
            }
        }
        true
    }

    /// The live node whose identifier is the first at or after `id`.
    pub fn expected_owner(&self, id: NodeId) -> NodeRef {
        let mut refs: Vec<&NodeRef> = self.nodes.iter().map(|n| n.local()).collect();
        refs.sort_by_key(|n| n.id);
        refs.iter()
            .find(|n| n.id >= id)
            .or_else(|| refs.first())
            .map(|n| (*n).clone())
            .unwrap_or_else(|| NodeRef::new(id, String::new()))
    }
}

/// One measured lookup.
#[derive(Debug, Clone)]
pub struct LookupSample {
    pub num_nodes: usize,
    pub lookup: usize,
    pub latency_ms: f64,
    pub hops: u64,
    pub correct: bool,
}

/// Builds a converged ring of each size and measures random lookups on it.
pub async fn run_experiment(
    sizes: &[usize],
    lookups: usize,
    config: &ChordConfig,
    seed: u64,
) -> Result<Vec<LookupSample>, ChordError> {
    if sizes.contains(&0) {
        return Err(ChordError::InvalidState(
            "ring sizes must be at least 1".to_string(),
        ));
    }
    let space = config
        .id_space()
        .map_err(|e| ChordError::InvalidState(e.to_string()))?;
    let mut samples = Vec::with_capacity(sizes.len() * lookups);
    let mut rng = StdRng::seed_from_u64(seed);

    for &size in sizes {
        let mut ring = SimRing::new(space, config.clone());
        for i in 0..size {
            let node = ring.spawn_hashed(format!("sim-{}-{}", size, i)).await;
            if i == 0 {
                node.create().await?;
            } else {
                node.join(&ring.nodes[0].local().addr).await?;
                ring.settle_join().await;
            }
        }
        let rounds = ring.converge(size * 2).await;
        ring.fix_all_fingers().await;
        info!("Ring of {} nodes converged after {:?} extra rounds", size, rounds);

        for lookup in 0..lookups {
            let key = space.id(rng.random::<u64>());
            let origin = &ring.nodes[rng.random_range(0..ring.nodes.len())];
            let hops_before = ring.network.lookup_hops();
            let started = Instant::now();
            let result = origin.find_successor(key).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let correct = result
                .map(|owner| owner.id == ring.expected_owner(key).id)
                .unwrap_or(false);
            samples.push(LookupSample {
                num_nodes: size,
                lookup,
                latency_ms,
                hops: ring.network.lookup_hops() - hops_before,
                correct,
            });
        }
    }
    Ok(samples)
}

/// Writes samples as CSV with a header row.
pub fn write_csv<W: Write>(mut out: W, samples: &[LookupSample]) -> std::io::Result<()> {
    writeln!(out, "num_nodes,lookup,latency_ms,hops,correct")?;
    for s in samples {
        writeln!(
            out,
            "{},{},{:.4},{},{}",
            s.num_nodes, s.lookup, s.latency_ms, s.hops, s.correct
        )?;
    }
    Ok(())
}
