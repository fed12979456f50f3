use crate::chord::routing::{Finger, FingerTable, SuccessorList};
use crate::chord::transport::Transport;
use crate::chord::types::{IdSpace, NodeId, NodeRef, NodeStatus};
use crate::config::ChordConfig;
use crate::error::{ConfigError, NetworkError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mutable routing state of one node. Only ever touched under the node's
/// mutex, and never across a remote call.
#[derive(Debug)]
pub struct ChordState {
    pub status: NodeStatus,
    pub predecessor: Option<NodeRef>,
    pub successors: SuccessorList,
    pub fingers: FingerTable,
    next_finger: usize,
}

impl ChordState {
    fn new(space: IdSpace, owner: NodeId, successor_list_size: usize) -> Self {
        Self {
            status: NodeStatus::Joining,
            predecessor: None,
            successors: SuccessorList::new(owner, successor_list_size),
            fingers: FingerTable::new(space, owner),
            next_finger: 1,
        }
    }

    pub fn successor(&self) -> Option<&NodeRef> {
        self.successors.first()
    }

    /// Installs a closer immediate successor.
    pub fn set_successor(&mut self, node: NodeRef) {
        self.successors.push_front(node);
        self.sync_first_finger();
    }

    /// finger[0] always mirrors the successor list head.
    pub fn sync_first_finger(&mut self) {
        let head = self.successors.first().cloned();
        self.fingers.set(0, head);
    }

    /// Drops every reference to a peer presumed gone.
    pub fn evict(&mut self, id: NodeId) -> bool {
        let mut touched = self.successors.remove(id);
        touched |= self.fingers.clear_node(id) > 0;
        if self.predecessor.as_ref().is_some_and(|p| p.id == id) {
            self.predecessor = None;
            touched = true;
        }
        self.sync_first_finger();
        touched
    }

    /// Round-robin cursor for fix-fingers. Index 0 is skipped: it is owned
    /// by stabilize through the successor list.
    pub fn next_finger_index(&mut self) -> Option<usize> {
        let len = self.fingers.len();
        if len < 2 {
            return None;
        }
        let index = self.next_finger;
        self.next_finger = if index + 1 >= len { 1 } else { index + 1 };
        Some(index)
    }

    /// Peers other than the successor list that could stand in as successor.
    pub fn fallback_peers(&self) -> Vec<NodeRef> {
        let mut peers: Vec<NodeRef> = self.fingers.known_peers().into_iter().cloned().collect();
        if let Some(pred) = &self.predecessor {
            if !peers.iter().any(|p| p.id == pred.id) {
                peers.push(pred.clone());
            }
        }
        peers
    }
}

/// Serialisable view of a node's local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub status: NodeStatus,
    pub local: NodeRef,
    pub predecessor: Option<NodeRef>,
    pub successors: Vec<NodeRef>,
    pub fingers: Vec<Finger>,
}

/// One ring member: its identity, its routing state and the transport it
/// uses to reach peers.
pub struct ChordNode {
    pub(crate) local: NodeRef,
    pub(crate) space: IdSpace,
    pub(crate) config: ChordConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) state: Mutex<ChordState>,
}

impl std::fmt::Debug for ChordNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChordNode")
            .field("local", &self.local)
            .field("bits", &self.space.bits())
            .finish()
    }
}

impl ChordNode {
    pub fn new(
        local: NodeRef,
        space: IdSpace,
        config: ChordConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let state = ChordState::new(space, local.id, config.successor_list_size);
        Self {
            local,
            space,
            config,
            transport,
            state: Mutex::new(state),
        }
    }

    /// Builds a node whose identifier is the hash of its address.
    pub fn from_config(
        addr: impl Into<String>,
        config: ChordConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let space = config.id_space()?;
        let addr = addr.into();
        let local = NodeRef::new(space.hash_address(&addr), addr);
        Ok(Self::new(local, space, config, transport))
    }

    pub fn local(&self) -> &NodeRef {
        &self.local
    }

    pub fn id(&self) -> NodeId {
        self.local.id
    }

    pub fn space(&self) -> IdSpace {
        self.space
    }

    pub fn config(&self) -> &ChordConfig {
        &self.config
    }

    pub async fn status(&self) -> NodeStatus {
        self.state.lock().await.status
    }

    /// Current best-known successor; the node itself when alone.
    pub async fn successor(&self) -> NodeRef {
        let state = self.state.lock().await;
        state.successor().cloned().unwrap_or_else(|| self.local.clone())
    }

    pub async fn predecessor(&self) -> Option<NodeRef> {
        self.state.lock().await.predecessor.clone()
    }

    pub async fn successor_list(&self) -> Vec<NodeRef> {
        self.state.lock().await.successors.to_vec()
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.lock().await;
        NodeSnapshot {
            status: state.status,
            local: self.local.clone(),
            predecessor: state.predecessor.clone(),
            successors: state.successors.to_vec(),
            fingers: state.fingers.entries().to_vec(),
        }
    }

    /// A peer suggests it may be our predecessor.
    pub async fn notify(&self, candidate: NodeRef) -> bool {
        if candidate.id == self.local.id {
            return false;
        }
        let mut state = self.state.lock().await;
        let accept = match &state.predecessor {
            None => true,
            Some(pred) => candidate.id.between(&pred.id, &self.local.id),
        };
        if accept {
            debug!("Node {} adopting predecessor {}", self.local, candidate);
            state.predecessor = Some(candidate);
        }
        accept
    }

    /// Hand-off from a departing successor.
    pub async fn set_successor(&self, successor: NodeRef) {
        let mut state = self.state.lock().await;
        info!("Node {} relinking successor to {}", self.local, successor);
        state.successors.splice_front(successor);
        state.sync_first_finger();
    }

    /// Hand-off from a departing predecessor.
    pub async fn set_predecessor(&self, predecessor: Option<NodeRef>) {
        let predecessor = predecessor.filter(|p| p.id != self.local.id);
        let mut state = self.state.lock().await;
        match &predecessor {
            Some(p) => info!("Node {} relinking predecessor to {}", self.local, p),
            None => info!("Node {} predecessor handed over as unknown", self.local),
        }
        state.predecessor = predecessor;
    }

    /// Runs one remote call under the configured per-call timeout.
    pub(crate) async fn call<T, F>(&self, fut: F) -> Result<T, NetworkError>
    where
        F: Future<Output = Result<T, NetworkError>>,
    {
        match tokio::time::timeout(self.config.timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout),
        }
    }

    /// Forgets a peer after a failed call to it.
    pub(crate) async fn evict(&self, peer: &NodeRef, cause: &NetworkError) {
        let mut state = self.state.lock().await;
        if state.evict(peer.id) {
            warn!("Node {} evicted {}: {}", self.local, peer, cause);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Transport for which every peer is gone.
    pub(crate) struct DeadTransport;

    #[async_trait]
    impl Transport for DeadTransport {
        async fn find_successor(&self, addr: &str, _id: NodeId) -> Result<NodeRef, NetworkError> {
            Err(NetworkError::Unreachable(addr.to_string()))
        }
        async fn get_predecessor(&self, addr: &str) -> Result<Option<NodeRef>, NetworkError> {
            Err(NetworkError::Unreachable(addr.to_string()))
        }
        async fn get_successor_list(&self, addr: &str) -> Result<Vec<NodeRef>, NetworkError> {
            Err(NetworkError::Unreachable(addr.to_string()))
        }
        async fn notify(&self, addr: &str, _candidate: &NodeRef) -> Result<(), NetworkError> {
            Err(NetworkError::Unreachable(addr.to_string()))
        }
        async fn ping(&self, addr: &str) -> Result<(), NetworkError> {
            Err(NetworkError::Unreachable(addr.to_string()))
        }
        async fn set_successor(&self, addr: &str, _successor: &NodeRef) -> Result<(), NetworkError> {
            Err(NetworkError::Unreachable(addr.to_string()))
        }
        async fn set_predecessor(
            &self,
            addr: &str,
            _predecessor: Option<&NodeRef>,
        ) -> Result<(), NetworkError> {
            Err(NetworkError::Unreachable(addr.to_string()))
        }
    }

    pub(crate) fn node_ref(id: u64) -> NodeRef {
        NodeRef::new(NodeId::from(id), format!("node-{}", id))
    }

    pub(crate) fn isolated_node(id: u64) -> ChordNode {
        let config = ChordConfig {
            successor_list_size: 2,
            timeout_ms: 100,
            ..ChordConfig::default()
        };
        ChordNode::new(
            node_ref(id),
            IdSpace::new(3).unwrap(),
            config,
            Arc::new(DeadTransport),
        )
    }

    #[tokio::test]
    async fn notify_adopts_closer_predecessor_only() {
        let node = isolated_node(6);
        assert!(node.notify(node_ref(1)).await);
        assert!(node.notify(node_ref(3)).await);
        assert!(!node.notify(node_ref(2)).await);
        assert!(!node.notify(node_ref(6)).await);
        assert_eq!(node.predecessor().await, Some(node_ref(3)));
    }

    #[tokio::test]
    async fn lone_node_is_its_own_successor() {
        let node = isolated_node(0);
        assert_eq!(node.successor().await, node_ref(0));
        assert!(node.successor_list().await.is_empty());
        assert_eq!(node.status().await, NodeStatus::Joining);
    }

    #[tokio::test]
    async fn evict_clears_every_reference() {
        let node = isolated_node(0);
        {
            let mut state = node.state.lock().await;
            state.successors.replace(node_ref(3), vec![node_ref(6)]);
            state.sync_first_finger();
            state.fingers.set(1, Some(node_ref(3)));
            state.fingers.set(2, Some(node_ref(6)));
            state.predecessor = Some(node_ref(3));
        }
        node.evict(&node_ref(3), &NetworkError::Timeout).await;

        let snapshot = node.snapshot().await;
        assert_eq!(snapshot.successors, vec![node_ref(6)]);
        assert_eq!(snapshot.predecessor, None);
        assert_eq!(snapshot.fingers[0].node, Some(node_ref(6)));
        assert_eq!(snapshot.fingers[1].node, None);
    }

    #[tokio::test]
    async fn leave_hand_off_relinks_neighbours() {
        let node = isolated_node(0);
        {
            let mut state = node.state.lock().await;
            state.successors.replace(node_ref(3), vec![node_ref(6)]);
        }
        node.set_successor(node_ref(6)).await;
        assert_eq!(node.successor_list().await, vec![node_ref(6)]);
        assert_eq!(node.snapshot().await.fingers[0].node, Some(node_ref(6)));

        node.set_predecessor(Some(node_ref(0))).await;
        assert_eq!(node.predecessor().await, None);
        node.set_predecessor(Some(node_ref(5))).await;
        assert_eq!(node.predecessor().await, Some(node_ref(5)));
    }

    #[tokio::test]
    async fn finger_cursor_skips_successor_entry() {
        let node = isolated_node(0);
        let mut state = node.state.lock().await;
        let order: Vec<usize> = (0..4).filter_map(|_| state.next_finger_index()).collect();
        assert_eq!(order, vec![1, 2, 1, 2]);
    }
}
