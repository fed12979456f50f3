use crate::chord::node::ChordNode;
use crate::chord::transport::Transport;
use crate::chord::types::{NodeId, NodeRef, NodeStatus};
use crate::error::NetworkError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;

/// In-process network: calls go straight to the handlers of registered
/// nodes. Disconnecting a node makes it unreachable to everyone else, which
/// is how a crash looks from the outside. Stalling a node delays every call
/// to it, which is how a hung or overloaded peer looks.
#[derive(Default)]
pub struct LocalNetwork {
    nodes: RwLock<HashMap<String, Weak<ChordNode>>>,
    stalls: RwLock<HashMap<String, Duration>>,
    lookups: AtomicU64,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, node: &Arc<ChordNode>) {
        self.nodes
            .write()
            .await
            .insert(node.local().addr.clone(), Arc::downgrade(node));
    }

    /// Cuts a node off without telling anyone.
    pub async fn disconnect(&self, addr: &str) -> bool {
        self.nodes.write().await.remove(addr).is_some()
    }

    /// Holds every call to `addr` for `delay` before it is served.
    pub async fn stall(&self, addr: &str, delay: Duration) {
        self.stalls.write().await.insert(addr.to_string(), delay);
    }

    pub async fn resume(&self, addr: &str) {
        self.stalls.write().await.remove(addr);
    }

    /// FindSuccessor calls served so far: each one is a routing hop.
    pub fn lookup_hops(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    async fn resolve(&self, addr: &str) -> Result<Arc<ChordNode>, NetworkError> {
        let stall = self.stalls.read().await.get(addr).copied();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        self.nodes
            .read()
            .await
            .get(addr)
            .and_then(Weak::upgrade)
            .ok_or_else(|| NetworkError::Unreachable(addr.to_string()))
    }
}

#[async_trait]
impl Transport for LocalNetwork {
    async fn find_successor(&self, addr: &str, id: NodeId) -> Result<NodeRef, NetworkError> {
        let node = self.resolve(addr).await?;
        self.lookups.fetch_add(1, Ordering::Relaxed);
        node.find_successor(id)
            .await
            .map_err(|e| NetworkError::Remote(e.to_string()))
    }

    async fn get_predecessor(&self, addr: &str) -> Result<Option<NodeRef>, NetworkError> {
        Ok(self.resolve(addr).await?.predecessor().await)
    }

    async fn get_successor_list(&self, addr: &str) -> Result<Vec<NodeRef>, NetworkError> {
        Ok(self.resolve(addr).await?.successor_list().await)
    }

    async fn notify(&self, addr: &str, candidate: &NodeRef) -> Result<(), NetworkError> {
        self.resolve(addr).await?.notify(candidate.clone()).await;
        Ok(())
    }

    async fn ping(&self, addr: &str) -> Result<(), NetworkError> {
        let node = self.resolve(addr).await?;
        if node.status().await == NodeStatus::Leaving {
            return Err(NetworkError::Remote(format!("{} is shutting down", addr)));
        }
        Ok(())
    }

    async fn set_successor(&self, addr: &str, successor: &NodeRef) -> Result<(), NetworkError> {
        self.resolve(addr).await?.set_successor(successor.clone()).await;
        Ok(())
    }

    async fn set_predecessor(
        &self,
        addr: &str,
        predecessor: Option<&NodeRef>,
    ) -> Result<(), NetworkError> {
        self.resolve(addr)
            .await?
            .set_predecessor(predecessor.cloned())
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::types::IdSpace;
    use crate::config::ChordConfig;

    fn node(id: u64, addr: &str, network: &Arc<LocalNetwork>) -> Arc<ChordNode> {
        let config = ChordConfig {
            timeout_ms: 50,
            ..ChordConfig::default()
        };
        Arc::new(ChordNode::new(
            NodeRef::new(NodeId::from(id), addr),
            IdSpace::new(3).unwrap(),
            config,
            network.clone(),
        ))
    }

    #[tokio::test]
    async fn stalled_peer_times_out_until_resumed() {
        let network = LocalNetwork::new();
        let a = node(1, "a", &network);
        let b = node(5, "b", &network);
        network.register(&a).await;
        network.register(&b).await;

        network.stall("b", Duration::from_millis(500)).await;
        assert_eq!(a.call(network.ping("b")).await, Err(NetworkError::Timeout));

        network.resume("b").await;
        assert_eq!(a.call(network.ping("b")).await, Ok(()));
    }

    #[tokio::test]
    async fn disconnected_peer_is_unreachable() {
        let network = LocalNetwork::new();
        let a = node(1, "a", &network);
        network.register(&a).await;
        assert!(network.disconnect("a").await);
        assert!(matches!(
            network.get_predecessor("a").await,
            Err(NetworkError::Unreachable(_))
        ));
    }
}
