use crate::chord::node::ChordNode;
use crate::chord::types::NodeRef;
use crate::error::ChordError;
use log::{debug, info, warn};

impl ChordNode {
    /// One stabilize round: learn whether a closer successor has appeared,
    /// announce ourselves to the successor and refresh the successor list
    /// from it.
    pub async fn stabilize(&self) -> Result<(), ChordError> {
        let me = self.local.clone();

        let mut successor = {
            let mut state = self.state.lock().await;
            match state.successor().cloned() {
                Some(successor) => successor,
                None => {
                    // Alone, or cut off from every successor. Any other peer
                    // we still know is a better successor than ourselves.
                    let peers = state.fallback_peers();
                    let Some(peer) = peers
                        .iter()
                        .min_by_key(|p| self.space.distance(me.id, p.id))
                        .cloned()
                    else {
                        return Ok(());
                    };
                    info!(
                        "Node {}: {}; adopting {}",
                        me,
                        ChordError::DegenerateRing { known_peers: peers.len() },
                        peer
                    );
                    state.set_successor(peer.clone());
                    peer
                }
            }
        };

        let candidate = match self.call(self.transport.get_predecessor(&successor.addr)).await {
            Ok(pred) => pred,
            Err(e) => {
                self.evict(&successor, &e).await;
                return Err(e.into());
            }
        };

        if let Some(x) = candidate {
            if x.id.between(&me.id, &successor.id) {
                debug!("Node {} found closer successor {} (was {})", me, x, successor);
                self.state.lock().await.set_successor(x.clone());
                successor = x;
            }
        }

        if let Err(e) = self.call(self.transport.notify(&successor.addr, &me)).await {
            self.evict(&successor, &e).await;
            return Err(e.into());
        }

        let remote_list = match self
            .call(self.transport.get_successor_list(&successor.addr))
            .await
        {
            Ok(list) => list,
            Err(e) => {
                self.evict(&successor, &e).await;
                return Err(e.into());
            }
        };
        self.refresh_successor_list(&successor, remote_list).await;
        Ok(())
    }

    async fn refresh_successor_list(&self, successor: &NodeRef, remote_list: Vec<NodeRef>) {
        let mut state = self.state.lock().await;
        // The head moved while we were talking to the old one.
        if state.successor().map(|s| s.id) != Some(successor.id) {
            debug!(
                "Node {} skipping successor list refresh from stale head {}",
                self.local, successor
            );
            return;
        }
        state.successors.replace(successor.clone(), remote_list);
        state.sync_first_finger();
    }

    /// Refreshes exactly one finger table entry, advancing the round-robin
    /// cursor.
    pub async fn fix_fingers(&self) -> Result<(), ChordError> {
        let (index, start) = {
            let mut state = self.state.lock().await;
            let Some(index) = state.next_finger_index() else {
                return Ok(());
            };
            match state.fingers.start(index) {
                Some(start) => (index, start),
                None => return Ok(()),
            }
        };

        let owner = self.find_successor(start).await?;
        let mut state = self.state.lock().await;
        if state.fingers.get(index).map(|n| n.id) != Some(owner.id) {
            debug!("Node {} finger {} ({}) -> {}", self.local, index, start, owner);
        }
        state.fingers.set(index, Some(owner));
        Ok(())
    }

    /// Refreshes every finger once; used right after joining and in tests.
    pub async fn fix_all_fingers(&self) -> Result<(), ChordError> {
        let rounds = self.space.bits().saturating_sub(1);
        for _ in 0..rounds {
            self.fix_fingers().await?;
        }
        Ok(())
    }

    /// Pings the predecessor and forgets it if it does not answer. An
    /// unknown predecessor is a normal state, healed by the next notify.
    pub async fn check_predecessor(&self) -> Result<(), ChordError> {
        let Some(predecessor) = self.predecessor().await else {
            return Ok(());
        };

        if let Err(e) = self.call(self.transport.ping(&predecessor.addr)).await {
            let mut state = self.state.lock().await;
            if state.predecessor.as_ref().map(|p| p.id) == Some(predecessor.id) {
                debug!(
                    "Node {} clearing predecessor {}: {}",
                    self.local, predecessor, e
                );
                state.predecessor = None;
            }
        }
        Ok(())
    }
}

/// Logs the outcome of a maintenance round without failing the caller.
pub(crate) fn report(node: &ChordNode, task: &str, result: Result<(), ChordError>) {
    if let Err(e) = result {
        match e {
            ChordError::Network(_) | ChordError::LookupFailed { .. } => {
                debug!("Node {} {} round failed: {}", node.local(), task, e)
            }
            _ => warn!("Node {} {} round failed: {}", node.local(), task, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::chord::node::tests::{isolated_node, node_ref};

    #[tokio::test]
    async fn lone_node_stabilize_is_a_no_op() {
        let node = isolated_node(0);
        node.stabilize().await.unwrap();
        assert!(node.successor_list().await.is_empty());
        assert_eq!(node.predecessor().await, None);
    }

    #[tokio::test]
    async fn dead_successor_is_evicted_on_stabilize() {
        let node = isolated_node(0);
        {
            let mut state = node.state.lock().await;
            state.successors.replace(node_ref(3), vec![node_ref(6)]);
            state.sync_first_finger();
        }
        assert!(node.stabilize().await.is_err());
        assert_eq!(node.successor_list().await, vec![node_ref(6)]);
    }

    #[tokio::test]
    async fn unreachable_predecessor_is_cleared() {
        let node = isolated_node(0);
        node.notify(node_ref(6)).await;
        node.check_predecessor().await.unwrap();
        assert_eq!(node.predecessor().await, None);
    }
}
