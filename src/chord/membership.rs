use crate::chord::node::ChordNode;
use crate::chord::types::NodeStatus;
use crate::error::ChordError;
use log::{info, warn};

impl ChordNode {
    /// Starts a new ring with this node as its only member.
    pub async fn create(&self) -> Result<(), ChordError> {
        let mut state = self.state.lock().await;
        if state.status != NodeStatus::Joining {
            return Err(ChordError::InvalidState(format!(
                "cannot create a ring from {:?}",
                state.status
            )));
        }
        state.predecessor = None;
        state.status = NodeStatus::Active;
        info!("Node {} created a new ring", self.local);
        Ok(())
    }

    /// Joins the ring a bootstrap peer belongs to. Only the successor and
    /// successor list are seeded; fingers fill in through fix-fingers.
    pub async fn join(&self, bootstrap_addr: &str) -> Result<(), ChordError> {
        {
            let mut state = self.state.lock().await;
            if state.status != NodeStatus::Joining {
                return Err(ChordError::InvalidState(format!(
                    "cannot join from {:?}",
                    state.status
                )));
            }
            state.predecessor = None;
        }

        info!("Node {} joining through {}", self.local, bootstrap_addr);
        let successor = self
            .call(self.transport.find_successor(bootstrap_addr, self.local.id))
            .await
            .map_err(|e| {
                ChordError::JoinFailed(format!("bootstrap {} lookup failed: {}", bootstrap_addr, e))
            })?;

        if successor.id == self.local.id && successor.addr != self.local.addr {
            return Err(ChordError::IdentifierCollision {
                id: self.local.id,
                existing: successor.addr,
            });
        }

        // The successor list is a best-effort seed: stabilize refills it.
        let tail = if successor.id == self.local.id {
            Vec::new()
        } else {
            match self
                .call(self.transport.get_successor_list(&successor.addr))
                .await
            {
                Ok(list) => list,
                Err(e) => {
                    warn!(
                        "Node {} could not seed successor list from {}: {}",
                        self.local, successor, e
                    );
                    Vec::new()
                }
            }
        };

        let mut state = self.state.lock().await;
        state.successors.replace(successor.clone(), tail);
        state.sync_first_finger();
        state.status = NodeStatus::Active;
        info!("Node {} joined; successor is {}", self.local, successor);
        Ok(())
    }

    /// Graceful departure: link predecessor and successor to each other. A
    /// failed hand-off is not fatal; stabilization on the survivors repairs
    /// the ring without it.
    pub async fn leave(&self) -> Result<(), ChordError> {
        let (predecessor, successor) = {
            let mut state = self.state.lock().await;
            if state.status != NodeStatus::Active {
                return Err(ChordError::InvalidState(format!(
                    "cannot leave from {:?}",
                    state.status
                )));
            }
            state.status = NodeStatus::Leaving;
            (state.predecessor.clone(), state.successor().cloned())
        };

        info!("Node {} leaving the ring", self.local);
        let Some(successor) = successor else {
            return Ok(());
        };

        if let Some(pred) = &predecessor {
            if let Err(e) = self
                .call(self.transport.set_successor(&pred.addr, &successor))
                .await
            {
                warn!("Node {} failed to hand successor to {}: {}", self.local, pred, e);
            }
        }

        if let Err(e) = self
            .call(self.transport.set_predecessor(&successor.addr, predecessor.as_ref()))
            .await
        {
            warn!(
                "Node {} failed to hand predecessor to {}: {}",
                self.local, successor, e
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::chord::node::tests::isolated_node;
    use crate::chord::types::NodeStatus;
    use crate::error::ChordError;

    #[tokio::test]
    async fn create_activates_once() {
        let node = isolated_node(0);
        node.create().await.unwrap();
        assert_eq!(node.status().await, NodeStatus::Active);
        assert!(matches!(node.create().await, Err(ChordError::InvalidState(_))));
    }

    #[tokio::test]
    async fn join_fails_when_bootstrap_is_unreachable() {
        let node = isolated_node(1);
        let err = node.join("node-0").await.unwrap_err();
        assert!(matches!(err, ChordError::JoinFailed(_)));
        assert_eq!(node.status().await, NodeStatus::Joining);
    }

    #[tokio::test]
    async fn lone_node_leaves_without_hand_off() {
        let node = isolated_node(0);
        node.create().await.unwrap();
        node.leave().await.unwrap();
        assert_eq!(node.status().await, NodeStatus::Leaving);
    }
}
