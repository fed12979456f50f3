use crate::chord::node::ChordNode;
use crate::chord::types::{NodeId, NodeRef};
use crate::error::ChordError;
use log::debug;
use std::collections::HashSet;

enum Route {
    /// The node itself owns the target.
    Local,
    /// The target falls in (self, successor]; the successor must still be
    /// confirmed alive.
    Successor(NodeRef),
    Forward(NodeRef),
}

impl ChordNode {
    /// Resolves the node responsible for `id`: the first node at or
    /// clockwise after it.
    ///
    /// Hops that fail are evicted (or, if the peer answered with an error,
    /// skipped) and the next-best known route is tried. A successor
    /// is pinged before it is returned as the answer, so a crashed one gives
    /// way to the next successor list entry. The lookup only fails once no
    /// untried route remains.
    pub async fn find_successor(&self, id: NodeId) -> Result<NodeRef, ChordError> {
        let mut excluded: HashSet<NodeId> = HashSet::new();

        loop {
            let hop = match self.next_route(id, &excluded).await? {
                Route::Local => return Ok(self.local.clone()),
                Route::Successor(successor) => {
                    match self.call(self.transport.ping(&successor.addr)).await {
                        Ok(()) => return Ok(successor),
                        Err(e) => {
                            debug!("Successor {} failed liveness check: {}", successor, e);
                            self.evict(&successor, &e).await;
                            excluded.insert(successor.id);
                            continue;
                        }
                    }
                }
                Route::Forward(hop) => hop,
            };

            match self.call(self.transport.find_successor(&hop.addr, id)).await {
                Ok(node) => return Ok(node),
                Err(e) if e.is_peer_failure() => {
                    debug!("Hop {} failed while resolving {}: {}", hop, id, e);
                    self.evict(&hop, &e).await;
                }
                Err(e) => {
                    debug!("Hop {} could not resolve {}: {}", hop, id, e);
                }
            }
            excluded.insert(hop.id);
        }
    }

    /// Resolves the owner of an arbitrary key.
    pub async fn lookup(&self, key: &[u8]) -> Result<NodeRef, ChordError> {
        self.find_successor(self.space.hash(key)).await
    }

    async fn next_route(
        &self,
        id: NodeId,
        excluded: &HashSet<NodeId>,
    ) -> Result<Route, ChordError> {
        let state = self.state.lock().await;
        let me = self.local.id;

        // With the successor list emptied by evictions the nearest peer still
        // held in a finger or as predecessor stands in for the successor.
        let successor = match state.successor() {
            Some(successor) => Some(successor.clone()),
            None => state
                .fallback_peers()
                .into_iter()
                .filter(|p| !excluded.contains(&p.id))
                .min_by_key(|p| self.space.distance(me, p.id)),
        };

        if let Some(successor) = &successor {
            if id.in_half_open(&me, &successor.id) {
                return Ok(Route::Successor(successor.clone()));
            }
        }

        let from_fingers = state.fingers.closest_preceding(id, excluded);
        let from_successors = state.successors.closest_preceding(id, excluded);
        let hop = match (from_fingers, from_successors) {
            (Some(f), Some(s)) => {
                if self.space.distance(me, s.id) > self.space.distance(me, f.id) {
                    Some(s)
                } else {
                    Some(f)
                }
            }
            (f, s) => f.or(s),
        };
        let hop = hop.or_else(|| {
            successor
                .as_ref()
                .filter(|s| s.id.between(&me, &id) && !excluded.contains(&s.id))
        });

        match hop {
            Some(hop) => Ok(Route::Forward(hop.clone())),
            None if successor.is_none() && excluded.is_empty() => Ok(Route::Local),
            None => Err(ChordError::LookupFailed {
                id,
                reason: format!("no live route left after trying {} peer(s)", excluded.len()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::chord::node::tests::{isolated_node, node_ref};
    use crate::chord::node::ChordNode;
    use crate::chord::transport::Transport;
    use crate::chord::types::{IdSpace, NodeId, NodeRef};
    use crate::config::ChordConfig;
    use crate::error::{ChordError, NetworkError};
    use async_trait::async_trait;
    use std::sync::Arc;

    #[tokio::test]
    async fn single_node_owns_everything() {
        let node = isolated_node(5);
        for k in 0..8 {
            assert_eq!(node.find_successor(NodeId::from(k)).await.unwrap(), node_ref(5));
        }
        assert_eq!(node.lookup(b"any key").await.unwrap(), node_ref(5));
    }

    #[tokio::test]
    async fn dead_successor_is_never_returned() {
        let node = isolated_node(0);
        {
            let mut state = node.state.lock().await;
            state.successors.replace(node_ref(3), vec![node_ref(6)]);
            state.sync_first_finger();
        }
        // 2 falls to successor 3, which does not answer its ping; 6 takes
        // over and is dead as well.
        let err = node.find_successor(NodeId::from(2)).await.unwrap_err();
        assert!(matches!(err, ChordError::LookupFailed { .. }));
        assert!(node.successor_list().await.is_empty());
    }

    /// Answers every lookup with an error status but is otherwise alive.
    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn find_successor(&self, addr: &str, _id: NodeId) -> Result<NodeRef, NetworkError> {
            Err(NetworkError::Rpc(format!("{}: unimplemented", addr)))
        }
        async fn get_predecessor(&self, _addr: &str) -> Result<Option<NodeRef>, NetworkError> {
            Ok(None)
        }
        async fn get_successor_list(&self, _addr: &str) -> Result<Vec<NodeRef>, NetworkError> {
            Ok(Vec::new())
        }
        async fn notify(&self, _addr: &str, _candidate: &NodeRef) -> Result<(), NetworkError> {
            Ok(())
        }
        async fn ping(&self, _addr: &str) -> Result<(), NetworkError> {
            Ok(())
        }
        async fn set_successor(&self, _addr: &str, _successor: &NodeRef) -> Result<(), NetworkError> {
            Ok(())
        }
        async fn set_predecessor(
            &self,
            _addr: &str,
            _predecessor: Option<&NodeRef>,
        ) -> Result<(), NetworkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn refusing_hop_is_skipped_not_evicted() {
        let config = ChordConfig {
            successor_list_size: 2,
            timeout_ms: 100,
            ..ChordConfig::default()
        };
        let node = ChordNode::new(
            node_ref(0),
            IdSpace::new(3).unwrap(),
            config,
            Arc::new(RefusingTransport),
        );
        {
            let mut state = node.state.lock().await;
            state.successors.replace(node_ref(3), vec![node_ref(6)]);
            state.sync_first_finger();
        }

        let err = node.find_successor(NodeId::from(7)).await.unwrap_err();
        assert!(matches!(err, ChordError::LookupFailed { .. }));
        assert_eq!(node.successor_list().await, vec![node_ref(3), node_ref(6)]);
    }

    #[tokio::test]
    async fn never_answers_for_itself_while_peers_are_known() {
        let node = isolated_node(0);
        {
            let mut state = node.state.lock().await;
            state.predecessor = Some(node_ref(6));
            state.fingers.set(2, Some(node_ref(6)));
        }
        // 6 is the only candidate owner of 5 and it is dead, so the lookup
        // fails instead of falling back to the local node.
        let err = node.find_successor(NodeId::from(5)).await.unwrap_err();
        assert!(matches!(err, ChordError::LookupFailed { .. }));
        assert_eq!(node.predecessor().await, None);
    }

    #[tokio::test]
    async fn fails_once_every_route_is_dead() {
        let node = isolated_node(0);
        {
            let mut state = node.state.lock().await;
            state.successors.replace(node_ref(3), vec![node_ref(6)]);
            state.sync_first_finger();
            state.fingers.set(2, Some(node_ref(6)));
        }
        let err = node.find_successor(NodeId::from(7)).await.unwrap_err();
        assert!(matches!(err, ChordError::LookupFailed { .. }));
        let snapshot = node.snapshot().await;
        assert!(snapshot.successors.is_empty());
        assert!(snapshot.fingers.iter().all(|f| f.node.is_none()));
    }
}
