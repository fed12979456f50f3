use crate::chord::types::{NodeId, NodeRef};
use crate::error::NetworkError;
use async_trait::async_trait;

/// Outbound side of the remote call surface. Peers are addressed by network
/// address only; a `NodeRef` is never a live handle.
///
/// Implementations report failures as they see them. The per-call timeout is
/// applied by the node, not by the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn find_successor(&self, addr: &str, id: NodeId) -> Result<NodeRef, NetworkError>;

    async fn get_predecessor(&self, addr: &str) -> Result<Option<NodeRef>, NetworkError>;

    async fn get_successor_list(&self, addr: &str) -> Result<Vec<NodeRef>, NetworkError>;

    async fn notify(&self, addr: &str, candidate: &NodeRef) -> Result<(), NetworkError>;

    async fn ping(&self, addr: &str) -> Result<(), NetworkError>;

    async fn set_successor(&self, addr: &str, successor: &NodeRef) -> Result<(), NetworkError>;

    async fn set_predecessor(
        &self,
        addr: &str,
        predecessor: Option<&NodeRef>,
    ) -> Result<(), NetworkError>;
}
