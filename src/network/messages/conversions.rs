use crate::chord::types::{NodeId, NodeRef};
use crate::network::messages::chord::NodeInfo;

impl From<NodeRef> for NodeInfo {
    fn from(node: NodeRef) -> Self {
        NodeInfo {
            node_id: node.id.as_u64(),
            address: node.addr,
        }
    }
}

impl From<&NodeRef> for NodeInfo {
    fn from(node: &NodeRef) -> Self {
        NodeInfo {
            node_id: node.id.as_u64(),
            address: node.addr.clone(),
        }
    }
}

impl From<NodeInfo> for NodeRef {
    fn from(info: NodeInfo) -> Self {
        NodeRef::new(NodeId::from(info.node_id), info.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_info_keeps_identifier_and_address() {
        let node = NodeRef::new(NodeId::from(42), "127.0.0.1:7000");
        let info = NodeInfo::from(&node);
        assert_eq!(info.node_id, 42);
        assert_eq!(info.address, "127.0.0.1:7000");
        assert_eq!(NodeRef::from(info), node);
    }
}
