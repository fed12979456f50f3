use crate::chord::transport::Transport;
use crate::chord::types::{NodeId, NodeRef};
use crate::config::ChordConfig;
use crate::error::NetworkError;
use crate::network::messages::chord::{
    chord_node_client::ChordNodeClient, FindSuccessorRequest, GetPredecessorRequest,
    GetSuccessorListRequest, NodeInfo, NotifyRequest, PingRequest, SetPredecessorRequest,
    SetSuccessorRequest,
};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Response, Status};

/// Transport over gRPC. Channels are opened lazily and cached per address;
/// a channel that fails to reach its peer is dropped and rebuilt on the next
/// call.
pub struct GrpcTransport {
    clients: Mutex<HashMap<String, ChordNodeClient<Channel>>>,
    connect_timeout: Duration,
    tcp_nodelay: bool,
    tcp_keepalive: Option<Duration>,
}

impl GrpcTransport {
    pub fn new(config: &ChordConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            connect_timeout: config.timeout(),
            tcp_nodelay: config.tcp_nodelay,
            tcp_keepalive: config.tcp_keepalive(),
        }
    }

    async fn client(&self, addr: &str) -> Result<ChordNodeClient<Channel>, NetworkError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(addr) {
            return Ok(client.clone());
        }

        let uri = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        let channel = Endpoint::from_shared(uri)
            .map_err(|e| NetworkError::Transport(format!("Invalid address {}: {}", addr, e)))?
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(self.tcp_nodelay)
            .tcp_keepalive(self.tcp_keepalive)
            .connect_lazy();

        let client = ChordNodeClient::new(channel);
        clients.insert(addr.to_string(), client.clone());
        Ok(client)
    }

    /// Unwraps a unary response, dropping the cached channel when the peer
    /// could not be reached.
    async fn unary<T>(
        &self,
        addr: &str,
        result: Result<Response<T>, Status>,
    ) -> Result<T, NetworkError> {
        match result {
            Ok(response) => Ok(response.into_inner()),
            Err(status) => {
                let err = status_to_error(addr, &status);
                if err.is_peer_failure() {
                    debug!("Dropping channel to {}: {}", addr, err);
                    self.clients.lock().await.remove(addr);
                }
                Err(err)
            }
        }
    }
}

fn status_to_error(addr: &str, status: &Status) -> NetworkError {
    match status.code() {
        Code::Unavailable => NetworkError::Unreachable(format!("{}: {}", addr, status.message())),
        Code::DeadlineExceeded | Code::Cancelled => NetworkError::Timeout,
        _ => NetworkError::Rpc(format!("{}: {}", addr, status.message())),
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn find_successor(&self, addr: &str, id: NodeId) -> Result<NodeRef, NetworkError> {
        let mut client = self.client(addr).await?;
        let result = client
            .find_successor(FindSuccessorRequest {
                id: id.as_u64(),
                requesting_node: None,
            })
            .await;
        let inner = self.unary(addr, result).await?;

        if inner.success {
            inner
                .successor
                .map(NodeRef::from)
                .ok_or_else(|| NetworkError::Remote("No successor found".to_string()))
        } else {
            Err(NetworkError::Remote(inner.error))
        }
    }

    async fn get_predecessor(&self, addr: &str) -> Result<Option<NodeRef>, NetworkError> {
        let mut client = self.client(addr).await?;
        let result = client
            .get_predecessor(GetPredecessorRequest {
                requesting_node: None,
            })
            .await;
        let inner = self.unary(addr, result).await?;
        Ok(inner.predecessor.map(NodeRef::from))
    }

    async fn get_successor_list(&self, addr: &str) -> Result<Vec<NodeRef>, NetworkError> {
        let mut client = self.client(addr).await?;
        let result = client
            .get_successor_list(GetSuccessorListRequest {
                requesting_node: None,
            })
            .await;
        let inner = self.unary(addr, result).await?;
        Ok(inner.successors.into_iter().map(NodeRef::from).collect())
    }

    async fn notify(&self, addr: &str, candidate: &NodeRef) -> Result<(), NetworkError> {
        let mut client = self.client(addr).await?;
        let result = client
            .notify(NotifyRequest {
                candidate: Some(NodeInfo::from(candidate)),
            })
            .await;
        self.unary(addr, result).await?;
        Ok(())
    }

    async fn ping(&self, addr: &str) -> Result<(), NetworkError> {
        let mut client = self.client(addr).await?;
        let result = client
            .ping(PingRequest {
                timestamp: chrono::Utc::now().timestamp() as u64,
            })
            .await;
        let inner = self.unary(addr, result).await?;
        if inner.alive {
            Ok(())
        } else {
            Err(NetworkError::Remote(format!("{} reports it is shutting down", addr)))
        }
    }

    async fn set_successor(&self, addr: &str, successor: &NodeRef) -> Result<(), NetworkError> {
        let mut client = self.client(addr).await?;
        let result = client
            .set_successor(SetSuccessorRequest {
                successor: Some(NodeInfo::from(successor)),
            })
            .await;
        self.unary(addr, result).await?;
        Ok(())
    }

    async fn set_predecessor(
        &self,
        addr: &str,
        predecessor: Option<&NodeRef>,
    ) -> Result<(), NetworkError> {
        let mut client = self.client(addr).await?;
        let result = client
            .set_predecessor(SetPredecessorRequest {
                predecessor: predecessor.map(NodeInfo::from),
            })
            .await;
        self.unary(addr, result).await?;
        Ok(())
    }
}
