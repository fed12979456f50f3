use crate::chord::node::ChordNode;
use crate::error::NetworkError;
use crate::network::grpc::server::ChordGrpcServer;
use crate::network::messages::chord::chord_node_server::ChordNodeServer;
use futures::FutureExt;
use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Serves one node's gRPC surface until the shutdown signal fires.
pub struct GrpcThread {
    node: Arc<ChordNode>,
    listener: TcpListener,
    shutdown_rx: oneshot::Receiver<()>,
}

impl GrpcThread {
    /// The listener is bound by the caller so the address is known, and
    /// connectable, before the server task starts.
    pub fn new(
        node: Arc<ChordNode>,
        listener: TcpListener,
        shutdown_rx: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            node,
            listener,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> Result<(), NetworkError> {
        let config = self.node.config().clone();
        let local_addr = self
            .listener
            .local_addr()
            .map_err(|e| NetworkError::Transport(format!("Listener has no address: {}", e)))?;

        info!("Starting gRPC server on {}", local_addr);

        let server = ChordGrpcServer::new(self.node.clone());
        let incoming = TcpListenerStream::new(self.listener);

        let result = Server::builder()
            .tcp_nodelay(config.tcp_nodelay)
            .tcp_keepalive(config.tcp_keepalive())
            .add_service(ChordNodeServer::new(server))
            .serve_with_incoming_shutdown(incoming, self.shutdown_rx.map(|_| ()))
            .await;

        match result {
            Ok(_) => {
                info!("gRPC server on {} shut down gracefully", local_addr);
                Ok(())
            }
            Err(e) => {
                error!("gRPC server encountered a fatal error: {:?}", e);
                Err(NetworkError::Transport(format!("Server error: {}", e)))
            }
        }
    }
}
