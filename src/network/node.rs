use crate::chord::node::ChordNode;
use crate::chord::workers::Maintenance;
use crate::config::ChordConfig;
use crate::error::{NetworkError, RingError};
use crate::network::grpc::{GrpcThread, GrpcTransport};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const STATE_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// A ring member reachable over gRPC: server, node state and maintenance.
pub struct ChordPeer {
    node: Arc<ChordNode>,
    port: u16,
    grpc_handle: Option<JoinHandle<Result<(), NetworkError>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    maintenance: Option<Maintenance>,
}

impl ChordPeer {
    /// Binds the listener and starts serving. The node's identifier is the
    /// hash of its advertised address.
    pub async fn new(config: ChordConfig) -> Result<Self, RingError> {
        config.validate()?;

        let listener = TcpListener::bind(config.listen_address()).await?;
        let port = listener.local_addr()?.port();
        let advertised = format!("{}:{}", config.addr, port);

        let transport = Arc::new(GrpcTransport::new(&config));
        let node = Arc::new(ChordNode::from_config(advertised, config, transport)?);
        info!(
            "Node {} (id {}) listening on port {}",
            node.local(),
            node.id().to_hex(),
            port
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let grpc_thread = GrpcThread::new(node.clone(), listener, shutdown_rx);
        let grpc_handle = tokio::spawn(grpc_thread.run());

        Ok(Self {
            node,
            port,
            grpc_handle: Some(grpc_handle),
            shutdown_tx: Some(shutdown_tx),
            maintenance: None,
        })
    }

    pub fn node(&self) -> &Arc<ChordNode> {
        &self.node
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Starts a new ring with this peer as its first member.
    pub async fn create_network(&mut self) -> Result<(), RingError> {
        self.node.create().await?;
        self.start_maintenance();
        Ok(())
    }

    /// Joins an existing ring through any of its members.
    pub async fn join(&mut self, bootstrap_addr: &str) -> Result<(), RingError> {
        self.node.join(bootstrap_addr).await?;
        self.start_maintenance();
        Ok(())
    }

    fn start_maintenance(&mut self) {
        if self.maintenance.is_none() {
            self.maintenance = Some(Maintenance::spawn(self.node.clone()));
        }
    }

    /// Serves until Ctrl-C, then leaves the ring gracefully.
    pub async fn run(&mut self) -> Result<(), RingError> {
        info!("Node {} running; press Ctrl-C to leave", self.node.local());
        let mut state_log = tokio::time::interval(STATE_LOG_INTERVAL);

        loop {
            tokio::select! {
                _ = state_log.tick() => {
                    let snapshot = self.node.snapshot().await;
                    match serde_json::to_string(&snapshot) {
                        Ok(json) => debug!("Node state: {}", json),
                        Err(e) => warn!("Failed to serialise node state: {}", e),
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    /// Stops maintenance, hands neighbours over to each other and stops
    /// serving.
    pub async fn shutdown(&mut self) -> Result<(), RingError> {
        if let Some(maintenance) = self.maintenance.take() {
            maintenance.shutdown().await;
        }

        if let Err(e) = self.node.leave().await {
            warn!("Leave was not clean: {}", e);
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.grpc_handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(e) => error!("gRPC server task failed: {}", e),
            }
        }
        info!("Node {} shut down", self.node.local());
        Ok(())
    }
}
