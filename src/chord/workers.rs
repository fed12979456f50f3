use crate::chord::node::ChordNode;
use crate::chord::stabilize::report;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle on the three periodic maintenance tasks of one node.
pub struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Spawns stabilize, fix-fingers and check-predecessor, each on its own
    /// configured interval.
    pub fn spawn(node: Arc<ChordNode>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = node.config().clone();

        let handles = vec![
            tokio::spawn(run_worker(
                "stabilize",
                config.stabilize_interval(),
                shutdown_rx.clone(),
                node.clone(),
                |node| async move {
                    let result = node.stabilize().await;
                    report(&node, "stabilize", result);
                },
            )),
            tokio::spawn(run_worker(
                "fix-fingers",
                config.fix_finger_interval(),
                shutdown_rx.clone(),
                node.clone(),
                |node| async move {
                    let result = node.fix_fingers().await;
                    report(&node, "fix-fingers", result);
                },
            )),
            tokio::spawn(run_worker(
                "check-predecessor",
                config.check_predecessor_interval(),
                shutdown_rx,
                node.clone(),
                |node| async move {
                    let result = node.check_predecessor().await;
                    report(&node, "check-predecessor", result);
                },
            )),
        ];

        info!("Node {} started maintenance workers", node.local());
        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Stops all workers and waits for their current round to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Maintenance worker ended abnormally: {}", e);
            }
        }
    }
}

async fn run_worker<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    node: Arc<ChordNode>,
    round: F,
) where
    F: Fn(Arc<ChordNode>) -> Fut,
    Fut: Future<Output = ()>,
{
    debug!("Starting {} worker every {:?}", name, period);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => round(node.clone()).await,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    debug!("Stopped {} worker", name);
}
