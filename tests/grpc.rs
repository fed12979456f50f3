//! A small loopback ring over real gRPC.

use std::time::Duration;

use chordring::chord::Transport;
use chordring::network::grpc::GrpcTransport;
use chordring::network::ChordPeer;
use chordring::{ChordConfig, NodeId};
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(15);

fn loopback_config() -> ChordConfig {
    ChordConfig {
        timeout_ms: 1000,
        stabilize_interval_ms: 50,
        fix_finger_interval_ms: 20,
        check_predecessor_interval_ms: 50,
        successor_list_size: 3,
        logging: false,
        ..ChordConfig::for_address("127.0.0.1", 0)
    }
}

/// Polls until every peer's successor is the next peer by identifier.
async fn wait_for_ring(peers: &[&ChordPeer]) -> bool {
    let mut ids: Vec<NodeId> = peers.iter().map(|p| p.node().id()).collect();
    ids.sort();

    let closed = async {
        loop {
            let mut ok = true;
            for peer in peers {
                let me = peer.node().id();
                let index = ids.iter().position(|id| *id == me).unwrap_or(0);
                let expected = ids[(index + 1) % ids.len()];
                if peer.node().successor().await.id != expected {
                    ok = false;
                    break;
                }
            }
            if ok {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    timeout(TEST_TIMEOUT, closed).await.is_ok()
}

#[tokio::test]
async fn three_peers_form_a_ring_and_answer_lookups() {
    let mut first = ChordPeer::new(loopback_config()).await.expect("bind first");
    first.create_network().await.expect("create");
    let bootstrap = first.node().local().addr.clone();
    assert!(first.get_port() > 0, "port should be assigned");

    let mut second = ChordPeer::new(loopback_config()).await.expect("bind second");
    second.join(&bootstrap).await.expect("second joins");
    let mut third = ChordPeer::new(loopback_config()).await.expect("bind third");
    third.join(&bootstrap).await.expect("third joins");

    assert!(
        wait_for_ring(&[&first, &second, &third]).await,
        "ring did not close over gRPC"
    );

    // Any member answers for any identifier, including another member's.
    let client = GrpcTransport::new(&loopback_config());
    let target = second.node().id();
    let owner = client
        .find_successor(&bootstrap, target)
        .await
        .expect("remote lookup");
    assert_eq!(owner.id, target);
    client.ping(&third.node().local().addr).await.expect("ping");

    let list = client
        .get_successor_list(&bootstrap)
        .await
        .expect("successor list");
    assert!(
        !list.is_empty() && list.len() <= 2,
        "list holds other members only, got {:?}",
        list
    );
    assert!(list.iter().all(|n| n.id != first.node().id()));

    third.shutdown().await.expect("third leaves");
    assert!(
        wait_for_ring(&[&first, &second]).await,
        "ring did not close after a graceful leave"
    );

    second.shutdown().await.expect("second leaves");
    first.shutdown().await.expect("first leaves");
}

#[tokio::test]
async fn join_through_a_dead_address_fails() {
    let mut peer = ChordPeer::new(loopback_config()).await.expect("bind");

    // Nothing listens on port 1.
    let result = peer.join("127.0.0.1:1").await;
    assert!(result.is_err(), "join through a closed port must fail");
    peer.shutdown().await.ok();
}
