//! Membership scenarios: join, gossip convergence, failure detection

use ringkv::common::NodeAddr;
use ringkv::{Cluster, Config};

fn fast_gossip() -> Config {
    Config {
        t_gossip: 2,
        ..Config::default()
    }
}

#[test]
fn test_cluster_joins_and_converges() {
    let mut cluster = Cluster::new(5, fast_gossip(), 11);
    cluster.start_all();
    cluster.run(100);

    assert!(cluster.converged());
    for idx in 0..5 {
        let node = cluster.node(idx);
        assert!(node.is_joined());
        assert_eq!(node.membership().len(), 5);
    }
}

#[test]
fn test_heartbeats_advance_everywhere() {
    let mut cluster = Cluster::new(3, fast_gossip(), 5);
    cluster.start_all();
    cluster.run(60);

    // Every node's entry for every peer has seen the peer's heartbeat
    // rise well past zero by now.
    for idx in 0..3 {
        let membership = cluster.node(idx).membership();
        for peer in membership.addrs() {
            assert!(
                membership.entry(peer).unwrap().heartbeat > 0,
                "node {} never saw a heartbeat from {}",
                idx,
                peer
            );
        }
    }
}

#[test]
fn test_failed_node_removed_exactly_once() {
    let mut cluster = Cluster::new(3, fast_gossip(), 7);
    cluster.start_all();
    cluster.run(60);
    assert!(cluster.converged());

    let a = NodeAddr::new(1, 0);
    let b = NodeAddr::new(2, 0);
    let c = NodeAddr::new(3, 0);
    cluster.kill(c);

    // t_fail to suspect, t_remove to drop, plus gossip slack
    cluster.run(60);

    for idx in 0..2 {
        let node = cluster.node(idx);
        assert!(!node.membership().contains(c));
        assert_eq!(node.membership().len(), 2);
    }
    assert_eq!(cluster.log().removals_of(a, c), 1);
    assert_eq!(cluster.log().removals_of(b, c), 1);
}

#[test]
fn test_partitioned_node_recovers_before_removal() {
    let cfg = fast_gossip();
    let mut cluster = Cluster::new(3, cfg.clone(), 3);
    cluster.start_all();
    cluster.run(60);

    let c = NodeAddr::new(3, 0);
    cluster.partition(c);
    // Long enough to be suspected, well short of removal
    cluster.run(cfg.t_fail + 2);
    assert!(cluster.node(0).membership().is_suspected(c));

    cluster.heal(c);
    cluster.run(30);

    // Fresh heartbeats rescued the suspect; nobody logged a removal
    for idx in 0..3 {
        assert!(cluster.node(idx).membership().contains(c));
        assert!(!cluster.node(idx).membership().is_suspected(c));
    }
    assert_eq!(cluster.log().removals_of(NodeAddr::new(1, 0), c), 0);
    assert_eq!(cluster.log().removals_of(NodeAddr::new(2, 0), c), 0);
}

#[test]
fn test_late_joiner_is_absorbed() {
    let mut cluster = Cluster::new(4, fast_gossip(), 19);
    for idx in 0..3 {
        cluster.start_node(idx);
    }
    cluster.run(40);
    assert_eq!(cluster.node(0).membership().len(), 3);

    cluster.start_node(3);
    cluster.run(40);

    assert!(cluster.converged());
    for idx in 0..4 {
        assert_eq!(cluster.node(idx).membership().len(), 4);
    }
}

#[test]
fn test_removed_peer_never_resurrects() {
    let mut cluster = Cluster::new(4, fast_gossip(), 13);
    cluster.start_all();
    cluster.run(60);
    assert!(cluster.converged());

    let ghost = cluster.node(3).addr();
    let blinked = cluster.node(1).addr();
    cluster.kill(ghost);
    // A short blip on one survivor staggers removal ticks across the
    // cluster while views of the dead peer are still circulating.
    cluster.run(10);
    cluster.partition(blinked);
    cluster.run(4);
    cluster.heal(blinked);
    cluster.run(300);

    for idx in 0..3 {
        let node = cluster.node(idx);
        assert!(
            !node.membership().contains(ghost),
            "node {} still sees the dead peer",
            idx
        );
        assert_eq!(cluster.log().removals_of(node.addr(), ghost), 1);
    }
    assert!(cluster.converged());
}

#[test]
fn test_join_retries_after_dropped_request() {
    let mut cluster = Cluster::new(3, fast_gossip(), 17);
    let straggler = NodeAddr::new(3, 0);

    // The straggler's first join request is eaten by the network.
    cluster.partition(straggler);
    cluster.start_all();
    cluster.run(3);
    assert!(!cluster.node(2).is_joined());

    cluster.heal(straggler);
    cluster.run(60);

    assert!(cluster.node(2).is_joined());
    assert!(cluster.converged());
    for idx in 0..3 {
        assert_eq!(cluster.node(idx).membership().len(), 3);
    }
}

#[test]
fn test_gossip_survives_duplication() {
    let sim = ringkv::SimConfig {
        dup_rate: 0.5,
        ..Default::default()
    };
    let mut cluster = Cluster::with_sim_config(4, fast_gossip(), 23, sim);
    cluster.start_all();
    cluster.run(100);

    // Merges are idempotent: duplicated gossip changes nothing
    assert!(cluster.converged());
    for idx in 0..4 {
        assert_eq!(cluster.node(idx).membership().len(), 4);
    }
}
