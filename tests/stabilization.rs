//! Replica repair after membership changes

use ringkv::{Cluster, Config};

fn fast_gossip() -> Config {
    Config {
        t_gossip: 2,
        ..Config::default()
    }
}

fn keys() -> Vec<String> {
    (0..12).map(|i| format!("key-{}", i)).collect()
}

/// Populate a converged cluster with the test keys via node 0
fn populate(cluster: &mut Cluster) {
    for key in keys() {
        cluster
            .client(0, |n, now, net| n.client_create(&key, "payload", now, net))
            .unwrap();
        cluster.run(4);
    }
    let outcomes = cluster.node_mut(0).drain_outcomes();
    assert!(outcomes.iter().all(|res| res.success));
}

#[test]
fn test_every_key_has_three_replicas_after_join() {
    let mut cluster = Cluster::new(5, fast_gossip(), 101);
    for idx in 0..4 {
        cluster.start_node(idx);
    }
    cluster.run(60);
    assert_eq!(cluster.node(0).membership().len(), 4);
    populate(&mut cluster);

    for key in keys() {
        assert_eq!(cluster.holders_of(&key).len(), 3, "pre-join replicas of {}", key);
    }

    // A fifth node joins; ownership shifts and holders hand keys over
    cluster.start_node(4);
    cluster.run(80);
    assert!(cluster.converged());

    for key in keys() {
        let holders = cluster.holders_of(&key);
        assert_eq!(holders.len(), 3, "post-join replicas of {}", key);
        // Holders are exactly the new ring's replica set
        let mut expected = cluster.node(0).ring().replica_addrs(&key);
        let mut got = holders.clone();
        expected.sort();
        got.sort();
        assert_eq!(got, expected, "replica placement of {}", key);
    }
}

#[test]
fn test_replicas_restored_after_node_failure() {
    let mut cluster = Cluster::new(4, fast_gossip(), 103);
    cluster.start_all();
    cluster.run(60);
    assert!(cluster.converged());
    populate(&mut cluster);

    for key in keys() {
        assert_eq!(cluster.holders_of(&key).len(), 3);
    }

    // Crash one node; the survivors detect it, rebuild the ring and
    // re-replicate everything it held.
    let victim = cluster.node(3).addr();
    cluster.kill(victim);
    cluster.run(100);

    for idx in 0..3 {
        assert!(!cluster.node(idx).membership().contains(victim));
    }
    for key in keys() {
        let holders = cluster.holders_of(&key);
        assert_eq!(holders.len(), 3, "post-failure replicas of {}", key);
        assert!(!holders.contains(&victim));
    }
}

#[test]
fn test_repair_push_retries_after_drop() {
    let mut cluster = Cluster::new(4, fast_gossip(), 109);
    cluster.start_all();
    cluster.run(60);
    assert!(cluster.converged());

    let victim = cluster.node(3).addr();
    let bystander = cluster.node(2).addr();
    // A key replicated on the victim but not on the bystander: after
    // the victim's removal the bystander is the one new replica target.
    let key = (0..4096)
        .map(|i| format!("scan-{}", i))
        .find(|k| {
            let set = cluster.node(0).ring().replica_addrs(k);
            set.contains(&victim) && !set.contains(&bystander)
        })
        .expect("some key maps onto the victim but not the bystander");

    cluster
        .client(0, |n, now, net| n.client_create(&key, "payload", now, net))
        .unwrap();
    cluster.run(5);
    assert!(cluster.node_mut(0).drain_outcomes()[0].success);
    assert_eq!(cluster.holders_of(&key).len(), 3);

    // The bystander is unreachable exactly when the survivors rebuild
    // and push; those pushes are lost.
    cluster.kill(victim);
    cluster.run(18);
    cluster.partition(bystander);
    cluster.run(14);
    cluster.heal(bystander);
    cluster.run(60);

    let holders = cluster.holders_of(&key);
    assert_eq!(holders.len(), 3, "replicas of {}", key);
    assert!(holders.contains(&bystander));
}

#[test]
fn test_stabilized_values_remain_readable() {
    let mut cluster = Cluster::new(4, fast_gossip(), 107);
    cluster.start_all();
    cluster.run(60);
    populate(&mut cluster);

    let victim = cluster.node(3).addr();
    cluster.kill(victim);
    cluster.run(100);

    // Every key still reads back with quorum from the surviving nodes
    for key in keys() {
        cluster
            .client(1, |n, now, net| n.client_read(&key, now, net))
            .unwrap();
        cluster.run(4);
        let outcomes = cluster.node_mut(1).drain_outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success, "read of {} failed", key);
        assert_eq!(outcomes[0].value.as_deref(), Some("payload"));
    }
}
