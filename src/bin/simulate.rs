//! Simulation driver
//!
//! Runs a cluster under the in-process transport, applies a small
//! create workload, optionally crashes nodes, then reports membership
//! and replica health. Same seed, same run.

use clap::Parser;
use ringkv::common::OpKind;
use ringkv::{Cluster, Config, SimConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ringkv-sim")]
#[command(about = "Simulated ringkv cluster: join, replicate, crash, repair")]
struct Cli {
    /// Number of nodes
    #[arg(long, default_value = "10")]
    nodes: usize,

    /// Keys to create once the cluster has converged
    #[arg(long, default_value = "32")]
    keys: usize,

    /// Nodes to crash after the workload
    #[arg(long, default_value = "0")]
    crashes: usize,

    /// Ticks to run after the crashes
    #[arg(long, default_value = "200")]
    ticks: u64,

    /// Probability a frame is silently dropped
    #[arg(long, default_value = "0.0")]
    drop_rate: f64,

    /// RNG seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    anyhow::ensure!(cli.nodes >= 3, "need at least 3 nodes for a replica set");
    anyhow::ensure!(cli.crashes < cli.nodes, "cannot crash every node");

    let sim = SimConfig {
        drop_rate: cli.drop_rate,
        ..SimConfig::default()
    };
    let mut cluster = Cluster::with_sim_config(cli.nodes, Config::default(), cli.seed, sim);
    cluster.start_all();
    cluster.run(150);
    anyhow::ensure!(cluster.converged(), "cluster failed to converge after join");
    tracing::info!(nodes = cli.nodes, tick = cluster.now(), "cluster converged");

    let keys: Vec<String> = (0..cli.keys).map(|i| format!("key-{}", i)).collect();
    for key in &keys {
        cluster.client(0, |n, now, net| n.client_create(key, "payload", now, net))?;
        cluster.run(3);
    }
    cluster.run(30);
    let outcomes = cluster.node_mut(0).drain_outcomes();
    let created = outcomes
        .iter()
        .filter(|r| r.op == OpKind::Create && r.success)
        .count();
    tracing::info!(created, requested = cli.keys, "workload applied");

    for k in 0..cli.crashes {
        let addr = cluster.node(cli.nodes - 1 - k).addr();
        tracing::info!(%addr, "crashing node");
        cluster.kill(addr);
    }
    cluster.run(cli.ticks);

    let mut healthy = 0usize;
    let mut degraded = 0usize;
    for key in &keys {
        let holders = cluster.holders_of(key);
        if holders.len() == 3 {
            healthy += 1;
        } else {
            degraded += 1;
            tracing::warn!(key, replicas = holders.len(), "key below replication target");
        }
    }
    tracing::info!(
        tick = cluster.now(),
        healthy,
        degraded,
        converged = cluster.converged(),
        "simulation finished"
    );
    Ok(())
}
