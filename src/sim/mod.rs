//! In-process simulation harness
//!
//! [`SimNet`] is an unreliable transport: frames are delivered on a later
//! tick and can be dropped, duplicated or delayed, all driven by a
//! seeded RNG so runs replay exactly. [`Cluster`] owns a set of nodes
//! and the net, advancing everything on one shared tick. Used by the
//! scenario tests; nothing here is production surface.

use crate::common::{Config, MemoryLog, NodeAddr, Tick};
use crate::node::{Node, Transport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;

/// Failure behavior of the simulated transport
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Probability a frame is silently dropped
    pub drop_rate: f64,
    /// Probability a frame is delivered twice
    pub dup_rate: f64,
    /// Extra delivery delay, uniform in 0..=max_extra_delay ticks
    pub max_extra_delay: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            dup_rate: 0.0,
            max_extra_delay: 0,
        }
    }
}

struct Envelope {
    to: NodeAddr,
    deliver_at: Tick,
    payload: Vec<u8>,
}

/// Lossy, delaying, duplicating message substrate
pub struct SimNet {
    cfg: SimConfig,
    rng: StdRng,
    now: Tick,
    in_flight: Vec<Envelope>,
    /// Addresses cut off from the network, both directions
    cut: HashSet<NodeAddr>,
}

impl SimNet {
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, SimConfig::default())
    }

    pub fn with_config(seed: u64, cfg: SimConfig) -> Self {
        Self {
            cfg,
            rng: StdRng::seed_from_u64(seed),
            now: 0,
            in_flight: Vec::new(),
            cut: HashSet::new(),
        }
    }

    pub fn set_now(&mut self, now: Tick) {
        self.now = now;
    }

    /// Sever an address from the network
    pub fn partition(&mut self, addr: NodeAddr) {
        self.cut.insert(addr);
    }

    pub fn heal(&mut self, addr: NodeAddr) {
        self.cut.remove(&addr);
    }

    /// Frames due for delivery at `now`, in send order
    pub fn take_due(&mut self, now: Tick) -> Vec<(NodeAddr, Vec<u8>)> {
        let mut due = Vec::new();
        let mut rest = Vec::with_capacity(self.in_flight.len());
        for env in self.in_flight.drain(..) {
            if env.deliver_at <= now {
                due.push((env.to, env.payload));
            } else {
                rest.push(env);
            }
        }
        self.in_flight = rest;
        // A partition also eats frames already in flight
        due.retain(|(to, _)| !self.cut.contains(to));
        due
    }

    fn schedule(&mut self, to: NodeAddr, payload: Vec<u8>) {
        let extra = if self.cfg.max_extra_delay == 0 {
            0
        } else {
            self.rng.gen_range(0..=self.cfg.max_extra_delay)
        };
        self.in_flight.push(Envelope {
            to,
            deliver_at: self.now + 1 + extra,
            payload,
        });
    }
}

impl Transport for SimNet {
    fn send(&mut self, from: NodeAddr, to: NodeAddr, payload: Vec<u8>) {
        if self.cut.contains(&from) || self.cut.contains(&to) {
            return;
        }
        if self.cfg.drop_rate > 0.0 && self.rng.gen::<f64>() < self.cfg.drop_rate {
            return;
        }
        let duplicate = self.cfg.dup_rate > 0.0 && self.rng.gen::<f64>() < self.cfg.dup_rate;
        self.schedule(to, payload.clone());
        if duplicate {
            self.schedule(to, payload);
        }
    }
}

/// A set of nodes plus the net, advanced on one shared tick
pub struct Cluster {
    nodes: Vec<Node>,
    net: SimNet,
    now: Tick,
    dead: HashSet<NodeAddr>,
    log: Arc<MemoryLog>,
}

impl Cluster {
    /// Build `n` nodes with addresses 1..=n (port 0). Node 1 is the
    /// introducer under the default config.
    pub fn new(n: usize, cfg: Config, seed: u64) -> Self {
        Self::with_sim_config(n, cfg, seed, SimConfig::default())
    }

    pub fn with_sim_config(n: usize, cfg: Config, seed: u64, sim: SimConfig) -> Self {
        let log = Arc::new(MemoryLog::new());
        let nodes = (1..=n as u32)
            .map(|i| {
                Node::new(
                    NodeAddr::new(i, 0),
                    cfg.clone(),
                    seed.wrapping_add(u64::from(i)),
                    Arc::clone(&log) as Arc<dyn crate::common::EventLog>,
                )
                .expect("valid config")
            })
            .collect();
        Self {
            nodes,
            net: SimNet::with_config(seed, sim),
            now: 0,
            dead: HashSet::new(),
            log,
        }
    }

    /// Start every node's join handshake
    pub fn start_all(&mut self) {
        for node in &mut self.nodes {
            node.start(self.now, &mut self.net);
        }
    }

    /// Start a single node's join handshake (staggered joins)
    pub fn start_node(&mut self, idx: usize) {
        self.nodes[idx].start(self.now, &mut self.net);
    }

    /// Advance the whole cluster one tick
    pub fn tick(&mut self) {
        self.now += 1;
        self.net.set_now(self.now);
        for (to, payload) in self.net.take_due(self.now) {
            if self.dead.contains(&to) {
                continue;
            }
            if let Some(node) = self.nodes.iter_mut().find(|n| n.addr() == to) {
                node.enqueue(payload);
            }
        }
        for node in &mut self.nodes {
            if self.dead.contains(&node.addr()) {
                continue;
            }
            node.tick(self.now, &mut self.net);
        }
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Crash a node: it stops ticking and is cut from the network
    pub fn kill(&mut self, addr: NodeAddr) {
        self.dead.insert(addr);
        self.net.partition(addr);
    }

    /// Cut a node's network without stopping its loop
    pub fn partition(&mut self, addr: NodeAddr) {
        self.net.partition(addr);
    }

    pub fn heal(&mut self, addr: NodeAddr) {
        self.net.heal(addr);
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn log(&self) -> &MemoryLog {
        &self.log
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut Node {
        &mut self.nodes[idx]
    }

    pub fn net_mut(&mut self) -> &mut SimNet {
        &mut self.net
    }

    /// Issue a client operation from node `idx` at the current tick
    pub fn client<F>(&mut self, idx: usize, f: F) -> crate::Result<u64>
    where
        F: FnOnce(&mut Node, Tick, &mut dyn Transport) -> crate::Result<u64>,
    {
        f(&mut self.nodes[idx], self.now, &mut self.net)
    }

    /// Live nodes currently holding `key`
    pub fn holders_of(&self, key: &str) -> Vec<NodeAddr> {
        self.nodes
            .iter()
            .filter(|n| !self.dead.contains(&n.addr()) && n.store().contains(key))
            .map(|n| n.addr())
            .collect()
    }

    /// Are all live nodes joined with identical membership views?
    pub fn converged(&self) -> bool {
        let live: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| !self.dead.contains(&n.addr()))
            .collect();
        let Some(first) = live.first() else {
            return true;
        };
        let view = first.membership().addrs();
        live.iter()
            .all(|n| n.is_joined() && n.membership().addrs() == view)
    }
}
