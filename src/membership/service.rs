//! Heartbeat membership with gossip dissemination
//!
//! Each node keeps a local view of the cluster: one entry per known peer
//! (itself included) carrying the peer's heartbeat counter and the local
//! time the entry last advanced. Every `t_gossip` ticks the node bumps
//! its own heartbeat and pushes its full view to one random peer. Peers
//! whose heartbeat stalls for `t_fail` ticks are suspected; after a
//! further `t_remove` ticks they are dropped from the view.
//!
//! A node only ever raises its own heartbeat. Merging is "strictly
//! greater heartbeat wins" with the timestamp reset to the receiver's
//! clock, which makes merges idempotent and commutative. Suspected
//! peers are omitted from outgoing snapshots, so a removal is final:
//! once every peer suspects a dead node, no frame carrying its record
//! is in flight anymore, and the only way back in is a fresh JOINREQ.
//!
//! An unanswered join request is retried every `t_gossip` ticks until a
//! JOINREP lands; delivery is never assumed.

use crate::common::{Config, Event, EventLog, NodeAddr, Tick};
use crate::membership::wire::{MemberRecord, MembershipFrame};
use crate::node::Transport;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Local view of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipEntry {
    pub heartbeat: u64,
    /// Local tick at which this entry last advanced
    pub timestamp: Tick,
}

/// Per-node membership state and protocol driver
pub struct MembershipService {
    self_addr: NodeAddr,
    introducer: NodeAddr,
    t_gossip: u64,
    t_fail: u64,
    t_remove: u64,
    /// Own heartbeat counter, authoritative for `self_addr`
    heartbeat: u64,
    started: bool,
    joined: bool,
    last_join_attempt: Tick,
    entries: BTreeMap<NodeAddr, MembershipEntry>,
    /// Suspected peers and the tick suspicion started. Local only,
    /// never transmitted. Always a subset of `entries`.
    failed: BTreeMap<NodeAddr, Tick>,
    last_gossip: Tick,
}

impl MembershipService {
    pub fn new(self_addr: NodeAddr, cfg: &Config) -> Self {
        Self {
            self_addr,
            introducer: cfg.introducer,
            t_gossip: cfg.t_gossip,
            t_fail: cfg.t_fail,
            t_remove: cfg.t_remove,
            heartbeat: 0,
            started: false,
            joined: false,
            last_join_attempt: 0,
            entries: BTreeMap::new(),
            failed: BTreeMap::new(),
            last_gossip: 0,
        }
    }

    /// Join the cluster. The introducer seeds its own view and is
    /// immediately joined; everyone else asks the introducer.
    pub fn start(&mut self, now: Tick, net: &mut dyn Transport, log: &dyn EventLog) {
        self.started = true;
        if self.self_addr == self.introducer {
            self.entries.insert(
                self.self_addr,
                MembershipEntry {
                    heartbeat: self.heartbeat,
                    timestamp: now,
                },
            );
            self.joined = true;
            log.record(Event::NodeAdd {
                at: self.self_addr,
                added: self.self_addr,
            });
            tracing::info!(addr = %self.self_addr, "bootstrapped cluster");
        } else {
            self.send_join_request(now, net);
        }
    }

    fn send_join_request(&mut self, now: Tick, net: &mut dyn Transport) {
        self.last_join_attempt = now;
        let frame = MembershipFrame::JoinReq {
            from: self.self_addr,
            heartbeat: self.heartbeat,
        };
        net.send(self.self_addr, self.introducer, frame.encode());
        tracing::debug!(addr = %self.self_addr, introducer = %self.introducer, "sent join request");
    }

    pub fn handle_frame(
        &mut self,
        frame: MembershipFrame,
        now: Tick,
        net: &mut dyn Transport,
        log: &dyn EventLog,
    ) {
        match frame {
            MembershipFrame::JoinReq { from, heartbeat } => {
                self.merge_record(
                    MemberRecord {
                        addr: from,
                        heartbeat,
                        timestamp: now,
                    },
                    now,
                    log,
                );
                let reply = MembershipFrame::JoinRep {
                    records: self.snapshot(now),
                };
                net.send(self.self_addr, from, reply.encode());
            }
            MembershipFrame::JoinRep { records } => {
                // The introducer's view replaces ours wholesale. Incoming
                // timestamps are sender-local, so every entry restarts on
                // our clock.
                self.entries.clear();
                self.failed.clear();
                for rec in records {
                    let heartbeat = if rec.addr == self.self_addr {
                        self.heartbeat.max(rec.heartbeat)
                    } else {
                        rec.heartbeat
                    };
                    self.entries.insert(
                        rec.addr,
                        MembershipEntry {
                            heartbeat,
                            timestamp: now,
                        },
                    );
                    log.record(Event::NodeAdd {
                        at: self.self_addr,
                        added: rec.addr,
                    });
                }
                self.joined = true;
                tracing::info!(addr = %self.self_addr, peers = self.entries.len(), "joined cluster");
            }
            MembershipFrame::Update { records } => {
                for rec in records {
                    self.merge_record(rec, now, log);
                }
            }
        }
    }

    /// Periodic housekeeping. Unjoined but started nodes retry the join
    /// request; joined nodes gossip when due and sweep for failures
    /// every tick.
    pub fn tick<R: Rng>(
        &mut self,
        now: Tick,
        net: &mut dyn Transport,
        rng: &mut R,
        log: &dyn EventLog,
    ) {
        if !self.joined {
            if self.started && now.saturating_sub(self.last_join_attempt) >= self.t_gossip {
                self.send_join_request(now, net);
            }
            return;
        }
        if now.saturating_sub(self.last_gossip) >= self.t_gossip && !self.entries.is_empty() {
            self.gossip_round(now, net, rng);
        }
        self.failure_sweep(now, log);
    }

    fn gossip_round<R: Rng>(&mut self, now: Tick, net: &mut dyn Transport, rng: &mut R) {
        self.heartbeat += 1;
        self.last_gossip = now;
        if let Some(entry) = self.entries.get_mut(&self.self_addr) {
            entry.heartbeat = self.heartbeat;
            entry.timestamp = now;
        }

        // Self is never a gossip target.
        let peers: Vec<NodeAddr> = self
            .entries
            .keys()
            .copied()
            .filter(|a| *a != self.self_addr)
            .collect();
        if let Some(&target) = peers.choose(rng) {
            let frame = MembershipFrame::Update {
                records: self.snapshot(now),
            };
            net.send(self.self_addr, target, frame.encode());
            tracing::trace!(addr = %self.self_addr, %target, heartbeat = self.heartbeat, "gossip round");
        }
    }

    fn failure_sweep(&mut self, now: Tick, log: &dyn EventLog) {
        let peers: Vec<NodeAddr> = self
            .entries
            .keys()
            .copied()
            .filter(|a| *a != self.self_addr)
            .collect();
        for addr in peers {
            match self.failed.get(&addr) {
                Some(&detected) => {
                    if now.saturating_sub(detected) >= self.t_remove {
                        self.entries.remove(&addr);
                        self.failed.remove(&addr);
                        log.record(Event::NodeRemove {
                            at: self.self_addr,
                            removed: addr,
                        });
                        tracing::info!(at = %self.self_addr, removed = %addr, "removed failed peer");
                    }
                }
                None => {
                    let timestamp = self.entries[&addr].timestamp;
                    if now.saturating_sub(timestamp) >= self.t_fail {
                        self.failed.insert(addr, now);
                        tracing::debug!(at = %self.self_addr, suspect = %addr, "peer suspected failed");
                    }
                }
            }
        }
    }

    /// Merge one incoming record into the local view
    fn merge_record(&mut self, rec: MemberRecord, now: Tick, log: &dyn EventLog) {
        if rec.addr == self.self_addr {
            // Own heartbeat is authoritative; peers cannot advance it.
            self.entries.entry(self.self_addr).or_insert(MembershipEntry {
                heartbeat: self.heartbeat,
                timestamp: now,
            });
            return;
        }
        match self.entries.get_mut(&rec.addr) {
            None => {
                self.entries.insert(
                    rec.addr,
                    MembershipEntry {
                        heartbeat: rec.heartbeat,
                        timestamp: now,
                    },
                );
                log.record(Event::NodeAdd {
                    at: self.self_addr,
                    added: rec.addr,
                });
                tracing::debug!(at = %self.self_addr, added = %rec.addr, "membership add");
            }
            Some(entry) if rec.heartbeat > entry.heartbeat => {
                entry.heartbeat = rec.heartbeat;
                entry.timestamp = now;
                // A rising heartbeat rescues a suspect.
                self.failed.remove(&rec.addr);
            }
            Some(_) => {} // stale or duplicate, ignore
        }
    }

    /// Full view as wire records, suspects omitted. The self entry
    /// always carries the freshest heartbeat and the current tick.
    pub fn snapshot(&self, now: Tick) -> Vec<MemberRecord> {
        self.entries
            .iter()
            .filter(|(addr, _)| !self.failed.contains_key(*addr))
            .map(|(&addr, entry)| {
                if addr == self.self_addr {
                    MemberRecord {
                        addr,
                        heartbeat: self.heartbeat,
                        timestamp: now,
                    }
                } else {
                    MemberRecord {
                        addr,
                        heartbeat: entry.heartbeat,
                        timestamp: entry.timestamp,
                    }
                }
            })
            .collect()
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// All known members in address order, suspects included
    pub fn addrs(&self) -> Vec<NodeAddr> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: NodeAddr) -> bool {
        self.entries.contains_key(&addr)
    }

    pub fn entry(&self, addr: NodeAddr) -> Option<&MembershipEntry> {
        self.entries.get(&addr)
    }

    pub fn is_suspected(&self, addr: NodeAddr) -> bool {
        self.failed.contains_key(&addr)
    }

    pub fn heartbeat(&self) -> u64 {
        self.heartbeat
    }
}
