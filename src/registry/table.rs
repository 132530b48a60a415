//! The membership table and its lifecycle state machine.
//!
//! `NodeTable` is deliberately synchronous and single-threaded: the owning
//! writer task (see `service.rs`) is the only code that ever touches it, so
//! heartbeat application and sweep ticks can never interleave on a record.
//! Every operation takes `now` explicitly, which keeps timeout behavior fully
//! testable without waiting out real TTLs.

use super::types::{now_ms, Heartbeat, NodeId, NodeRecord, NodeState, RegistryEvent};

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct NodeTable {
    nodes: HashMap<NodeId, NodeRecord>,
    /// Insertion-order index, so snapshots list nodes in first-seen order.
    order: Vec<NodeId>,
    active_ttl: Duration,
    retire_ttl: Duration,
}

impl NodeTable {
    pub fn new(active_ttl: Duration, retire_ttl: Duration) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            active_ttl,
            retire_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Applies one accepted heartbeat and returns the events it produced, in
    /// emission order.
    ///
    /// Transition rules:
    /// - unseen id: record created `Active`, emits `register` then `info`
    /// - known id: `last_seen`, `metadata`, `host`, `service` and `epoch` are
    ///   refreshed unconditionally; a restart (incoming epoch lower than the
    ///   stored one, or an explicit fresh marker) emits `reset` first; a node
    ///   that was `Inactive` additionally emits `active`; every accepted
    ///   heartbeat ends with `info` carrying the full updated record.
    pub fn apply(&mut self, heartbeat: Heartbeat, now: Instant) -> Vec<RegistryEvent> {
        let mut events = Vec::new();

        match self.nodes.get_mut(&heartbeat.id) {
            None => {
                let record = NodeRecord {
                    id: heartbeat.id.clone(),
                    service: heartbeat.service,
                    host: heartbeat.host,
                    metadata: heartbeat.metadata,
                    state: NodeState::Active,
                    epoch: heartbeat.epoch,
                    first_seen: now_ms(),
                    last_seen: now_ms(),
                    seen_at: Some(now),
                    retire_at: None,
                };

                self.order.push(record.id.clone());

                events.push(RegistryEvent::Register {
                    id: record.id.clone(),
                });
                events.push(RegistryEvent::Info {
                    node: record.clone(),
                });

                self.nodes.insert(record.id.clone(), record);
            }
            Some(record) => {
                // Restart detection must be evaluated against the stored
                // epoch before it is overwritten below.
                let restarted = heartbeat.fresh || heartbeat.epoch < record.epoch;
                let was_inactive = record.state == NodeState::Inactive;

                record.service = heartbeat.service;
                record.host = heartbeat.host;
                record.metadata = heartbeat.metadata;
                record.epoch = heartbeat.epoch;
                // last_seen never decreases, even if the wall clock steps back.
                record.last_seen = record.last_seen.max(now_ms());
                record.seen_at = Some(now);
                record.retire_at = None;
                record.state = NodeState::Active;

                if restarted {
                    events.push(RegistryEvent::Reset {
                        id: record.id.clone(),
                        service: record.service.clone(),
                        host: record.host.clone(),
                    });
                }

                if was_inactive {
                    events.push(RegistryEvent::Active {
                        id: record.id.clone(),
                        service: record.service.clone(),
                        host: record.host.clone(),
                    });
                }

                events.push(RegistryEvent::Info {
                    node: record.clone(),
                });
            }
        }

        events
    }

    /// One sweep tick: applies the timeout transitions to every record whose
    /// deadline has passed.
    ///
    /// `Active` records silent for at least `active_ttl` become `Inactive`
    /// (one `inactive` event, exactly once); `Inactive` records past their
    /// retire deadline are deleted (one `retire` event). A record demoted in
    /// this tick is never retired in the same tick.
    pub fn sweep(&mut self, now: Instant) -> Vec<RegistryEvent> {
        let mut events = Vec::new();
        let mut retired: Vec<NodeId> = Vec::new();

        for id in &self.order {
            let Some(record) = self.nodes.get_mut(id) else {
                continue;
            };

            match record.state {
                NodeState::Active => {
                    let seen = *record.seen_at.get_or_insert(now);
                    let elapsed = now.saturating_duration_since(seen);

                    if elapsed >= self.active_ttl {
                        tracing::warn!(
                            "Node {} silent for {:?}, marking inactive",
                            record.id,
                            elapsed
                        );

                        record.state = NodeState::Inactive;
                        record.retire_at = Some(seen + self.active_ttl + self.retire_ttl);

                        events.push(RegistryEvent::Inactive {
                            id: record.id.clone(),
                            service: record.service.clone(),
                            host: record.host.clone(),
                        });
                    }
                }
                NodeState::Inactive => {
                    if let Some(deadline) = record.retire_at {
                        if now >= deadline {
                            retired.push(record.id.clone());
                        }
                    }
                }
            }
        }

        for id in retired {
            if let Some(record) = self.nodes.remove(&id) {
                self.order.retain(|known| known != &id);

                tracing::info!("Node {} retired, {} nodes remain", id, self.nodes.len());

                events.push(RegistryEvent::Retire {
                    id: record.id,
                    service: record.service,
                    host: record.host,
                });
            }
        }

        events
    }

    /// Point-in-time copy of every record, in first-seen order. No live
    /// references into the table escape.
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect()
    }
}
