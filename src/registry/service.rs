use super::table::NodeTable;
use super::types::{Heartbeat, NodeRecord, RegistryEvent};
use crate::config::settings::Settings;
use crate::error::Error;
use crate::events::bus::{EventBus, Subscription, SubscriptionId};
use crate::transport::endpoint::Endpoint;
use crate::transport::listener::Listener;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Commands accepted by the single writer task that owns the table.
pub(crate) enum Command {
    Heartbeat(Heartbeat),
    Snapshot(oneshot::Sender<Vec<NodeRecord>>),
    Shutdown,
}

/// Cloneable ingestion handle given to every transport listener.
///
/// Listeners never touch the table; they enqueue here and the writer task
/// applies messages one at a time. Sending is non-blocking (unbounded
/// channel), so a listener only ever waits on its own socket.
#[derive(Clone)]
pub struct HeartbeatSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl HeartbeatSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    pub fn submit(&self, heartbeat: Heartbeat) {
        if self.tx.send(Command::Heartbeat(heartbeat)).is_err() {
            tracing::warn!("Registry is shut down, dropping heartbeat");
        }
    }
}

/// The authoritative liveness registry.
///
/// Owns the membership table through a dedicated writer task, accepts
/// heartbeats from any number of transport listeners, runs the periodic
/// silence sweep, and publishes every lifecycle event to the bus in the
/// order it was generated.
pub struct Registry {
    settings: Arc<Settings>,
    bus: Arc<EventBus>,
    tx: mpsc::UnboundedSender<Command>,
    listeners: DashMap<String, Listener>,
}

impl Registry {
    /// Spawns the writer task (command channel + sweep timer, serialized in
    /// one loop) and returns the shared handle.
    pub fn start(settings: Arc<Settings>, bus: Arc<EventBus>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let table = NodeTable::new(settings.active_ttl(), settings.retire_ttl());
        let sweep_every = settings.sweep_interval();

        {
            let bus = bus.clone();
            tokio::spawn(async move {
                writer_loop(table, rx, bus, sweep_every).await;
            });
        }

        tracing::info!(
            "Registry started (active_ttl={:?}, retire_ttl={:?}, sweep={:?})",
            settings.active_ttl(),
            settings.retire_ttl(),
            sweep_every
        );

        Arc::new(Self {
            settings,
            bus,
            tx,
            listeners: DashMap::new(),
        })
    }

    /// Parses an endpoint spec, binds it, and starts delivering decoded
    /// heartbeats into this registry.
    ///
    /// Fails with [`Error::Configuration`] if the scheme is unsupported or
    /// the endpoint cannot be bound; an already-running listener is never
    /// affected by another one failing.
    pub async fn listen(&self, spec: &str) -> Result<(), Error> {
        let endpoint = Endpoint::parse(spec)?;

        let sender = HeartbeatSender::new(self.tx.clone());
        let listener = Listener::bind(endpoint, sender, self.bus.clone()).await?;

        self.listeners.insert(spec.to_string(), listener);

        Ok(())
    }

    /// Actual bound address of a running listener, for udp/tcp specs. Useful
    /// when the spec named port 0 and the kernel picked one.
    pub fn listener_addr(&self, spec: &str) -> Option<std::net::SocketAddr> {
        self.listeners.get(spec).and_then(|l| l.local_addr())
    }

    /// Point-in-time snapshot of all current records, in first-seen order.
    ///
    /// The query travels through the writer task, so the result never shows
    /// a half-applied transition. Returns empty after shutdown.
    pub async fn nodes(&self) -> Vec<NodeRecord> {
        let (reply, response) = oneshot::channel();

        if self.tx.send(Command::Snapshot(reply)).is_err() {
            return Vec::new();
        }

        response.await.unwrap_or_default()
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.bus.unsubscribe(id);
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stops every listener (sockets closed, unix paths unlinked before this
    /// returns), then stops the writer. Heartbeats already accepted are still
    /// applied; later submissions are rejected.
    pub async fn shutdown(&self) {
        let specs: Vec<String> = self
            .listeners
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for spec in specs {
            if let Some((_, listener)) = self.listeners.remove(&spec) {
                listener.stop().await;
            }
        }

        let _ = self.tx.send(Command::Shutdown);
    }
}

/// The single writer: applies heartbeats and sweep ticks one at a time, so
/// no two transitions for the same id are ever computed concurrently and a
/// `register` always reaches the bus before any later event for that id.
async fn writer_loop(
    mut table: NodeTable,
    mut rx: mpsc::UnboundedReceiver<Command>,
    bus: Arc<EventBus>,
    sweep_every: std::time::Duration,
) {
    let mut sweep = tokio::time::interval(sweep_every);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Heartbeat(heartbeat)) => {
                    tracing::debug!(
                        "Heartbeat from {} via {}",
                        heartbeat.id,
                        heartbeat.received_via
                    );
                    publish_all(&bus, table.apply(heartbeat, Instant::now()));
                }
                Some(Command::Snapshot(reply)) => {
                    let _ = reply.send(table.snapshot());
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = sweep.tick() => {
                publish_all(&bus, table.sweep(Instant::now()));
            }
        }
    }

    tracing::info!("Registry writer stopped ({} nodes in table)", table.len());
}

fn publish_all(bus: &EventBus, events: Vec<RegistryEvent>) {
    for event in events {
        bus.publish(&event);
    }
}
