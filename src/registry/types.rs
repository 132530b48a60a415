use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Stable identifier of a reporting node.
///
/// Supplied by the sender when it has a persistent identity; otherwise the
/// decoder derives a deterministic fallback from service and host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resting states of a tracked node.
///
/// Registration and retirement are one-time transitions, not resting states:
/// a node that retires is removed from the table in the same step the event
/// fires, so `Retired` is never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Active,
    Inactive,
}

/// A single decoded liveness message, consumed once by the registry.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub id: NodeId,
    pub service: String,
    pub host: String,
    /// Free-form scalar info payload (pid, version, tags).
    pub metadata: HashMap<String, serde_json::Value>,
    /// Monotonically increasing per sender process lifetime. A value lower
    /// than the last recorded one means the sender restarted with stale state.
    pub epoch: u64,
    /// Sender explicitly marks this heartbeat as the first of a new process
    /// instance.
    pub fresh: bool,
    /// Identifier of the listener that decoded this message.
    pub received_via: String,
}

/// One entry in the membership table.
///
/// Owned exclusively by the registry writer task; everything handed out of
/// the table is a clone. The monotonic instants drive timeout math and are
/// not serialized; `first_seen`/`last_seen` carry wall-clock milliseconds for
/// observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub service: String,
    pub host: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub state: NodeState,
    pub epoch: u64,
    /// Unix ms of the first accepted heartbeat.
    pub first_seen: u64,
    /// Unix ms of the most recent accepted heartbeat.
    pub last_seen: u64,

    #[serde(skip)]
    pub seen_at: Option<Instant>,
    /// Set while `Inactive`: once passed, the record is deleted by the sweep.
    #[serde(skip)]
    pub retire_at: Option<Instant>,
}

/// Lifecycle events published on the bus, in the order the registry
/// generated them.
///
/// `Info` carries the full current record so observers can render details
/// without a separate query; the transition events carry only the identity
/// fields notification consumers need.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Register {
        id: NodeId,
    },
    Active {
        id: NodeId,
        service: String,
        host: String,
    },
    Inactive {
        id: NodeId,
        service: String,
        host: String,
    },
    Reset {
        id: NodeId,
        service: String,
        host: String,
    },
    Retire {
        id: NodeId,
        service: String,
        host: String,
    },
    Info {
        node: NodeRecord,
    },
    Error {
        via: String,
        message: String,
    },
}

impl RegistryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::Register { .. } => "register",
            RegistryEvent::Active { .. } => "active",
            RegistryEvent::Inactive { .. } => "inactive",
            RegistryEvent::Reset { .. } => "reset",
            RegistryEvent::Retire { .. } => "retire",
            RegistryEvent::Info { .. } => "info",
            RegistryEvent::Error { .. } => "error",
        }
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            RegistryEvent::Register { id }
            | RegistryEvent::Active { id, .. }
            | RegistryEvent::Inactive { id, .. }
            | RegistryEvent::Reset { id, .. }
            | RegistryEvent::Retire { id, .. } => Some(id),
            RegistryEvent::Info { node } => Some(&node.id),
            RegistryEvent::Error { .. } => None,
        }
    }

    /// JSON payload as pushed to dashboard subscribers.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            RegistryEvent::Register { id } => serde_json::json!({ "id": id }),
            RegistryEvent::Active { id, service, host }
            | RegistryEvent::Inactive { id, service, host }
            | RegistryEvent::Reset { id, service, host }
            | RegistryEvent::Retire { id, service, host } => {
                serde_json::json!({ "id": id, "service": service, "host": host })
            }
            RegistryEvent::Info { node } => {
                serde_json::to_value(node).unwrap_or(serde_json::Value::Null)
            }
            RegistryEvent::Error { via, message } => {
                serde_json::json!({ "via": via, "message": message })
            }
        }
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
