//! Heartbeat Wire Protocol
//!
//! One heartbeat is one JSON object: a whole datagram on connectionless
//! transports, one newline-terminated line on stream transports. Decoding is
//! a pure function from bytes to a [`Heartbeat`]; failures name the offending
//! field and never take the listener down.
//!
//! Required: `service`, `host`. Optional with defaults: `id` (falls back to
//! `service@host`), `epoch` (0), `metadata` (empty, scalar values only),
//! `fresh` (false). Unknown fields are ignored.

use crate::error::Error;
use crate::registry::types::{Heartbeat, NodeId};

use serde::Deserialize;
use std::collections::HashMap;

/// Upper bound on a single heartbeat payload; matches the datagram receive
/// buffer used by the udp listener.
pub const MAX_PAYLOAD_BYTES: usize = 65_536;

#[derive(Debug, Deserialize)]
struct HeartbeatWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    epoch: u64,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    fresh: bool,
}

/// Decodes a raw transport payload into a heartbeat.
pub fn decode(raw: &[u8], received_via: &str) -> Result<Heartbeat, Error> {
    if raw.len() > MAX_PAYLOAD_BYTES {
        return Err(Error::validation(format!(
            "payload of {} bytes exceeds the {} byte limit",
            raw.len(),
            MAX_PAYLOAD_BYTES
        )));
    }

    let wire: HeartbeatWire = serde_json::from_slice(raw)
        .map_err(|e| Error::validation(format!("payload is not a heartbeat object: {}", e)))?;

    let service = required_field(wire.service, "service")?;
    let host = required_field(wire.host, "host")?;

    for (key, value) in &wire.metadata {
        if value.is_object() || value.is_array() {
            return Err(Error::validation(format!(
                "metadata field `{}` must be a scalar",
                key
            )));
        }
    }

    // Deterministic fallback identity for senders without a persistent id.
    let id = match wire.id {
        Some(id) if !id.is_empty() => id,
        _ => format!("{}@{}", service, host),
    };

    Ok(Heartbeat {
        id: NodeId(id),
        service,
        host,
        metadata: wire.metadata,
        epoch: wire.epoch,
        fresh: wire.fresh,
        received_via: received_via.to_string(),
    })
}

fn required_field(value: Option<String>, name: &str) -> Result<String, Error> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        Some(_) => Err(Error::validation(format!("field `{}` is empty", name))),
        None => Err(Error::validation(format!("field `{}` is missing", name))),
    }
}
