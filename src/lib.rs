//! Node Liveness Registry Library
//!
//! This library crate defines the core modules that track the liveness of a
//! fleet of independent worker processes ("nodes") announcing themselves over
//! one or more network transports. It serves as the foundation for the binary
//! executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems:
//!
//! - **`registry`**: The authoritative membership table. Applies the node
//!   lifecycle state machine under a single-writer discipline, sweeps for
//!   silence on a timer, and answers point-in-time snapshot queries.
//! - **`transport`**: Listener lifecycle and the heartbeat wire protocol.
//!   Binds `udp`/`tcp`/`unix` endpoint specs and decodes inbound payloads
//!   into heartbeats.
//! - **`events`**: The in-process event bus. Fans registry lifecycle events
//!   out to any number of subscribers without affecting ingestion latency.
//! - **`config`**: Immutable runtime settings (endpoints, TTLs, dashboard,
//!   hooks), built once at startup.
//! - **`web`**: The dashboard push channel (HTTP + WebSocket), a read-only
//!   consumer of the registry.
//! - **`notify`**: The outbound webhook forwarder, mapping lifecycle events
//!   to human-readable notifications.
//! - **`error`**: The crate failure taxonomy.

pub mod config;
pub mod error;
pub mod events;
pub mod notify;
pub mod registry;
pub mod transport;
pub mod web;
