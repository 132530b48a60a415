//! Transport Module
//!
//! Binds configured endpoint specs to live heartbeat receivers. Every
//! listener runs concurrently with the others and with the registry sweep;
//! none of them ever touch the membership table directly.
//!
//! ## Core Mechanisms
//! - **Scheme Dispatch**: a closed set of transport kinds (`udp`, `tcp`, `unix`)
//!   selected from the endpoint spec's scheme string.
//! - **Framing**: one heartbeat per datagram on `udp`; newline-delimited JSON on
//!   stream transports, where one connection may carry many heartbeats.
//! - **Failure Isolation**: bind failures are fatal to that one listener only;
//!   decode and read failures become `error` events and traffic continues.
//!
//! ## Submodules
//! - **`endpoint`**: endpoint spec parsing (`scheme://host:port/path?opt=value`).
//! - **`protocol`**: the JSON heartbeat decoder.
//! - **`listener`**: listener lifecycle (bind, receive loops, stop).

pub mod endpoint;
pub mod listener;
pub mod protocol;

#[cfg(test)]
mod tests;
