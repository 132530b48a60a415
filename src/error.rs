//! Failure taxonomy for the registry and its transports.
//!
//! Three categories with different blast radii:
//! - [`Error::Configuration`] is fatal to starting one listener and nothing else.
//! - [`Error::Validation`] drops one heartbeat and is surfaced only as an `error` event.
//! - [`Error::Transport`] is a transient I/O fault on a live listener; traffic continues
//!   where the transport semantics allow it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint spec is invalid or the endpoint cannot be bound.
    #[error("invalid endpoint `{spec}`: {reason}")]
    Configuration { spec: String, reason: String },

    /// A heartbeat payload is malformed. Names the offending field.
    #[error("invalid heartbeat: {0}")]
    Validation(String),

    /// I/O failure on an already-running listener.
    #[error("transport failure on {via}: {source}")]
    Transport {
        via: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn configuration(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn transport(via: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            via: via.into(),
            source,
        }
    }
}
