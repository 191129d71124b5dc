//! Error types for the M3UA traffic-maintenance core

use thiserror::Error;

use crate::fsm::FsmEvent;

/// Result type alias
pub type Result<T> = std::result::Result<T, M3uaError>;

/// Top-level M3UA error
#[derive(Debug, Error)]
pub enum M3uaError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("FSM error: {0}")]
    Fsm(#[from] FsmError),
}

/// State machine errors
#[derive(Debug, Error)]
pub enum FsmError {
    /// No transition registered for the current (state, event) pair.
    /// The peer and this node have diverged; the caller logs and moves on.
    #[error("FSM {fsm}: no transition from state {state} on event {event}")]
    UnknownTransition {
        fsm: String,
        state: &'static str,
        event: FsmEvent,
    },

    #[error("missing FSM attribute {key}")]
    MissingAttribute { key: &'static str },
}

/// Configuration and provisioning errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("application server {0} already exists")]
    DuplicateAppServer(String),

    #[error("ASP {0} already exists")]
    DuplicateAsp(String),

    #[error("no application server named {0}")]
    UnknownAppServer(String),

    #[error("routing context {0} is already bound to an ASP")]
    DuplicateRoutingContext(u32),

    #[error("null routing context is already bound to ASP {0}")]
    NullContextTaken(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
