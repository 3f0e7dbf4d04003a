//! services/api/src/error.rs
//!
//! The service-level error type. Generation failures never surface here: they are
//! reported to the client over the socket as `generation_failed` messages.

use crate::config::ConfigError;
use textbook_forge_core::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An AI gateway or snapshot store failure outside a generation run.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The client went away or the socket broke mid-send.
    #[error("WebSocket Error: {0}")]
    Websocket(#[from] axum::Error),

    #[error("Failed to encode a server message: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Binding the listener or creating the snapshot directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
