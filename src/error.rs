//! Error types for the relay server
//!
//! Provides unified error handling using thiserror.

use std::io;

use thiserror::Error;

// == Server Error Enum ==
/// Errors that reach the caller of the server or the binaries.
///
/// Per-connection failures never surface here; they are logged and
/// confined to their own handler.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Port string is not a usable TCP port
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// Configuration value could not be interpreted
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Socket level failure outside of a single connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the relay server.
pub type Result<T> = std::result::Result<T, ServerError>;
