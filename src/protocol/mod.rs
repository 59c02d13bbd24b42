//! Protocol Module
//!
//! The single-shot line protocol: one request line in, one response line out.
//!
//! # Grammars
//! - Command mode: `put,<key>,<value>` | `get,<key>`
//! - Single-value mode: `<key>` with an optional second info-type line

mod command;

use std::fmt;
use std::str::FromStr;

use crate::error::ServerError;

pub use command::{Command, ProtocolError, SingleValueRequest};

// == Sentinel Responses ==
/// Answer for an unknown command or a wrong token count.
pub const SYNTAX_ERROR: &str = "Syntax Error";

/// Answer when neither the cache nor the external source has a value.
pub const ERROR: &str = "Error";

/// Acknowledgement for a `put` when the external source could not answer.
pub fn stored_ack(key: &str) -> String {
    format!("Stored {key}")
}

/// Request grammar a server instance speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    /// `put` / `get` commands against the key/value cache
    Command,
    /// Whole line is a lookup key answered with a formatted summary
    SingleValue,
}

impl FromStr for ProtocolMode {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command" | "kv" => Ok(Self::Command),
            "single" | "single-value" | "weather" => Ok(Self::SingleValue),
            other => Err(ServerError::Config(format!("unknown protocol mode {other:?}"))),
        }
    }
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => f.write_str("command"),
            Self::SingleValue => f.write_str("single"),
        }
    }
}
