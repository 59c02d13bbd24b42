//! Request line parsing for both protocol grammars.

use thiserror::Error;

use super::SYNTAX_ERROR;

/// A parsed command-mode request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: String, value: String },
    Get { key: String },
}

/// Reasons a command line is rejected. Every variant goes over the wire
/// as the same `Syntax Error` sentinel; the detail is only for logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("{command} takes {expected} tokens, got {got}")]
    Arity {
        command: &'static str,
        expected: usize,
        got: usize,
    },
}

impl ProtocolError {
    /// Wire form of the error.
    pub fn sentinel(&self) -> &'static str {
        SYNTAX_ERROR
    }
}

impl Command {
    /// Parses `put,<key>,<value>` or `get,<key>`.
    ///
    /// Tokens are split on commas and trimmed; the command name is
    /// case-insensitive. A value cannot itself contain a comma.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let name = parts[0].to_ascii_lowercase();

        match name.as_str() {
            "put" => match parts.as_slice() {
                [_, key, value] => Ok(Self::Put {
                    key: (*key).to_string(),
                    value: (*value).to_string(),
                }),
                _ => Err(ProtocolError::Arity {
                    command: "put",
                    expected: 3,
                    got: parts.len(),
                }),
            },
            "get" => match parts.as_slice() {
                [_, key] => Ok(Self::Get {
                    key: (*key).to_string(),
                }),
                _ => Err(ProtocolError::Arity {
                    command: "get",
                    expected: 2,
                    got: parts.len(),
                }),
            },
            _ => Err(ProtocolError::UnknownCommand(parts[0].to_string())),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Get { key } => key,
        }
    }
}

/// A single-value-mode request: the lookup key and the optional
/// information-type line that may follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleValueRequest {
    pub key: String,
    pub info_type: Option<String>,
}

impl SingleValueRequest {
    /// The whole first line, trimmed, is the key. No comma splitting.
    pub fn parse(line: &str, info_line: Option<&str>) -> Self {
        Self {
            key: line.trim().to_string(),
            info_type: info_line
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}
