//! Relay Cache - a single-shot TCP lookup server
//!
//! Answers one request line per connection from a TTL cache, falling back
//! to an external HTTP/JSON source on a miss.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod source;

pub use client::{send, ReadMode};
pub use config::Config;
pub use error::{Result, ServerError};
pub use protocol::ProtocolMode;
pub use server::{Server, ServerHandle};
pub use source::ExternalSource;
