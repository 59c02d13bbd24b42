//! Client Module
//!
//! One-shot helper for talking to a relay server: connect, send one
//! request line, read the answer, close.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {0}")]
    Timeout(String),

    #[error("server closed the connection without answering")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// How much of the server's answer to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// One line, terminator stripped (command mode)
    #[default]
    Line,
    /// Every line until the server closes, joined and trimmed (single-value mode)
    ToEnd,
}

/// Sends `request` to `host:port` and returns the response text.
///
/// No retries; the first failure is returned.
pub async fn send(
    host: &str,
    port: u16,
    request: &str,
    mode: ReadMode,
) -> Result<String, ClientError> {
    let addr = format!("{host}:{port}");
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: addr.clone(),
            source,
        })?;
    exchange(stream, request, mode).await
}

/// Same as [`send`], giving up on the connect after `timeout`.
pub async fn send_with_timeout(
    host: &str,
    port: u16,
    request: &str,
    mode: ReadMode,
    timeout: Duration,
) -> Result<String, ClientError> {
    let addr = format!("{host}:{port}");
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(ClientError::Connect { addr, source }),
        Err(_) => return Err(ClientError::Timeout(addr)),
    };
    exchange(stream, request, mode).await
}

async fn exchange(
    mut stream: TcpStream,
    request: &str,
    mode: ReadMode,
) -> Result<String, ClientError> {
    let line = format!("{}\n", request.trim_end_matches(['\r', '\n']));
    stream.write_all(line.as_bytes()).await?;
    stream.flush().await?;
    debug!(request, "Request sent");

    let mut reader = BufReader::new(stream);
    match mode {
        ReadMode::Line => {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Err(ClientError::Empty);
            }
            Ok(line.trim_end_matches(['\r', '\n']).to_string())
        }
        ReadMode::ToEnd => {
            let mut body = String::new();
            if reader.read_to_string(&mut body).await? == 0 {
                return Err(ClientError::Empty);
            }
            Ok(body.lines().collect::<Vec<_>>().join("\n").trim().to_string())
        }
    }
}
