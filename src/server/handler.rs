//! Connection Handler
//!
//! Serves exactly one request on one accepted connection, then closes it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::cache::SharedCache;
use crate::protocol::{self, Command, ProtocolMode, SingleValueRequest};
use crate::source::ExternalSource;

/// Longest request line accepted, terminator excluded. Longer requests are
/// dropped without an answer.
pub const MAX_REQUEST_LINE: usize = 8 * 1024;

/// Everything a handler needs; cloned into each spawned connection task.
#[derive(Clone)]
pub struct ConnectionContext {
    pub mode: ProtocolMode,
    pub cache: SharedCache,
    pub source: Arc<dyn ExternalSource>,
    /// Key sent to the source in command mode, for `put` and `get` misses alike
    pub lookup_key: String,
}

/// Runs one exchange on `stream`: read a request line, answer it, close.
///
/// Errors are logged and swallowed so that nothing escapes into the
/// accept loop. The stream is dropped (closed) on every path.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: ConnectionContext)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = serve_one(stream, peer, &ctx).await {
        warn!(%peer, error = %e, "Connection failed");
    }
}

async fn serve_one<S>(stream: S, peer: SocketAddr, ctx: &ConnectionContext) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);

    let mut request = String::new();
    let limit = MAX_REQUEST_LINE as u64 + 1;
    if (&mut reader).take(limit).read_line(&mut request).await? == 0 {
        debug!(%peer, "Peer closed before sending a request");
        return Ok(());
    }
    if request.len() > MAX_REQUEST_LINE && !request.ends_with('\n') {
        warn!(%peer, limit = MAX_REQUEST_LINE, "Request line too long, dropping connection");
        return Ok(());
    }

    // The info-type line is only taken if it arrived complete alongside the
    // request; waiting for it would stall clients that send a single line.
    let info_line = match ctx.mode {
        ProtocolMode::SingleValue => take_buffered_line(&mut reader),
        ProtocolMode::Command => None,
    };

    let response = respond(ctx, &request, info_line.as_deref()).await;
    debug!(%peer, request = request.trim_end(), %response, "Answering");

    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}

/// Removes and returns one newline-terminated line from what `reader`
/// already holds in memory. Never touches the underlying stream.
fn take_buffered_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Option<String> {
    let buffered = reader.buffer();
    let end = buffered.iter().position(|&b| b == b'\n')?;
    let line = String::from_utf8_lossy(&buffered[..end]).into_owned();
    reader.consume(end + 1);
    Some(line)
}

/// Computes the single response line for a request, without any socket I/O.
pub async fn respond(ctx: &ConnectionContext, request: &str, info_line: Option<&str>) -> String {
    match ctx.mode {
        ProtocolMode::Command => match Command::parse(request) {
            Ok(command) => {
                debug!(key = command.key(), ?command, "Command");
                match command {
                    Command::Put { key, value } => handle_put(ctx, key, value).await,
                    Command::Get { key } => handle_get(ctx, &key, &ctx.lookup_key).await,
                }
            }
            Err(e) => {
                debug!(error = %e, "Rejecting request");
                e.sentinel().to_string()
            }
        },
        ProtocolMode::SingleValue => {
            let req = SingleValueRequest::parse(request, info_line);
            debug!(key = %req.key, info_type = ?req.info_type, "Single-value lookup");
            handle_get(ctx, &req.key, &req.key).await
        }
    }
}

/// Stores the client's value verbatim, then answers with whatever the
/// source says for the fixed lookup key. The answer is not the stored value.
async fn handle_put(ctx: &ConnectionContext, key: String, value: String) -> String {
    ctx.cache.write().await.put(key.clone(), value);

    match ctx.source.resolve(&ctx.lookup_key).await {
        Ok(resolved) => resolved,
        Err(e) => {
            debug!(%key, error = %e, "Source unavailable for put acknowledgement");
            protocol::stored_ack(&key)
        }
    }
}

/// Cache read, falling back to the source on miss and caching its answer.
/// Only a failed fallback leaves the cache untouched.
async fn handle_get(ctx: &ConnectionContext, key: &str, source_key: &str) -> String {
    if let Some(value) = ctx.cache.write().await.get(key) {
        return value;
    }

    match ctx.source.resolve(source_key).await {
        Ok(resolved) => {
            ctx.cache.write().await.put(key, resolved.clone());
            resolved
        }
        Err(e) => {
            warn!(%key, error = %e, "External lookup failed");
            protocol::ERROR.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::source::SourceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{duplex, AsyncReadExt};

    /// Answers with a fixed value, or fails, counting every call.
    struct ScriptedSource {
        answer: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn ok(value: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Some(value.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExternalSource for ScriptedSource {
        async fn resolve(&self, _key: &str) -> Result<String, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().ok_or(SourceError::Status(503))
        }
    }

    fn context(mode: ProtocolMode, source: Arc<ScriptedSource>) -> ConnectionContext {
        ConnectionContext {
            mode,
            cache: CacheStore::shared(Some(10)),
            source,
            lookup_key: "Etc/UTC".to_string(),
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_command_is_syntax_error() {
        let ctx = context(ProtocolMode::Command, ScriptedSource::ok("1"));
        assert_eq!(respond(&ctx, "frobnicate,x\n", None).await, "Syntax Error");
        assert_eq!(respond(&ctx, "get\n", None).await, "Syntax Error");
        assert_eq!(respond(&ctx, "put,a\n", None).await, "Syntax Error");
    }

    #[tokio::test]
    async fn test_put_stores_value_but_answers_with_source_value() {
        let source = ScriptedSource::ok("1700000000");
        let ctx = context(ProtocolMode::Command, source.clone());

        assert_eq!(respond(&ctx, "put,name,alice\n", None).await, "1700000000");
        assert_eq!(respond(&ctx, "get,name\n", None).await, "alice");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_put_with_failing_source_acknowledges() {
        let ctx = context(ProtocolMode::Command, ScriptedSource::failing());

        assert_eq!(respond(&ctx, "PUT, name , alice\n", None).await, "Stored name");
        assert_eq!(respond(&ctx, "get,name\n", None).await, "alice");
    }

    #[tokio::test]
    async fn test_get_miss_with_failing_source() {
        let ctx = context(ProtocolMode::Command, ScriptedSource::failing());

        assert_eq!(respond(&ctx, "get,missingKey\n", None).await, "Error");
        assert!(!ctx.cache.read().await.contains_key("missingKey"));
    }

    #[tokio::test]
    async fn test_get_miss_populates_cache() {
        let source = ScriptedSource::ok("42");
        let ctx = context(ProtocolMode::Command, source.clone());

        assert_eq!(respond(&ctx, "get,missingKey\n", None).await, "42");
        assert_eq!(respond(&ctx, "get,missingKey\n", None).await, "42");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_value_mode_uses_whole_line_as_key() {
        let source = ScriptedSource::ok("Wind speed: 1, Condition: Clear");
        let ctx = context(ProtocolMode::SingleValue, source.clone());

        let first = respond(&ctx, "put,a,b\n", Some("all\n")).await;
        assert_eq!(first, "Wind speed: 1, Condition: Clear");
        assert!(ctx.cache.read().await.contains_key("put,a,b"));

        respond(&ctx, "put,a,b\n", None).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_value_mode_failure_is_error() {
        let ctx = context(ProtocolMode::SingleValue, ScriptedSource::failing());
        assert_eq!(respond(&ctx, "Atlantis\n", None).await, "Error");
    }

    #[tokio::test]
    async fn test_handle_connection_writes_one_line() {
        let ctx = context(ProtocolMode::Command, ScriptedSource::failing());
        let (mut client, server) = duplex(1024);

        let task = tokio::spawn(handle_connection(server, peer(), ctx));
        client.write_all(b"put,k,v\n").await.unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        task.await.unwrap();

        assert_eq!(response, "Stored k\n");
    }

    #[tokio::test]
    async fn test_handle_connection_silent_on_empty_stream() {
        let source = ScriptedSource::ok("1");
        let ctx = context(ProtocolMode::Command, source.clone());
        let (mut client, server) = duplex(1024);

        let task = tokio::spawn(handle_connection(server, peer(), ctx));
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        task.await.unwrap();

        assert!(response.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_handle_connection_drops_oversized_request() {
        let source = ScriptedSource::ok("1");
        let ctx = context(ProtocolMode::Command, source.clone());
        let (mut client, server) = duplex(64 * 1024);

        // No newline and the write side stays open.
        let oversized = format!("get,{}", "a".repeat(MAX_REQUEST_LINE + 100));
        client.write_all(oversized.as_bytes()).await.unwrap();
        let task = tokio::spawn(handle_connection(server, peer(), ctx));

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        task.await.unwrap();

        assert!(response.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_handle_connection_accepts_request_at_limit() {
        let ctx = context(ProtocolMode::Command, ScriptedSource::failing());
        let (mut client, server) = duplex(64 * 1024);

        let key = "k".repeat(MAX_REQUEST_LINE - "put,,v".len());
        client.write_all(format!("put,{key},v\n").as_bytes()).await.unwrap();
        let task = tokio::spawn(handle_connection(server, peer(), ctx));

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        task.await.unwrap();

        assert_eq!(response, format!("Stored {key}\n"));
    }

    #[tokio::test]
    async fn test_handle_connection_ignores_partial_info_line() {
        let source = ScriptedSource::ok("summary");
        let ctx = context(ProtocolMode::SingleValue, source.clone());
        let (mut client, server) = duplex(1024);

        // The info line has no terminator and the client never closes.
        client.write_all(b"Paris\nall").await.unwrap();
        let task = tokio::spawn(handle_connection(server, peer(), ctx));

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        task.await.unwrap();

        assert_eq!(response, "summary\n");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_take_buffered_line_only_complete_lines() {
        let (mut client, server) = duplex(1024);
        client.write_all(b"first\nsecond\nthi").await.unwrap();

        let mut reader = BufReader::new(server);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        assert_eq!(line, "first\n");
        assert_eq!(take_buffered_line(&mut reader).as_deref(), Some("second"));
        assert_eq!(take_buffered_line(&mut reader), None);
        assert_eq!(reader.buffer(), b"thi");
    }

    #[tokio::test]
    async fn test_handle_connection_reads_buffered_info_line() {
        let source = ScriptedSource::ok("summary");
        let ctx = context(ProtocolMode::SingleValue, source.clone());
        let cache = ctx.cache.clone();
        let (mut client, server) = duplex(1024);

        client.write_all(b"Paris\nall\n").await.unwrap();
        let task = tokio::spawn(handle_connection(server, peer(), ctx));

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        task.await.unwrap();

        assert_eq!(response, "summary\n");
        assert!(cache.read().await.contains_key("Paris"));
        assert!(!cache.read().await.contains_key("all"));
    }
}
