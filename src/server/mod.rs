//! Server Module
//!
//! Owns the listening socket, the accept loop and the cache. Every accepted
//! connection runs on its own task; the loop never waits on a request.

pub mod handler;

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, CacheStore, SharedCache};
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::source::ExternalSource;

pub use handler::{handle_connection, respond, ConnectionContext};

const LISTEN_BACKLOG: u32 = 1024;

/// Pause after an accept error that is not tied to one connection
/// (e.g. out of file descriptors), so the loop does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// == Server ==
/// A configured but not yet listening server.
pub struct Server {
    addr: SocketAddr,
    ctx: ConnectionContext,
}

impl Server {
    /// Builds a server listening on all interfaces at `config.server_port`.
    pub fn new(config: &Config, source: Arc<dyn ExternalSource>) -> Self {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
        Self::with_addr(addr, config, source)
    }

    /// Builds a server for an explicit address (port 0 picks a free port).
    pub fn with_addr(addr: SocketAddr, config: &Config, source: Arc<dyn ExternalSource>) -> Self {
        Self {
            addr,
            ctx: ConnectionContext {
                mode: config.mode,
                cache: CacheStore::shared(config.cache_ttl),
                source,
                lookup_key: config.lookup_key.clone(),
            },
        }
    }

    // == Start ==
    /// Binds the listener and starts accepting in the background.
    ///
    /// Returns once the socket is listening; a bind failure is returned
    /// here rather than logged away.
    pub async fn start(self) -> Result<ServerHandle> {
        let listener = bind_listener(self.addr)?;
        let local_addr = listener.local_addr()?;
        let ttl = self.ctx.cache.read().await.ttl();
        info!(addr = %local_addr, mode = %self.ctx.mode, ?ttl, "Server listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cache = self.ctx.cache.clone();
        let accept_task = tokio::spawn(accept_loop(listener, self.ctx, shutdown_rx));

        Ok(ServerHandle {
            local_addr,
            running: AtomicBool::new(true),
            shutdown_tx,
            accept_task: Mutex::new(Some(accept_task)),
            cache,
        })
    }
}

/// Binds with `SO_REUSEADDR` so a restarted server can reclaim its port
/// while old connections sit in TIME_WAIT.
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let bind_error = |source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_error)?;
    socket.set_reuseaddr(true).map_err(bind_error)?;
    socket.bind(addr).map_err(bind_error)?;

    match socket.listen(LISTEN_BACKLOG) {
        Ok(listener) => Ok(listener),
        Err(e) => {
            error!(%addr, error = ?e, "Failed to listen");
            Err(bind_error(e))
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: ConnectionContext,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Accepted connection");
                    tokio::spawn(handle_connection(stream, peer, ctx.clone()));
                }
                Err(e) if is_connection_error(&e) => {
                    debug!(error = ?e, "Connection dropped before accept");
                }
                Err(e) => {
                    error!(error = ?e, "Failed to accept connection, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            },
        }
    }

    info!("Accept loop stopped");
    // Dropping `listener` here closes the socket.
}

/// Accept errors caused by a single peer going away. Anything else
/// (descriptor limits, memory) is a condition of the whole process.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

// == Server Handle ==
/// Control surface for a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    cache: SharedCache,
}

impl ServerHandle {
    /// Address actually bound, useful when started on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // == Stop ==
    /// Stops accepting and closes the listener. Handlers already running
    /// finish on their own. Calling this more than once is a no-op.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if self.shutdown_tx.send(true).is_err() {
            warn!("Accept loop already gone");
        }
        if let Some(task) = self.accept_task.lock().await.take() {
            if let Err(e) = task.await {
                error!(error = ?e, "Accept loop ended abnormally");
            }
        }

        info!(addr = %self.local_addr, stats = %self.stats().await, "Server stopped");
    }

    /// Snapshot of the cache counters.
    pub async fn stats(&self) -> CacheStats {
        self.cache.read().await.stats()
    }

    /// The cache this server reads and writes. It lives only as long as
    /// the server and its handlers hold it.
    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }
}
