use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task;
use tracing::{error, info, warn};

use crate::audit::AuditSink;
use crate::auth::AuthService;
use crate::config::default_max_connections;
use crate::dispatch::Dispatcher;
use crate::messages::wire::{LineCodec, WireConfig};
use crate::network::handler::ConnectionHandler;

/// Errors surfaced by [`Server`]
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listener-level tuning.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Idle budget while waiting for the next request on a connection
    pub read_timeout: Duration,
    /// Cap on simultaneously served connections
    pub max_connections: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(7),
            max_connections: default_max_connections(),
        }
    }
}

/// Accepts connections and runs one [`ConnectionHandler`] task per peer.
/// Handlers run fully in parallel and share the auth service, dispatcher
/// and audit sink.
pub struct Server {
    listener: TcpListener,
    auth: Arc<AuthService>,
    dispatcher: Arc<dyn Dispatcher>,
    audit: Arc<dyn AuditSink>,
    codec: LineCodec,
    permits: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
}

impl Server {
    /// Bind to `addr`. Nothing is served until [`Self::run`].
    pub async fn bind(
        addr: &str,
        auth: Arc<AuthService>,
        dispatcher: Arc<dyn Dispatcher>,
        audit: Arc<dyn AuditSink>,
        options: ServerOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("server bound to {}", addr);
        let codec = LineCodec::new(WireConfig {
            read_timeout: options.read_timeout,
            ..WireConfig::default()
        });
        Ok(Self {
            listener,
            auth,
            dispatcher,
            audit,
            codec,
            permits: Arc::new(Semaphore::new(options.max_connections)),
            shutdown,
        })
    }

    /// The address actually bound, for callers that asked for port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown signal flips or its sender
    /// goes away. Handlers already running finish on their own tasks.
    pub async fn run(mut self) -> Result<(), ServerError> {
        info!("serving on {}", self.listener.local_addr()?);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_handler(stream, peer),
                        Err(err) => {
                            error!("failed to accept connection: {}", err);
                            continue;
                        }
                    }
                }
                _ = self.shutdown.changed() => {
                    info!("shutdown requested, no longer accepting");
                    break;
                }
            }
        }
        Ok(())
    }

    fn spawn_handler(&self, stream: TcpStream, peer: SocketAddr) {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                // Dropping the stream closes it straight away.
                warn!("connection limit reached, rejecting {}", peer);
                return;
            }
        };
        let handler = ConnectionHandler::new(
            peer,
            Arc::clone(&self.auth),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.audit),
            self.codec.clone(),
        );
        task::spawn(async move {
            handler.run(stream).await;
            drop(permit);
        });
    }
}
