use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::messages::wire::{LineCodec, WireError};
use crate::messages::{Request, Response};

/// Errors surfaced by [`ClientConnection`]
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not connected")]
    NotConnected,

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Persistent connection to a records server.
///
/// Remembers the session token from a successful login and injects it
/// into later requests that do not carry their own. A transport failure
/// inside [`Self::send`] is retried through exactly one
/// close-reconnect-resend cycle; a second failure surfaces to the caller.
pub struct ClientConnection {
    addr: String,
    connect_timeout: Duration,
    codec: LineCodec,
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
    token: Option<String>,
}

impl ClientConnection {
    /// Dial the configured server.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut connection = Self {
            addr: config.addr(),
            connect_timeout: config.connect_timeout(),
            codec: LineCodec::new(config.wire_config()),
            reader: None,
            writer: None,
            token: None,
        };
        connection.open_socket().await?;
        Ok(connection)
    }

    async fn open_socket(&mut self) -> Result<(), ClientError> {
        self.close_transport().await;
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout {
                addr: self.addr.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|source| ClientError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        let (read_half, write_half) = stream.into_split();
        self.reader = Some(BufReader::new(read_half));
        self.writer = Some(write_half);
        debug!("connected to {}", self.addr);
        Ok(())
    }

    /// Log in and remember the issued token.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self.send(Request::login(username, password)).await?;
        let token = response.token.as_deref().unwrap_or("").trim().to_string();
        if response.is_ok() && !token.is_empty() {
            self.token = Some(token);
            info!("logged in as {}", username);
            Ok(())
        } else {
            let reason = response
                .message
                .unwrap_or_else(|| "no reason given".to_string());
            Err(ClientError::LoginRejected(reason))
        }
    }

    /// Send one request and wait for its response.
    ///
    /// Non-login requests without a token get the stored one. Every call
    /// starts with a fresh retry credit: earlier successes or recoveries
    /// do not use it up.
    pub async fn send(&mut self, mut request: Request) -> Result<Response, ClientError> {
        if !request.is_login() && request.token.is_none() {
            request.token = self.token.clone();
        }
        match self.exchange(&request).await {
            Ok(response) => Ok(response),
            Err(ClientError::Wire(err)) if err.is_transport() => {
                warn!("transport failure ({}), reconnecting once", err);
                self.open_socket().await?;
                self.exchange(&request).await
            }
            Err(err) => Err(err),
        }
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response, ClientError> {
        let writer = self.writer.as_mut().ok_or(ClientError::NotConnected)?;
        self.codec.write_frame(writer, request).await?;
        let reader = self.reader.as_mut().ok_or(ClientError::NotConnected)?;
        let response = self.codec.read_frame_timed(reader).await?;
        Ok(response)
    }

    /// The session token from the last successful login, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Close the connection. Safe to call repeatedly; problems while
    /// closing are logged and swallowed.
    pub async fn close(&mut self) {
        self.close_transport().await;
    }

    async fn close_transport(&mut self) {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.shutdown().await {
                debug!("socket shutdown during close: {}", err);
            }
        }
    }
}
