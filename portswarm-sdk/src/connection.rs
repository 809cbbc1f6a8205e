//! A single source-bound connection to the IRC server.
//!
//! The socket is bound to a chosen local address before connecting, so each
//! swarm client appears from its own address. Sends are paced: after every
//! line the calling task sleeps for `send_delay` to stay under server flood
//! limits. Receives are bounded by a short timeout so the caller can run its
//! periodic sweeps even when the server is quiet.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpSocket;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::LineCodec;
use crate::command::Command;
use crate::error::{ConnectError, ParseError, TransportError};

/// Where to connect from and to.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Local address to bind before connecting.
    pub local_addr: IpAddr,
    /// Server host name or literal address.
    pub server_host: String,
    pub server_port: u16,
    /// Upper bound for resolve + connect.
    pub connect_timeout: Duration,
    /// Pause after every outbound line.
    pub send_delay: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            local_addr: IpAddr::from([0, 0, 0, 0]),
            server_host: "127.0.0.1".to_string(),
            server_port: 6667,
            connect_timeout: Duration::from_secs(30),
            send_delay: Duration::from_millis(500),
        }
    }
}

/// Outcome of one bounded receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    /// One or more complete lines, in arrival order.
    Lines(Vec<String>),
    /// Nothing arrived in time. Not an error.
    Timeout,
    /// The server closed the connection.
    Closed,
}

/// Anything a state machine can send commands through.
pub trait CommandSink {
    fn send(&mut self, cmd: Command) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Records commands instead of sending them.
impl CommandSink for Vec<Command> {
    fn send(&mut self, cmd: Command) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.push(cmd);
        std::future::ready(Ok(()))
    }
}

/// A live connection. Dropping it closes the socket.
pub struct Connection {
    reader: FramedRead<OwnedReadHalf, LineCodec>,
    writer: FramedWrite<OwnedWriteHalf, LineCodec>,
    local: SocketAddr,
    peer: SocketAddr,
    send_delay: Duration,
    /// Read error met while draining a batch, reported by the next receive.
    deferred: Option<ParseError>,
}

impl Connection {
    /// Bind to `config.local_addr` and connect to the server, choosing the
    /// address family from the local address.
    pub async fn open(config: &ConnectConfig) -> Result<Connection, ConnectError> {
        let timeout = config.connect_timeout;
        match tokio::time::timeout(timeout, Self::open_inner(config)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout {
                host: config.server_host.clone(),
                port: config.server_port,
                after: timeout,
            }),
        }
    }

    async fn open_inner(config: &ConnectConfig) -> Result<Connection, ConnectError> {
        let local = config.local_addr;
        let host = &config.server_host;
        let port = config.server_port;

        tracing::debug!(%local, "Resolving {host}:{port}...");
        let candidates: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|source| ConnectError::Resolve {
                host: host.clone(),
                source,
            })?
            .filter(|addr| addr.is_ipv4() == local.is_ipv4())
            .collect();

        if candidates.is_empty() {
            return Err(ConnectError::NoAddressForFamily {
                host: host.clone(),
                local,
                family: if local.is_ipv4() { "IPv4" } else { "IPv6" },
            });
        }

        let mut last_err = None;
        for remote in candidates {
            let socket = if local.is_ipv4() {
                TcpSocket::new_v4()
            } else {
                TcpSocket::new_v6()
            }
            .and_then(|s| s.bind(SocketAddr::new(local, 0)).map(|_| s))
            .map_err(|source| ConnectError::Bind { local, source })?;

            match socket.connect(remote).await {
                Ok(stream) => {
                    let local_addr = stream.local_addr().unwrap_or(SocketAddr::new(local, 0));
                    tracing::debug!(%local_addr, %remote, "TCP connected");
                    let (read, write) = stream.into_split();
                    return Ok(Connection {
                        reader: FramedRead::new(read, LineCodec::new()),
                        writer: FramedWrite::new(write, LineCodec::new()),
                        local: local_addr,
                        peer: remote,
                        send_delay: config.send_delay,
                        deferred: None,
                    });
                }
                Err(e) => {
                    tracing::debug!(%remote, error = %e, "Connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(ConnectError::Connect {
            host: host.clone(),
            port,
            source: last_err
                .unwrap_or_else(|| std::io::Error::other("no address could be reached")),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Write one line (CRLF appended), then pause for the send delay.
    /// Anything after an embedded line break is dropped.
    pub async fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
        let line = text.split(['\r', '\n']).next().unwrap_or_default();
        self.writer.send(line.to_string()).await?;
        tracing::debug!("-> {line}");
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        Ok(())
    }

    /// Wait up to `timeout` for input. Returns every line already buffered
    /// once the first one arrives. A read error behind good lines is held
    /// back until the next call so those lines are still delivered.
    pub async fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        if let Some(e) = self.deferred.take() {
            return Err(e.into());
        }
        let first = match tokio::time::timeout(timeout, self.reader.next()).await {
            Err(_) => return Ok(Received::Timeout),
            Ok(None) => return Ok(Received::Closed),
            Ok(Some(line)) => line?,
        };

        let mut lines = vec![first];
        while let Some(Some(next)) = self.reader.next().now_or_never() {
            match next {
                Ok(line) => lines.push(line),
                Err(e) => {
                    self.deferred = Some(e);
                    break;
                }
            }
        }
        for line in &lines {
            tracing::trace!("<- {line}");
        }
        Ok(Received::Lines(lines))
    }

    /// Flush and shut down the write half. The read half closes on drop.
    pub async fn close(mut self) {
        if let Err(e) = SinkExt::<String>::close(&mut self.writer).await {
            tracing::debug!(error = %e, "Error while closing connection");
        }
    }
}

impl CommandSink for Connection {
    async fn send(&mut self, cmd: Command) -> Result<(), TransportError> {
        self.send_line(&cmd.to_string()).await
    }
}
