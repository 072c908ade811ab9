//! Connection handling for listping
//!
//! Each accepted socket gets one `Connection`, which owns the stream and
//! walks the handshake -> status phases:
//! - Packet framing and decoding
//! - Phase dispatch
//! - Status and pong responses

use bytes::BytesMut;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::{read_frame, Clientbound, CodecError, ConnectionPhase, NextState, Serverbound};
use crate::status::StatusResponder;

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Status serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Why a connection ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client closed the stream between packets
    ClientClosed,
    /// The handshake asked for the login phase, which is not served
    LoginRequested,
    /// The handshake asked for a phase that does not exist
    UnsupportedNextState(i32),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientClosed => write!(f, "client closed connection"),
            DisconnectReason::LoginRequested => write!(f, "login is not supported"),
            DisconnectReason::UnsupportedNextState(state) => {
                write!(f, "unsupported next state {}", state)
            }
        }
    }
}

/// Connection statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Packets received
    pub packets_received: u64,
    /// Packets sent
    pub packets_sent: u64,
    /// Bytes received (frame bodies only)
    pub bytes_received: u64,
    /// Bytes sent
    pub bytes_sent: u64,
}

/// One client connection and its protocol phase
pub struct Connection<S> {
    /// Remote peer address
    remote_addr: SocketAddr,
    /// The buffered stream; writes pass straight through
    stream: BufReader<S>,
    /// Current protocol phase
    phase: ConnectionPhase,
    /// Status document source
    status: StatusResponder,
    /// Largest accepted frame body
    max_packet_length: usize,
    /// Write buffer, one whole frame at a time
    write_buf: BytesMut,
    /// Statistics
    stats: ConnectionStats,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new connection from an established stream
    pub fn new(
        stream: S,
        remote_addr: SocketAddr,
        status: StatusResponder,
        max_packet_length: usize,
    ) -> Self {
        Self {
            remote_addr,
            stream: BufReader::new(stream),
            phase: ConnectionPhase::Handshake,
            status,
            max_packet_length,
            write_buf: BytesMut::with_capacity(1024),
            stats: ConnectionStats::default(),
        }
    }

    /// Get the remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Get the current protocol phase
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Get connection statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Serve the connection until the client leaves or misbehaves
    ///
    /// The stream is shut down on every exit path.
    pub async fn run(&mut self) -> ConnectionResult<DisconnectReason> {
        let result = self.serve().await;

        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!("Shutdown of {} failed: {}", self.remote_addr, e);
        }

        result
    }

    async fn serve(&mut self) -> ConnectionResult<DisconnectReason> {
        loop {
            let Some(packet) = self.recv().await? else {
                return Ok(DisconnectReason::ClientClosed);
            };

            if let Some(reason) = self.handle(packet).await? {
                return Ok(reason);
            }
        }
    }

    /// Receive the next packet (returns None on a clean close)
    pub async fn recv(&mut self) -> ConnectionResult<Option<Serverbound>> {
        let phase = self.phase;

        let result = match read_frame(&mut self.stream, self.max_packet_length).await {
            Ok(Some(body)) => {
                self.stats.packets_received += 1;
                self.stats.bytes_received += body.len() as u64;

                let mut reader = &body[..];
                let packet = Serverbound::decode(phase, &mut reader).await;

                if !reader.is_empty() {
                    tracing::trace!(
                        "Ignoring {} trailing bytes in {} packet",
                        reader.len(),
                        phase
                    );
                }

                packet.map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match (phase, result) {
            (_, Ok(packet)) => Ok(packet),
            (ConnectionPhase::Handshake, Err(e)) => Err(ConnectionError::ProtocolViolation(
                format!("malformed handshake: {}", e),
            )),
            (ConnectionPhase::Status, Err(e)) => Err(e.into()),
        }
    }

    /// Dispatch one packet; returns a reason when the connection should end
    async fn handle(&mut self, packet: Serverbound) -> ConnectionResult<Option<DisconnectReason>> {
        match self.phase {
            ConnectionPhase::Handshake => match packet {
                Serverbound::Handshake(handshake) => {
                    tracing::debug!(
                        "Handshake: protocol={} address={}:{} next={:?}",
                        handshake.protocol_version,
                        handshake.server_address,
                        handshake.server_port,
                        handshake.next_state
                    );

                    match handshake.next_state {
                        NextState::Status => {
                            self.phase = ConnectionPhase::Status;
                            Ok(None)
                        }
                        NextState::Login => Ok(Some(DisconnectReason::LoginRequested)),
                        NextState::Unknown(state) => {
                            Ok(Some(DisconnectReason::UnsupportedNextState(state)))
                        }
                    }
                }
                other => {
                    tracing::debug!("Ignoring packet {:#04x} before handshake", other.id());
                    Ok(None)
                }
            },
            ConnectionPhase::Status => match packet {
                Serverbound::StatusRequest => {
                    let json = self.status.to_json()?;
                    self.send(&Clientbound::StatusResponse { json }).await?;
                    tracing::debug!("Sent status to {}", self.remote_addr);
                    Ok(None)
                }
                Serverbound::PingRequest { payload } => {
                    self.send(&Clientbound::PongResponse { payload }).await?;
                    tracing::debug!("Sent pong to {}", self.remote_addr);
                    Ok(None)
                }
                other => {
                    tracing::debug!("Ignoring packet {:#04x} in status phase", other.id());
                    Ok(None)
                }
            },
        }
    }

    /// Send a packet as a single write
    pub async fn send(&mut self, packet: &Clientbound) -> ConnectionResult<()> {
        self.write_buf.clear();
        packet.encode(&mut self.write_buf);

        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += self.write_buf.len() as u64;

        Ok(())
    }
}
