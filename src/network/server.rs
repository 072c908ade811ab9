//! listping server
//!
//! Accepts TCP connections and hands each one to its own task. Tasks share
//! nothing but a read-only status snapshot.

use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use super::connection::Connection;
use super::NetworkConfig;
use crate::status::StatusResponder;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind failed: {0}")]
    BindFailed(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// listping server
pub struct Server {
    /// Server configuration
    config: NetworkConfig,
    /// Bound listener
    listener: TcpListener,
    /// Status document source shared by all connections
    status: StatusResponder,
}

impl Server {
    /// Bind the listener
    pub async fn bind(config: NetworkConfig, status: StatusResponder) -> ServerResult<Self> {
        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        Ok(Self {
            config,
            listener,
            status,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Server listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_client(stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Server shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_client(&self, stream: TcpStream, addr: SocketAddr) {
        tracing::debug!("New connection from {}", addr);

        let status = self.status.clone();
        let max_packet_length = self.config.max_packet_length;
        let span = tracing::debug_span!("client", peer = %addr);

        tokio::spawn(handle_client(stream, addr, status, max_packet_length).instrument(span));
    }
}

/// Handle a client connection
async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    status: StatusResponder,
    max_packet_length: usize,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::trace!("Failed to set TCP_NODELAY: {}", e);
    }

    let mut conn = Connection::new(stream, addr, status, max_packet_length);

    match conn.run().await {
        Ok(reason) => {
            let stats = conn.stats();
            tracing::debug!(
                "Disconnected: {} ({} packets in, {} packets out)",
                reason,
                stats.packets_received,
                stats.packets_sent
            );
        }
        Err(e) => {
            tracing::debug!("Dropped connection: {}", e);
        }
    }
}
