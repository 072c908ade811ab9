//! Network module - Handles TCP communication with pinging clients
//!
//! Provides:
//! - Server for accepting incoming connections
//! - Per-connection protocol state machine

mod connection;
mod server;

pub use connection::*;
pub use server::*;

use crate::protocol::{DEFAULT_PORT, MAX_PACKET_LENGTH};

/// Configuration for network operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Interface to bind to
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// Largest accepted packet body
    pub max_packet_length: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_packet_length: MAX_PACKET_LENGTH,
        }
    }
}

impl NetworkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: String) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn with_max_packet_length(mut self, max_packet_length: usize) -> Self {
        self.max_packet_length = max_packet_length;
        self
    }

    /// Address string suitable for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", self.bind_address, self.port)
        } else {
            format!("{}:{}", self.bind_address, self.port)
        }
    }
}
