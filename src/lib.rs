//! listping - Server list ping responder
//!
//! Implements the handshake and status phases of the game protocol:
//! - `protocol`: VarInt/VarLong/string codec and packet definitions
//! - `status`: the JSON status document
//! - `network`: per-connection state machine and TCP server
//! - `config`: TOML configuration

pub mod config;
pub mod network;
pub mod protocol;
pub mod status;
