//! Protocol module - Defines the wire protocol spoken before a client joins
//!
//! Every packet is framed as:
//! - VarInt length (covers id + payload)
//! - VarInt packet id
//! - Variable length payload
//!
//! Only the handshake and status phases are implemented.

mod codec;
mod message;

pub use codec::*;
pub use message::*;

/// Default port for the server list ping
pub const DEFAULT_PORT: u16 = 25565;

/// Protocol number advertised when none is configured (1.19.4)
pub const DEFAULT_PROTOCOL_VERSION: i32 = 762;

/// Version name advertised when none is configured
pub const DEFAULT_VERSION_NAME: &str = "1.19.4";
