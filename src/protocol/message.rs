//! Protocol message definitions
//!
//! Defines the packets exchanged during the handshake and status phases.

use bytes::{BufMut, BytesMut};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::codec::{read_string, read_varint, write_packet, write_string, write_varint, CodecResult};

const HANDSHAKE: i32 = 0x00;
const STATUS_REQUEST: i32 = 0x00;
const PING_REQUEST: i32 = 0x01;
const STATUS_RESPONSE: i32 = 0x00;
const PONG_RESPONSE: i32 = 0x01;

/// Protocol phase of a single connection
///
/// Starts at `Handshake` and only ever moves forward to `Status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    #[default]
    Handshake,
    Status,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPhase::Handshake => write!(f, "handshake"),
            ConnectionPhase::Status => write!(f, "status"),
        }
    }
}

/// Phase requested by the client at the end of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
    Unknown(i32),
}

impl NextState {
    pub fn from_varint(value: i32) -> Self {
        match value {
            1 => NextState::Status,
            2 => NextState::Login,
            other => NextState::Unknown(other),
        }
    }

    pub fn to_varint(self) -> i32 {
        match self {
            NextState::Status => 1,
            NextState::Login => 2,
            NextState::Unknown(value) => value,
        }
    }
}

/// First packet of every connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

impl Handshake {
    /// Decode the handshake fields (the packet id has already been read)
    pub async fn decode<R>(reader: &mut R) -> CodecResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        let protocol_version = read_varint(reader).await?;
        let server_address = read_string(reader).await?;
        let server_port = reader.read_u16().await?;
        let next_state = NextState::from_varint(read_varint(reader).await?);

        Ok(Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }

    /// Encode as a complete frame, the way a client sends it
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut payload = BytesMut::new();
        write_varint(self.protocol_version, &mut payload);
        write_string(&self.server_address, &mut payload);
        payload.put_u16(self.server_port);
        write_varint(self.next_state.to_varint(), &mut payload);

        write_packet(HANDSHAKE, &payload, buf);
    }
}

/// Packets sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Serverbound {
    Handshake(Handshake),
    StatusRequest,
    PingRequest { payload: i64 },
    /// Any id not handled in the current phase
    Unknown { id: i32 },
}

impl Serverbound {
    /// Decode a frame body according to the connection phase
    pub async fn decode<R>(phase: ConnectionPhase, reader: &mut R) -> CodecResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        let id = read_varint(reader).await?;

        let packet = match (phase, id) {
            (ConnectionPhase::Handshake, HANDSHAKE) => {
                Serverbound::Handshake(Handshake::decode(reader).await?)
            }
            (ConnectionPhase::Status, STATUS_REQUEST) => Serverbound::StatusRequest,
            (ConnectionPhase::Status, PING_REQUEST) => Serverbound::PingRequest {
                payload: reader.read_i64().await?,
            },
            (_, id) => Serverbound::Unknown { id },
        };

        Ok(packet)
    }

    /// Get the packet id
    pub fn id(&self) -> i32 {
        match self {
            Serverbound::Handshake(_) => HANDSHAKE,
            Serverbound::StatusRequest => STATUS_REQUEST,
            Serverbound::PingRequest { .. } => PING_REQUEST,
            Serverbound::Unknown { id } => *id,
        }
    }
}

/// Packets sent by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clientbound {
    /// JSON status document
    StatusResponse { json: String },
    /// Echo of the client's ping token
    PongResponse { payload: i64 },
}

impl Clientbound {
    /// Get the packet id
    pub fn id(&self) -> i32 {
        match self {
            Clientbound::StatusResponse { .. } => STATUS_RESPONSE,
            Clientbound::PongResponse { .. } => PONG_RESPONSE,
        }
    }

    /// Encode as a complete frame
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut payload = BytesMut::new();

        match self {
            Clientbound::StatusResponse { json } => write_string(json, &mut payload),
            Clientbound::PongResponse { payload: token } => payload.put_i64(*token),
        }

        write_packet(self.id(), &payload, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_frame, MAX_PACKET_LENGTH};

    fn status_handshake() -> Handshake {
        Handshake {
            protocol_version: 762,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state: NextState::Status,
        }
    }

    #[test]
    fn test_handshake_wire_format() {
        let mut buf = BytesMut::new();
        status_handshake().encode(&mut buf);

        let mut expected = vec![0x10, 0x00, 0xFA, 0x05, 0x09];
        expected.extend_from_slice(b"localhost");
        expected.extend_from_slice(&[0x63, 0xDD, 0x01]);

        assert_eq!(&buf[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_decode_handshake() {
        let mut buf = BytesMut::new();
        status_handshake().encode(&mut buf);

        let body = read_frame(&mut &buf[..], MAX_PACKET_LENGTH).await.unwrap().unwrap();
        let packet = Serverbound::decode(ConnectionPhase::Handshake, &mut &body[..])
            .await
            .unwrap();

        assert_eq!(packet, Serverbound::Handshake(status_handshake()));
    }

    #[tokio::test]
    async fn test_decode_depends_on_phase() {
        let body = [0x00u8];

        let packet = Serverbound::decode(ConnectionPhase::Status, &mut &body[..])
            .await
            .unwrap();
        assert_eq!(packet, Serverbound::StatusRequest);

        // An empty id-0 body is not a valid handshake
        let result = Serverbound::decode(ConnectionPhase::Handshake, &mut &body[..]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_decode_ping_and_unknown() {
        let mut body = vec![0x01];
        body.extend_from_slice(&0x1122334455667788i64.to_be_bytes());

        let packet = Serverbound::decode(ConnectionPhase::Status, &mut &body[..])
            .await
            .unwrap();
        assert_eq!(packet, Serverbound::PingRequest { payload: 0x1122334455667788 });

        let packet = Serverbound::decode(ConnectionPhase::Status, &mut &[0x05u8][..])
            .await
            .unwrap();
        assert_eq!(packet, Serverbound::Unknown { id: 0x05 });
        assert_eq!(packet.id(), 0x05);

        let packet = Serverbound::decode(ConnectionPhase::Handshake, &mut &body[..])
            .await
            .unwrap();
        assert_eq!(packet, Serverbound::Unknown { id: 0x01 });
    }

    #[test]
    fn test_next_state_mapping() {
        assert_eq!(NextState::from_varint(1), NextState::Status);
        assert_eq!(NextState::from_varint(2), NextState::Login);
        assert_eq!(NextState::from_varint(7), NextState::Unknown(7));
        assert_eq!(NextState::Unknown(7).to_varint(), 7);
    }

    #[test]
    fn test_pong_encoding() {
        let mut buf = BytesMut::new();
        Clientbound::PongResponse { payload: 0x1122334455667788 }.encode(&mut buf);

        assert_eq!(
            &buf[..],
            &[0x09, 0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
    }

    #[test]
    fn test_status_response_encoding() {
        let mut buf = BytesMut::new();
        Clientbound::StatusResponse { json: "{}".to_string() }.encode(&mut buf);

        assert_eq!(&buf[..], &[0x04, 0x00, 0x02, b'{', b'}']);
    }
}
