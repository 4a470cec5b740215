//! Source RCON packet encoding -- https://developer.valvesoftware.com/wiki/Source_RCON_Protocol

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::GameServerError;
use crate::parse::get_i32;

/// Raw Source RCON packet type.
///
/// `EXEC_COMMAND` and `AUTH_RESPONSE` share the value 2 on the wire, the
/// meaning depends on which side sent the packet.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RconPacketType(pub i32);

impl RconPacketType {
    pub const AUTH: RconPacketType = RconPacketType(3);
    pub const EXEC_COMMAND: RconPacketType = RconPacketType(2);
    pub const AUTH_RESPONSE: RconPacketType = RconPacketType(2);
    pub const RESPONSE_VALUE: RconPacketType = RconPacketType(0);
}

impl fmt::Debug for RconPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            3 => write!(f, "SERVERDATA_AUTH"),
            2 => write!(f, "SERVERDATA_EXECCOMMAND/AUTH_RESPONSE"),
            0 => write!(f, "SERVERDATA_RESPONSE_VALUE"),
            n => write!(f, "Unknown({n})"),
        }
    }
}

/// Size of the length prefix in front of every packet.
pub const LENGTH_PREFIX: usize = 4;
/// id + type + two empty strings + trailing terminator.
pub const MIN_PACKET_LENGTH: usize = 10;
/// Anything larger than this is treated as a corrupt stream.
pub const MAX_PACKET_LENGTH: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub request_id: i32,
    pub packet_type: RconPacketType,
    pub body1: String,
    pub body2: String,
}

impl RconPacket {
    pub fn new(request_id: i32, packet_type: RconPacketType, body1: impl Into<String>) -> Self {
        RconPacket {
            request_id,
            packet_type,
            body1: body1.into(),
            body2: String::new(),
        }
    }

    /// Serializes the packet, length prefix included.
    ///
    /// `length | id | type | body1 \0 | body2 \0 | \0`
    pub fn encode(&self) -> Vec<u8> {
        let length: usize = 4 + 4 + self.body1.len() + 1 + self.body2.len() + 1 + 1;
        let mut frame: Vec<u8> = vec![0u8; LENGTH_PREFIX + 8];
        frame.reserve(length - 8);

        LittleEndian::write_i32(&mut frame[0..4], length as i32);
        LittleEndian::write_i32(&mut frame[4..8], self.request_id);
        LittleEndian::write_i32(&mut frame[8..12], self.packet_type.0);
        frame.extend_from_slice(self.body1.as_bytes());
        frame.push(0);
        frame.extend_from_slice(self.body2.as_bytes());
        frame.push(0);
        frame.push(0);

        frame
    }

    /// Deserializes a full frame as produced by [RconPacket::encode].
    pub fn decode(frame: &[u8]) -> Result<Self, GameServerError> {
        let mut offset: usize = 0;
        let length: i32 = get_i32(frame, &mut offset)?;
        let length: usize = usize::try_from(length)
            .map_err(|_| GameServerError::InvalidPacket(format!("negative length {length}")))?;
        let payload: &[u8] = frame
            .get(LENGTH_PREFIX..LENGTH_PREFIX + length)
            .ok_or(GameServerError::UnexpectedEnd)?;
        Self::decode_payload(payload)
    }

    /// Deserializes everything following the length prefix.
    ///
    /// A missing `body2` or trailing terminator is tolerated, some servers
    /// only send a single terminator after `body1`.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, GameServerError> {
        let mut offset: usize = 0;
        let request_id: i32 = get_i32(payload, &mut offset)?;
        let packet_type: RconPacketType = RconPacketType(get_i32(payload, &mut offset)?);

        let rest: &[u8] = &payload[offset..];
        let (body1, rest) = split_cstring(rest);
        let (body2, _) = split_cstring(rest);

        Ok(RconPacket {
            request_id,
            packet_type,
            body1,
            body2,
        })
    }
}

/// Split off a null-terminated string, the whole slice if there is no terminator.
fn split_cstring(data: &[u8]) -> (String, &[u8]) {
    match data.iter().position(|c| *c == 0) {
        Some(end) => (
            String::from_utf8_lossy(&data[..end]).into_owned(),
            &data[end + 1..],
        ),
        None => (String::from_utf8_lossy(data).into_owned(), &[]),
    }
}

/// What the reassembler is waiting for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Length,
    Payload { expected: usize },
}

/// Turns an arbitrarily chunked byte stream back into packets.
///
/// Owned by the one reader loop of a connection.
#[derive(Debug)]
pub struct PacketReassembler {
    state: ReadState,
    buffer: Vec<u8>,
    packet_count: u64,
}

impl Default for PacketReassembler {
    fn default() -> Self {
        PacketReassembler {
            state: ReadState::Length,
            buffer: Vec::new(),
            packet_count: 0,
        }
    }
}

impl PacketReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of complete packets produced so far.
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Feed freshly read bytes, returning every packet they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<RconPacket>, GameServerError> {
        self.buffer.extend_from_slice(bytes);
        let mut packets: Vec<RconPacket> = Vec::new();

        loop {
            match self.state {
                ReadState::Length => {
                    if self.buffer.len() < LENGTH_PREFIX {
                        break;
                    }
                    let mut offset: usize = 0;
                    let length: i32 = get_i32(&self.buffer, &mut offset)?;
                    let expected: usize = usize::try_from(length)
                        .ok()
                        .filter(|l| (MIN_PACKET_LENGTH..=MAX_PACKET_LENGTH).contains(l))
                        .ok_or_else(|| {
                            GameServerError::InvalidPacket(format!("bad packet length {length}"))
                        })?;
                    self.buffer.drain(..LENGTH_PREFIX);
                    self.state = ReadState::Payload { expected };
                }
                ReadState::Payload { expected } => {
                    if self.buffer.len() < expected {
                        break;
                    }
                    let payload: Vec<u8> = self.buffer.drain(..expected).collect();
                    packets.push(RconPacket::decode_payload(&payload)?);
                    self.packet_count += 1;
                    self.state = ReadState::Length;
                }
            }
        }

        Ok(packets)
    }
}
