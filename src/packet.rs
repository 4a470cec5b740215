use std::ops::Range;

use crate::error::GameServerError;

#[derive(Debug, PartialEq, Eq)]
pub enum PacketHeader {
    Single,
    Split,
}

/// Convert an i32 into a [PacketHeader].
impl TryFrom<i32> for PacketHeader {
    type Error = GameServerError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(PacketHeader::Single),
            -2 => Ok(PacketHeader::Split),
            n => Err(GameServerError::UnknownPacketHeader(n)),
        }
    }
}

/// For packing a [PacketHeader] into a packet in [RequestPacket::pack].
impl PacketHeader {
    pub fn to_le_bytes(&self) -> [u8; 4] {
        let type_value: i32 = match self {
            PacketHeader::Single => -1,
            PacketHeader::Split => -2,
        };
        type_value.to_le_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// A2S_INFO Request -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_INFO
    ///
    /// Retrieves information about the server including, but not limited to:
    /// its name, the map currently being played, and the number of players.
    InfoRequest,
    /// A2S_PLAYER Request -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_PLAYER
    ///
    /// Always challenged: the first request carries `FFFFFFFF` as its challenge.
    PlayersRequest,
    /// S2C_CHALLENGE
    ///
    /// the server may reply with a challenge to the client using S2C_CHALLENGE
    /// ('A' or 0x41). In that case, the client should repeat the request by appending the challenge number.
    Challenge,
    /// A2S_INFO Response Packet, to be parsed by [crate::info::ServerInfo::parse].
    InfoResponse,
    /// A2S_PLAYER Response Packet, to be parsed by [crate::players::parse_players].
    PlayersResponse,
}

/// Convert a u8 into a [PacketType].
impl TryFrom<u8> for PacketType {
    type Error = GameServerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x54 => Ok(PacketType::InfoRequest),
            0x55 => Ok(PacketType::PlayersRequest),
            0x41 => Ok(PacketType::Challenge),
            0x49 => Ok(PacketType::InfoResponse),
            0x44 => Ok(PacketType::PlayersResponse),
            n => Err(GameServerError::UnknownPacketType(n)),
        }
    }
}

/// For packing a [PacketType] into a packet in [RequestPacket::pack].
impl PacketType {
    pub fn to_byte(&self) -> u8 {
        match self {
            PacketType::InfoRequest => 0x54,     // 'T'
            PacketType::PlayersRequest => 0x55,  // 'U'
            PacketType::Challenge => 0x41,       // 'A'
            PacketType::InfoResponse => 0x49,    // 'I'
            PacketType::PlayersResponse => 0x44, // 'D'
        }
    }
}

/// According to the Valve wiki, Source query responses use 1400 bytes + IP/UDP headers.
pub const MAX_PACKET_SIZE: usize = 1400;

/// Challenge sent with the first A2S_PLAYER request to ask for a real one.
pub const NO_CHALLENGE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

#[derive(Debug, PartialEq, Eq)]
pub struct RequestPacket {
    packet_header: PacketHeader,
    packet_type: PacketType,
    body: Option<&'static str>,
    challenge: Option<Vec<u8>>,
}

impl RequestPacket {
    /// An A2S_INFO request, optionally answering a previous challenge.
    pub fn info(challenge: Option<Vec<u8>>) -> Self {
        RequestPacket {
            packet_header: PacketHeader::Single,
            packet_type: PacketType::InfoRequest,
            body: Some("Source Engine Query"),
            challenge,
        }
    }

    /// An A2S_PLAYER request. Without a challenge this asks the server for one.
    pub fn players(challenge: Option<Vec<u8>>) -> Self {
        RequestPacket {
            packet_header: PacketHeader::Single,
            packet_type: PacketType::PlayersRequest,
            body: None,
            challenge: Some(challenge.unwrap_or_else(|| NO_CHALLENGE.to_vec())),
        }
    }

    /// Serializes a request packet into an array of bytes.
    pub fn pack(&self) -> Vec<u8> {
        // packet structure: header, type, body, terminator (and challenge)
        let mut payload: Vec<u8> = Vec::<u8>::new();
        payload.extend_from_slice(&self.packet_header.to_le_bytes());
        payload.push(self.packet_type().to_byte());
        if let Some(body) = self.body {
            payload.extend_from_slice(body.as_bytes());
            payload.push(0);
        }
        if let Some(c) = &self.challenge {
            payload.extend_from_slice(c);
        }

        payload
    }

    pub fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ResponsePacket {
    packet_type: PacketType,
    body: Vec<u8>,
}

impl ResponsePacket {
    const HEADER_RANGE: Range<usize> = 0..4;
    const TYPE_OFFSET: usize = 4;
    const BODY_OFFSET: usize = 5;
    const CHALLENGE_BODY: Range<usize> = 5..9;

    /// Deserializes an incoming packet, splitting it up into headers and body.
    pub fn unpack(incoming: &[u8]) -> Result<Self, GameServerError> {
        let raw_header: [u8; 4] = incoming
            .get(Self::HEADER_RANGE)
            .ok_or(GameServerError::UnexpectedEnd)?
            .try_into()
            .map_err(|_| GameServerError::UnexpectedEnd)?;
        let packet_header: PacketHeader = i32::from_le_bytes(raw_header).try_into()?;

        if packet_header == PacketHeader::Split {
            return Err(GameServerError::SplitPacket);
        }

        let raw_type: u8 = *incoming
            .get(Self::TYPE_OFFSET)
            .ok_or(GameServerError::UnexpectedEnd)?;
        let packet_type: PacketType = raw_type.try_into()?;

        let raw_body: &[u8] = if packet_type == PacketType::Challenge {
            incoming
                .get(Self::CHALLENGE_BODY)
                .ok_or(GameServerError::UnexpectedEnd)?
        } else {
            &incoming[Self::BODY_OFFSET..]
        };

        Ok(ResponsePacket {
            packet_type,
            body: raw_body.to_vec(),
        })
    }

    pub fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Fail unless this packet is of type `expected`.
    pub fn expect_type(self, expected: PacketType) -> Result<Self, GameServerError> {
        if self.packet_type == expected {
            Ok(self)
        } else {
            Err(GameServerError::UnknownPacketType(self.packet_type.to_byte()))
        }
    }
}
