use std::ops::RangeInclusive;

use crate::config::Engine;
use crate::error::{Result, SourceQueryError};
use crate::framer::Fragment;

/// Challenge value sent when we do not have one yet.
pub const CHALLENGE_PLACEHOLDER: i32 = -1;

pub const INFO_REQUEST_BODY: &str = "Source Engine Query";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHeader {
    Single,
    Split,
}

impl PacketHeader {
    const SINGLE: i32 = -1;
    const SPLIT: i32 = -2;

    pub fn to_le_bytes(self) -> [u8; 4] {
        let value: i32 = match self {
            PacketHeader::Single => Self::SINGLE,
            PacketHeader::Split => Self::SPLIT,
        };
        value.to_le_bytes()
    }
}

impl TryFrom<i32> for PacketHeader {
    type Error = SourceQueryError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            Self::SINGLE => Ok(PacketHeader::Single),
            Self::SPLIT => Ok(PacketHeader::Split),
            n => Err(SourceQueryError::UnknownPacketHeader(n)),
        }
    }
}

/// The byte following a single packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// A2S_INFO request (`T`).
    InfoRequest,
    /// A2S_PLAYER request (`U`).
    PlayersRequest,
    /// A2S_RULES request (`V`).
    RulesRequest,
    /// S2C_CHALLENGE (`A`).
    ///
    /// The client should repeat the request with the enclosed challenge number.
    Challenge,
    /// A2S_INFO response from a Source server (`I`).
    InfoResponse,
    /// Obsolete A2S_INFO response still sent by GoldSource servers (`m`).
    GoldSourceInfoResponse,
    /// A2S_PLAYER response (`D`).
    PlayersResponse,
    /// A2S_RULES response (`E`).
    RulesResponse,
}

impl PacketType {
    pub fn to_byte(self) -> u8 {
        match self {
            PacketType::InfoRequest => 0x54,
            PacketType::PlayersRequest => 0x55,
            PacketType::RulesRequest => 0x56,
            PacketType::Challenge => 0x41,
            PacketType::InfoResponse => 0x49,
            PacketType::GoldSourceInfoResponse => 0x6D,
            PacketType::PlayersResponse => 0x44,
            PacketType::RulesResponse => 0x45,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = SourceQueryError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x54 => Ok(PacketType::InfoRequest),
            0x55 => Ok(PacketType::PlayersRequest),
            0x56 => Ok(PacketType::RulesRequest),
            0x41 => Ok(PacketType::Challenge),
            0x49 => Ok(PacketType::InfoResponse),
            0x6D => Ok(PacketType::GoldSourceInfoResponse),
            0x44 => Ok(PacketType::PlayersResponse),
            0x45 => Ok(PacketType::RulesResponse),
            n => Err(SourceQueryError::MalformedPacket(format!(
                "unknown packet type {n:#04x}"
            ))),
        }
    }
}

/// A query sent to a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPacket {
    Info { challenge: Option<i32> },
    Players { challenge: i32 },
    Rules { challenge: i32 },
}

impl RequestPacket {
    pub fn info() -> Self {
        RequestPacket::Info { challenge: None }
    }

    pub fn players() -> Self {
        RequestPacket::Players {
            challenge: CHALLENGE_PLACEHOLDER,
        }
    }

    pub fn rules() -> Self {
        RequestPacket::Rules {
            challenge: CHALLENGE_PLACEHOLDER,
        }
    }

    /// The same request carrying `token`.
    pub fn with_challenge(self, token: i32) -> Self {
        match self {
            RequestPacket::Info { .. } => RequestPacket::Info {
                challenge: Some(token),
            },
            RequestPacket::Players { .. } => RequestPacket::Players { challenge: token },
            RequestPacket::Rules { .. } => RequestPacket::Rules { challenge: token },
        }
    }

    /// Whether this request asks the server for a challenge.
    pub fn requests_challenge(&self) -> bool {
        match self {
            RequestPacket::Info { .. } => false,
            RequestPacket::Players { challenge } | RequestPacket::Rules { challenge } => {
                *challenge == CHALLENGE_PLACEHOLDER
            }
        }
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            RequestPacket::Info { .. } => PacketType::InfoRequest,
            RequestPacket::Players { .. } => PacketType::PlayersRequest,
            RequestPacket::Rules { .. } => PacketType::RulesRequest,
        }
    }

    /// Serializes a request packet into an array of bytes.
    pub fn pack(&self) -> Vec<u8> {
        // header, type, body (info only) and challenge
        let mut payload: Vec<u8> = Vec::with_capacity(29);
        payload.extend_from_slice(&PacketHeader::Single.to_le_bytes());
        payload.push(self.packet_type().to_byte());
        match *self {
            RequestPacket::Info { challenge } => {
                payload.extend_from_slice(INFO_REQUEST_BODY.as_bytes());
                payload.push(0);
                if let Some(c) = challenge {
                    payload.extend_from_slice(&c.to_le_bytes());
                }
            }
            RequestPacket::Players { challenge } | RequestPacket::Rules { challenge } => {
                payload.extend_from_slice(&challenge.to_le_bytes());
            }
        }
        payload
    }
}

/// One datagram as received from a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePacket {
    /// Complete payload, starting with its [PacketType] byte.
    Single(Vec<u8>),
    /// One part of a split response.
    Split(Fragment),
}

impl ResponsePacket {
    const HEADER_RANGE: RangeInclusive<usize> = 0..=3;
    const BODY_OFFSET: usize = 4;

    /// Splits an incoming datagram into its header and body.
    pub fn unpack(incoming: &[u8], engine: Engine) -> Result<Self> {
        let raw_header = incoming.get(Self::HEADER_RANGE).ok_or_else(|| {
            SourceQueryError::MalformedPacket(format!(
                "datagram of {} bytes is shorter than a packet header",
                incoming.len()
            ))
        })?;
        let mut header = [0u8; 4];
        header.copy_from_slice(raw_header);
        let body = &incoming[Self::BODY_OFFSET..];

        match PacketHeader::try_from(i32::from_le_bytes(header))? {
            PacketHeader::Single => Ok(ResponsePacket::Single(body.to_vec())),
            PacketHeader::Split => Ok(ResponsePacket::Split(Fragment::parse(body, engine)?)),
        }
    }
}
