use crate::error::{DecodeReason, Result, SourceQueryError};
use crate::packet::PacketType;
use crate::parse::{get_string, get_u16, get_u32, get_u64, get_u8};

/// App ID of The Ship, which adds three fields to the response.
const THE_SHIP_APP_ID: u16 = 2400;

/// Which response layout a [ServerInfo] was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoFormat {
    /// `I` response sent by Source servers and modern GoldSource builds.
    Source,
    /// Obsolete `m` response still sent by some GoldSource servers.
    GoldSource,
}

/// The Ship game mode details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheShip {
    pub mode: u8,
    pub witnesses: u8,
    pub duration: u8,
}

/// SourceTV spectator relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spectator {
    pub port: u16,
    pub name: String,
}

/// Half-Life mod details, GoldSource responses only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInfo {
    pub link: String,
    pub download_link: String,
    pub version: u32,
    pub size: u32,
    pub multiplayer_only: bool,
    pub custom_dll: bool,
}

/// Server information as obtained by [crate::query::info].
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub format: InfoFormat,
    /// A2S_INFO protocol version
    pub protocol: u8,
    /// Server hostname
    pub name: String,
    /// Current map
    pub map: String,
    /// Location of server files
    pub folder: String,
    /// Name of game
    pub game: String,
    /// Steam app ID of game, 0 for GoldSource format responses
    pub app_id: u16,
    /// Current players
    pub players: u8,
    /// Max players
    pub max_players: u8,
    /// Current bots
    pub bots: u8,
    /// Server type:
    /// - `d`: Dedicated
    /// - `l`: Listen (non-dedicated)
    /// - `p`: SourceTV relay (proxy)
    ///
    /// GoldSource format responses use upper case.
    pub server_type: char,
    /// Server environment:
    /// - `l`: Linux
    /// - `w`: Windows
    /// - `m` or `o`: Mac
    pub server_env: char,
    /// Is the server password protected?
    pub password_protected: bool,
    /// Is the server VAC enabled?
    pub vac_enabled: bool,
    pub the_ship: Option<TheShip>,
    /// Game version, empty for GoldSource format responses
    pub version: String,
    /// Extra data flags, `None` when the server sent none
    pub edf: Option<u8>,
    pub port: Option<u16>,
    pub steam_id: Option<u64>,
    pub spectator: Option<Spectator>,
    /// Server tags
    pub keywords: Option<String>,
    /// 64-bit game ID, its low 24 bits are the full app ID
    pub game_id: Option<u64>,
    /// Server address as reported by a GoldSource server
    pub address: Option<String>,
    pub mod_info: Option<ModInfo>,
}

/// Optional trailing fields, each gated by one EDF bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtraField {
    Port,
    SteamId,
    Spectator,
    Keywords,
    GameId,
}

impl ExtraField {
    /// Bit and field, in the order the fields appear on the wire.
    const LAYOUT: [(u8, ExtraField); 5] = [
        (0x80, ExtraField::Port),
        (0x10, ExtraField::SteamId),
        (0x40, ExtraField::Spectator),
        (0x20, ExtraField::Keywords),
        (0x01, ExtraField::GameId),
    ];

    fn present(edf: u8) -> impl Iterator<Item = ExtraField> {
        Self::LAYOUT
            .into_iter()
            .filter(move |(bit, _)| edf & bit != 0)
            .map(|(_, field)| field)
    }
}

impl ServerInfo {
    /// Decode a logical A2S_INFO payload, starting with its response type.
    pub fn parse(data: &[u8]) -> Result<ServerInfo> {
        let mut offset = 0;
        let kind = get_u8(data, &mut offset)?;
        match PacketType::try_from(kind) {
            Ok(PacketType::InfoResponse) => Self::parse_source(data, &mut offset),
            Ok(PacketType::GoldSourceInfoResponse) => Self::parse_goldsource(data, &mut offset),
            _ => Err(SourceQueryError::DecodeError(
                DecodeReason::UnexpectedResponseType(kind),
            )),
        }
    }

    fn parse_source(data: &[u8], offset: &mut usize) -> Result<ServerInfo> {
        let protocol = get_u8(data, offset)?;
        let name = get_string(data, offset)?;
        let map = get_string(data, offset)?;
        let folder = get_string(data, offset)?;
        let game = get_string(data, offset)?;
        let app_id = get_u16(data, offset)?;
        let players = get_u8(data, offset)?;
        let max_players = get_u8(data, offset)?;
        let bots = get_u8(data, offset)?;
        let server_type = char::from(get_u8(data, offset)?);
        let server_env = char::from(get_u8(data, offset)?);
        let password_protected = get_u8(data, offset)? == 1;
        let vac_enabled = get_u8(data, offset)? == 1;

        let the_ship = if app_id == THE_SHIP_APP_ID {
            Some(TheShip {
                mode: get_u8(data, offset)?,
                witnesses: get_u8(data, offset)?,
                duration: get_u8(data, offset)?,
            })
        } else {
            None
        };

        let version = get_string(data, offset)?;

        let mut info = ServerInfo {
            format: InfoFormat::Source,
            protocol,
            name,
            map,
            folder,
            game,
            app_id,
            players,
            max_players,
            bots,
            server_type,
            server_env,
            password_protected,
            vac_enabled,
            the_ship,
            version,
            edf: None,
            port: None,
            steam_id: None,
            spectator: None,
            keywords: None,
            game_id: None,
            address: None,
            mod_info: None,
        };

        // older servers stop right after the version string
        if *offset == data.len() {
            return Ok(info);
        }

        let edf = get_u8(data, offset)?;
        info.edf = Some(edf);
        for field in ExtraField::present(edf) {
            match field {
                ExtraField::Port => info.port = Some(get_u16(data, offset)?),
                ExtraField::SteamId => info.steam_id = Some(get_u64(data, offset)?),
                ExtraField::Spectator => {
                    info.spectator = Some(Spectator {
                        port: get_u16(data, offset)?,
                        name: get_string(data, offset)?,
                    })
                }
                ExtraField::Keywords => info.keywords = Some(get_string(data, offset)?),
                ExtraField::GameId => info.game_id = Some(get_u64(data, offset)?),
            }
        }

        Ok(info)
    }

    fn parse_goldsource(data: &[u8], offset: &mut usize) -> Result<ServerInfo> {
        let address = get_string(data, offset)?;
        let name = get_string(data, offset)?;
        let map = get_string(data, offset)?;
        let folder = get_string(data, offset)?;
        let game = get_string(data, offset)?;
        let players = get_u8(data, offset)?;
        let max_players = get_u8(data, offset)?;
        let protocol = get_u8(data, offset)?;
        let server_type = char::from(get_u8(data, offset)?);
        let server_env = char::from(get_u8(data, offset)?);
        let password_protected = get_u8(data, offset)? == 1;

        let mod_info = if get_u8(data, offset)? == 1 {
            let link = get_string(data, offset)?;
            let download_link = get_string(data, offset)?;
            // unused null byte
            get_u8(data, offset)?;
            Some(ModInfo {
                link,
                download_link,
                version: get_u32(data, offset)?,
                size: get_u32(data, offset)?,
                multiplayer_only: get_u8(data, offset)? == 1,
                custom_dll: get_u8(data, offset)? == 1,
            })
        } else {
            None
        };

        let vac_enabled = get_u8(data, offset)? == 1;
        let bots = get_u8(data, offset)?;

        Ok(ServerInfo {
            format: InfoFormat::GoldSource,
            protocol,
            name,
            map,
            folder,
            game,
            app_id: 0,
            players,
            max_players,
            bots,
            server_type,
            server_env,
            password_protected,
            vac_enabled,
            the_ship: None,
            version: String::new(),
            edf: None,
            port: None,
            steam_id: None,
            spectator: None,
            keywords: None,
            game_id: None,
            address: Some(address),
            mod_info,
        })
    }
}
