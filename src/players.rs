use std::collections::HashSet;

use crate::config::Engine;
use crate::error::{DecodeReason, Result, SourceQueryError};
use crate::packet::PacketType;
use crate::parse::{get_f32, get_i32, get_string, get_u8};

/// One connected player, as obtained by [crate::query::players].
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Slot index as sent by the server. Usually 0 on Source, scrambled on GoldSource.
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Seconds connected
    pub duration: f32,
}

impl Player {
    /// Decode a logical A2S_PLAYER payload, keeping the server's order.
    pub fn parse_all(data: &[u8], engine: Engine) -> Result<Vec<Player>> {
        let mut offset = 0;
        let kind = get_u8(data, &mut offset)?;
        if kind != PacketType::PlayersResponse.to_byte() {
            return Err(SourceQueryError::DecodeError(
                DecodeReason::UnexpectedResponseType(kind),
            ));
        }

        let count = get_u8(data, &mut offset)?;
        let mut players = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            players.push(Player {
                index: get_u8(data, &mut offset)?,
                name: get_string(data, &mut offset)?,
                score: get_i32(data, &mut offset)?,
                duration: get_f32(data, &mut offset)?,
            });
        }

        if engine == Engine::GoldSource {
            check_goldsource_indices(&players)?;
        }
        Ok(players)
    }
}

/// GoldSource scrambles the index byte, so the values are neither sequential
/// nor meaningful. They still name distinct slots: a repeated non-zero index
/// means the record stream is misaligned.
fn check_goldsource_indices(players: &[Player]) -> Result<()> {
    let mut seen = HashSet::with_capacity(players.len());
    for player in players.iter().filter(|p| p.index != 0) {
        if !seen.insert(player.index) {
            return Err(SourceQueryError::DecodeError(
                DecodeReason::DuplicatePlayerIndex(player.index),
            ));
        }
    }
    Ok(())
}
