//! Split response handling.
//!
//! Responses that do not fit in one datagram arrive as fragments sharing a
//! fragmentation ID. Source servers may additionally bzip2 the whole response
//! before splitting it, in which case fragment 0 carries the decompressed size
//! and a CRC32 of the decompressed bytes.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read};

use bzip2::read::BzDecoder;
use log::{debug, trace};

use crate::config::Engine;
use crate::error::{Result, SourceQueryError};
use crate::packet::PacketHeader;
use crate::parse::{get_u16, get_u32, get_u8};

const COMPRESSED_FLAG: u32 = 0x8000_0000;

/// Largest decompressed size a compressed response may advertise.
pub const MAX_DECOMPRESSED_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression {
    pub decompressed_size: u32,
    pub crc32: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub id: u32,
    pub total: u8,
    pub index: u8,
    /// Maximum fragment size the server splits at. Source only.
    pub size: Option<u16>,
    /// Present on fragment 0 of a compressed response.
    pub compression: Option<Compression>,
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Parse the body of a split datagram, i.e. everything after the `-2` header.
    pub fn parse(body: &[u8], engine: Engine) -> Result<Self> {
        let malformed =
            |_: SourceQueryError| SourceQueryError::MalformedPacket("truncated split header".into());
        let mut offset = 0;
        let id = get_u32(body, &mut offset).map_err(malformed)?;

        let (total, index, size, compression) = match engine {
            Engine::Source => {
                let total = get_u8(body, &mut offset).map_err(malformed)?;
                let index = get_u8(body, &mut offset).map_err(malformed)?;
                let size = get_u16(body, &mut offset).map_err(malformed)?;
                let compression = if id & COMPRESSED_FLAG != 0 && index == 0 {
                    Some(Compression {
                        decompressed_size: get_u32(body, &mut offset).map_err(malformed)?,
                        crc32: get_u32(body, &mut offset).map_err(malformed)?,
                    })
                } else {
                    None
                };
                (total, index, Some(size), compression)
            }
            Engine::GoldSource => {
                // high nibble is the index, low nibble the total
                let packed = get_u8(body, &mut offset).map_err(malformed)?;
                (packed & 0x0f, packed >> 4, None, None)
            }
        };

        if total == 0 || index >= total {
            return Err(SourceQueryError::MalformedPacket(format!(
                "fragment {index} of {total} is out of range"
            )));
        }

        Ok(Fragment {
            id,
            total,
            index,
            size,
            compression,
            payload: body[offset..].to_vec(),
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.id & COMPRESSED_FLAG != 0
    }
}

#[derive(Debug)]
struct Partial {
    total: u8,
    compressed: bool,
    compression: Option<Compression>,
    parts: BTreeMap<u8, Vec<u8>>,
}

/// Collects fragments until one fragmentation ID is complete.
///
/// Fragments are keyed by their index, so arrival order does not matter and a
/// repeated index replaces the earlier copy. Incomplete IDs live as long as the
/// reassembler; the query engine uses a fresh one for every logical payload it
/// waits for, so a challenge reply and the answer that follows it never share
/// one.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: HashMap<u32, Partial>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fragmentation IDs still waiting for fragments.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Add a fragment. Returns the logical payload once its ID is complete.
    pub fn push(&mut self, fragment: Fragment) -> Result<Option<Vec<u8>>> {
        let partial = self.pending.entry(fragment.id).or_insert_with(|| Partial {
            total: fragment.total,
            compressed: fragment.is_compressed(),
            compression: None,
            parts: BTreeMap::new(),
        });

        if partial.total != fragment.total {
            return Err(SourceQueryError::MalformedPacket(format!(
                "fragment {} of id {:#x} claims {} fragments, expected {}",
                fragment.index, fragment.id, fragment.total, partial.total
            )));
        }
        if fragment.compression.is_some() {
            partial.compression = fragment.compression;
        }
        if partial.parts.insert(fragment.index, fragment.payload).is_some() {
            debug!("duplicate fragment {} for id {:#x}", fragment.index, fragment.id);
        }
        trace!(
            "fragment {}/{} for id {:#x}",
            partial.parts.len(),
            partial.total,
            fragment.id
        );

        if partial.parts.len() < usize::from(partial.total) {
            return Ok(None);
        }

        let Some(partial) = self.pending.remove(&fragment.id) else {
            return Ok(None);
        };
        let joined: Vec<u8> = partial.parts.into_values().flatten().collect();

        let packet = if partial.compressed {
            let compression = partial.compression.ok_or_else(|| {
                SourceQueryError::MalformedPacket(
                    "compressed response without size and checksum".into(),
                )
            })?;
            decompress(&joined, compression)?
        } else {
            joined
        };

        strip_single_header(packet).map(Some)
    }
}

/// A reassembled response is itself a single packet; drop its header.
fn strip_single_header(packet: Vec<u8>) -> Result<Vec<u8>> {
    if packet.len() < 4 {
        return Err(SourceQueryError::MalformedPacket(
            "reassembled response is shorter than a packet header".into(),
        ));
    }
    let header = i32::from_le_bytes([packet[0], packet[1], packet[2], packet[3]]);
    match PacketHeader::try_from(header)? {
        PacketHeader::Single => Ok(packet[4..].to_vec()),
        PacketHeader::Split => Err(SourceQueryError::MalformedPacket(
            "reassembled response is itself split".into(),
        )),
    }
}

/// Inflate a bzip2 response and check it against the advertised size and CRC32.
pub fn decompress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    if compression.decompressed_size > MAX_DECOMPRESSED_SIZE {
        return Err(SourceQueryError::DecompressionError(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "advertised size of {} bytes exceeds {MAX_DECOMPRESSED_SIZE}",
                compression.decompressed_size
            ),
        )));
    }
    let limit = u64::from(compression.decompressed_size) + 1;
    let mut out = Vec::new();
    BzDecoder::new(data)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(SourceQueryError::DecompressionError)?;

    if out.len() != compression.decompressed_size as usize {
        return Err(SourceQueryError::DecompressionError(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "decompressed {} bytes, expected {}",
                out.len(),
                compression.decompressed_size
            ),
        )));
    }

    let actual = crc32fast::hash(&out);
    if actual != compression.crc32 {
        return Err(SourceQueryError::ChecksumMismatch {
            expected: compression.crc32,
            actual,
        });
    }
    Ok(out)
}
