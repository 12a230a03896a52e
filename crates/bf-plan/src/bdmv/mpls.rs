//! Parser for Blu-ray movie playlist (`.mpls`) files.
//!
//! Only the main path is read: the ordered list of PlayItems, each naming one
//! clip and the IN/OUT presentation times used from it. Sub-paths (PiP,
//! secondary audio) and the playlist mark table are skipped.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! 0   "MPLS"            type indicator
//! 4   "0100"|"0200"|..  version
//! 8   u32               PlayList start address
//! PlayList:
//! +0  u32               length
//! +4  u16               reserved
//! +6  u16               number of PlayItems
//! +8  u16               number of SubPaths
//! +10 PlayItem[]
//! PlayItem:
//! +0  u16               length (excluding this field)
//! +2  [u8; 5]           clip information file name ("00800")
//! +7  [u8; 4]           codec identifier ("M2TS")
//! +11 u16               flags (multi-angle, connection condition)
//! +13 u8                ref_to_STC_id
//! +14 u32               IN_time  (45 kHz)
//! +18 u32               OUT_time (45 kHz)
//! ```

use std::time::Duration;

/// Presentation timestamps in playlists tick at 45 kHz.
pub const TICKS_PER_SECOND: u64 = 45_000;

const PLAY_ITEM_MIN_LEN: usize = 22;

/// Reasons a playlist file could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MplsError {
    #[error("not an MPLS file (bad type indicator)")]
    BadMagic,
    #[error("truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("PlayItem {item} has a non-ASCII clip name")]
    BadClipName { item: usize },
    #[error("playlist has no PlayItems")]
    Empty,
}

/// One reference from a playlist into a clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayItem {
    /// Five-digit clip identifier, e.g. "00800".
    pub clip_id: String,
    /// Stream container identifier, normally "M2TS".
    pub codec_id: String,
    pub in_time: u32,
    pub out_time: u32,
}

impl PlayItem {
    /// Presented span of the clip. Zero when OUT precedes IN.
    pub fn duration(&self) -> Duration {
        let ticks = u64::from(self.out_time.saturating_sub(self.in_time));
        Duration::from_micros(ticks * 1_000_000 / TICKS_PER_SECOND)
    }
}

/// Parse the PlayItems of the main path.
pub fn parse(bytes: &[u8]) -> Result<Vec<PlayItem>, MplsError> {
    if bytes.len() < 12 {
        return Err(MplsError::Truncated { offset: bytes.len() });
    }
    if &bytes[0..4] != b"MPLS" {
        return Err(MplsError::BadMagic);
    }

    let playlist_start = read_u32(bytes, 8)? as usize;
    let item_count = read_u16(bytes, playlist_start + 6)? as usize;
    if item_count == 0 {
        return Err(MplsError::Empty);
    }

    let mut items = Vec::with_capacity(item_count);
    let mut offset = playlist_start + 10;

    for item in 0..item_count {
        let len = read_u16(bytes, offset)? as usize;
        if len + 2 < PLAY_ITEM_MIN_LEN || offset + 2 + len > bytes.len() {
            return Err(MplsError::Truncated { offset });
        }

        let clip_id = ascii(&bytes[offset + 2..offset + 7]).ok_or(MplsError::BadClipName { item })?;
        let codec_id = ascii(&bytes[offset + 7..offset + 11]).unwrap_or_default();
        let in_time = read_u32(bytes, offset + 14)?;
        let out_time = read_u32(bytes, offset + 18)?;

        items.push(PlayItem {
            clip_id,
            codec_id,
            in_time,
            out_time,
        });
        offset += 2 + len;
    }

    Ok(items)
}

fn ascii(raw: &[u8]) -> Option<String> {
    raw.is_ascii()
        .then(|| String::from_utf8_lossy(raw).to_string())
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, MplsError> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(MplsError::Truncated { offset })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, MplsError> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(MplsError::Truncated { offset })
}

/// Serialize a minimal playlist. Only used to build fixtures in tests.
#[cfg(test)]
pub(crate) fn build(items: &[(&str, u32, u32)]) -> Vec<u8> {
    let playlist_start: u32 = 58;
    let mut out = Vec::new();
    out.extend_from_slice(b"MPLS0200");
    out.extend_from_slice(&playlist_start.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // mark table address
    out.extend_from_slice(&0u32.to_be_bytes()); // extension data address
    out.resize(playlist_start as usize, 0);

    let mut body = Vec::new();
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&(items.len() as u16).to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    for (clip, in_time, out_time) in items {
        let mut item = Vec::new();
        item.extend_from_slice(clip.as_bytes());
        item.extend_from_slice(b"M2TS");
        item.extend_from_slice(&[0x00, 0x01]); // connection condition 1
        item.push(0); // STC id
        item.extend_from_slice(&in_time.to_be_bytes());
        item.extend_from_slice(&out_time.to_be_bytes());
        item.extend_from_slice(&[0u8; 12]); // UO mask + still info
        body.extend_from_slice(&(item.len() as u16).to_be_bytes());
        body.extend_from_slice(&item);
    }
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}
