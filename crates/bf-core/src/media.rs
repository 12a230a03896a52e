//! Media-domain enums shared by the probe, planning and execution crates.
//!
//! All enums serialize in lowercase and implement `Display` manually so log
//! lines and config files agree on spelling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// StreamKind
// ---------------------------------------------------------------------------

/// The kind of an elementary stream inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
        }
    }
}

// ---------------------------------------------------------------------------
// HdrFormat
// ---------------------------------------------------------------------------

/// HDR format names as they appear in configuration.
///
/// `Auto` is only meaningful as a preferred format; it means "whatever the
/// source carries at the highest fidelity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdrFormat {
    Auto,
    #[serde(alias = "dolby_vision", alias = "dv")]
    DolbyVision,
    #[serde(alias = "hdr10_plus", alias = "hdr10+")]
    Hdr10Plus,
    Hdr10,
    Hlg,
    None,
}

impl fmt::Display for HdrFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::DolbyVision => write!(f, "dolbyvision"),
            Self::Hdr10Plus => write!(f, "hdr10plus"),
            Self::Hdr10 => write!(f, "hdr10"),
            Self::Hlg => write!(f, "hlg"),
            Self::None => write!(f, "none"),
        }
    }
}

// ---------------------------------------------------------------------------
// DolbyVisionProfile
// ---------------------------------------------------------------------------

/// The Dolby Vision profiles this tool can carry through an encode.
///
/// Anything else (profile 7 dual-layer, 4, ...) has no variant here, so an
/// unsupported profile cannot end up in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DolbyVisionProfile {
    #[serde(rename = "5")]
    P5,
    #[serde(rename = "8.1")]
    P8_1,
    #[serde(rename = "8.2")]
    P8_2,
    #[serde(rename = "8.4")]
    P8_4,
}

impl DolbyVisionProfile {
    /// Map a profile number plus base-layer compatibility id to a supported
    /// profile.
    ///
    /// Returns `None` for profiles that cannot be preserved.
    pub fn from_parts(profile: u8, compatibility_id: u8) -> Option<Self> {
        match (profile, compatibility_id) {
            (5, _) => Some(Self::P5),
            (8, 1) => Some(Self::P8_1),
            (8, 2) => Some(Self::P8_2),
            (8, 4) => Some(Self::P8_4),
            _ => None,
        }
    }

    /// The value x265 expects for `dolby-vision-profile`.
    pub fn x265_value(&self) -> &'static str {
        match self {
            Self::P5 => "5",
            Self::P8_1 => "8.1",
            Self::P8_2 => "8.2",
            Self::P8_4 => "8.4",
        }
    }
}

impl fmt::Display for DolbyVisionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.x265_value())
    }
}

impl FromStr for DolbyVisionProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "5" => Ok(Self::P5),
            "8.1" => Ok(Self::P8_1),
            "8.2" => Ok(Self::P8_2),
            "8.4" => Ok(Self::P8_4),
            other => Err(format!("unsupported Dolby Vision profile '{other}'")),
        }
    }
}
