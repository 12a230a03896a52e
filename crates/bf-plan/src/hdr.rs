//! HDR classification and target resolution.
//!
//! [`detect`] turns the primary video stream's side data and colour tags into
//! exactly one [`HdrProfile`]. [`resolve`] then walks the configured
//! preferred and fallback formats against the encoder capability table and
//! settles on the profile the encode will carry. Neither step fails: anything
//! ambiguous or unsupported degrades to a safer profile with a warning.

use bf_core::config::HdrSettings;
use bf_core::{DolbyVisionProfile, HdrFormat};
use bf_probe::{ContentLight, HdrSideData, MasteringDisplay, StreamInfo};
use serde::Serialize;

use crate::capabilities::EncoderCapabilities;

/// SMPTE ST 2086 / CTA-861.3 static metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StaticMetadata {
    pub mastering: Option<MasteringDisplay>,
    pub content_light: Option<ContentLight>,
}

impl StaticMetadata {
    pub fn from_side_data(side_data: &HdrSideData) -> Self {
        Self {
            mastering: side_data.mastering_display,
            content_light: side_data.content_light,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mastering.is_none() && self.content_light.is_none()
    }
}

/// The HDR mode of a stream. Exactly one variant applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum HdrProfile {
    #[default]
    None,
    Hdr10(StaticMetadata),
    Hdr10Plus {
        dynamic_metadata: bool,
        static_metadata: StaticMetadata,
    },
    Hlg,
    DolbyVision {
        profile: DolbyVisionProfile,
        rpu_present: bool,
        static_metadata: StaticMetadata,
    },
}

impl HdrProfile {
    pub fn format(&self) -> HdrFormat {
        match self {
            Self::None => HdrFormat::None,
            Self::Hdr10(_) => HdrFormat::Hdr10,
            Self::Hdr10Plus { .. } => HdrFormat::Hdr10Plus,
            Self::Hlg => HdrFormat::Hlg,
            Self::DolbyVision { .. } => HdrFormat::DolbyVision,
        }
    }

    pub fn is_hdr(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn static_metadata(&self) -> Option<&StaticMetadata> {
        match self {
            Self::Hdr10(meta) => Some(meta),
            Self::Hdr10Plus { static_metadata, .. } | Self::DolbyVision { static_metadata, .. } => {
                Some(static_metadata)
            }
            Self::None | Self::Hlg => None,
        }
    }
}

/// Classify a video stream.
///
/// Returns the detected profile plus any warnings about metadata that could
/// not be carried as-is.
pub fn detect(video: &StreamInfo) -> (HdrProfile, Vec<String>) {
    let side = &video.side_data;
    let static_metadata = StaticMetadata::from_side_data(side);
    let mut warnings = Vec::new();

    if let Some(dv) = side.dolby_vision {
        match DolbyVisionProfile::from_parts(dv.profile, dv.bl_compatibility_id) {
            Some(profile) => {
                return (
                    HdrProfile::DolbyVision {
                        profile,
                        rpu_present: dv.rpu_present,
                        static_metadata,
                    },
                    warnings,
                );
            }
            None => {
                let degraded = if !static_metadata.is_empty() {
                    HdrProfile::Hdr10(static_metadata)
                } else if video.color.is_hlg() {
                    HdrProfile::Hlg
                } else {
                    HdrProfile::None
                };
                warnings.push(format!(
                    "Dolby Vision profile {} (compatibility id {}) cannot be preserved; using {}",
                    dv.profile,
                    dv.bl_compatibility_id,
                    degraded.format()
                ));
                return (degraded, warnings);
            }
        }
    }

    if side.hdr10_plus {
        return (
            HdrProfile::Hdr10Plus {
                dynamic_metadata: true,
                static_metadata,
            },
            warnings,
        );
    }

    if !static_metadata.is_empty() || video.color.is_pq() {
        if static_metadata.mastering.is_none() {
            warnings.push("PQ stream without mastering display metadata; HDR10 signalled without master-display".into());
        }
        return (HdrProfile::Hdr10(static_metadata), warnings);
    }

    if video.color.is_hlg() {
        return (HdrProfile::Hlg, warnings);
    }

    (HdrProfile::None, warnings)
}

/// Outcome of HDR resolution for one encode.
#[derive(Debug, Clone, PartialEq)]
pub struct HdrResolution {
    pub detected: HdrProfile,
    pub target: HdrProfile,
    pub ten_bit: bool,
    /// An 8-bit source must be converted up to the 10-bit output format.
    pub pixel_format_conversion: bool,
    pub warnings: Vec<String>,
}

/// Pick the HDR profile the encode will carry.
///
/// Candidates are tried in order: `preferred_format` (`auto` means whatever
/// was detected), then `fallback_format`, then none. Each failed candidate
/// adds one warning.
pub fn resolve(
    video: Option<&StreamInfo>,
    settings: &HdrSettings,
    preserve_hdr: bool,
    force_10bit: bool,
    caps: &EncoderCapabilities,
) -> HdrResolution {
    let (detected, mut warnings) = match video {
        Some(v) => detect(v),
        None => (HdrProfile::None, Vec::new()),
    };

    let ten_bit = force_10bit || detected.is_hdr();
    let pixel_format_conversion = ten_bit && matches!(video.and_then(|v| v.bit_depth), Some(d) if d < 10);

    let target = if preserve_hdr {
        let source = SourceTraits {
            detected: &detected,
            pq: video.is_some_and(|v| v.color.is_pq()),
            hlg: video.is_some_and(|v| v.color.is_hlg()),
        };
        choose_target(&source, settings, caps, &mut warnings)
    } else {
        warnings.clear();
        HdrProfile::None
    };

    if target.format() != detected.format() {
        tracing::info!("HDR: source {} encoded as {}", detected.format(), target.format());
    }

    HdrResolution {
        detected,
        target,
        ten_bit,
        pixel_format_conversion,
        warnings,
    }
}

struct SourceTraits<'a> {
    detected: &'a HdrProfile,
    pq: bool,
    hlg: bool,
}

fn choose_target(
    source: &SourceTraits<'_>,
    settings: &HdrSettings,
    caps: &EncoderCapabilities,
    warnings: &mut Vec<String>,
) -> HdrProfile {
    let preferred = match settings.preferred_format {
        HdrFormat::Auto => source.detected.format(),
        other => other,
    };
    let fallback = match settings.fallback_format {
        HdrFormat::Auto => HdrFormat::None,
        other => other,
    };

    let mut candidates = vec![("preferred", preferred)];
    if fallback != preferred {
        candidates.push(("fallback", fallback));
    }

    for (i, (role, format)) in candidates.iter().enumerate() {
        match try_target(*format, source, settings, caps) {
            Ok(profile) => return profile,
            Err(reason) => {
                let next = candidates
                    .get(i + 1)
                    .map(|(_, f)| f.to_string())
                    .unwrap_or_else(|| "none".into());
                tracing::debug!("HDR {format} ({role}) unavailable: {reason}");
                warnings.push(format!(
                    "{format} ({role}) unavailable: {reason}; falling back to {next}"
                ));
            }
        }
    }

    if source.detected.is_hdr() {
        warnings.push(format!(
            "source is {} but no configured HDR format can be carried; output will be SDR",
            source.detected.format()
        ));
    }
    HdrProfile::None
}

fn try_target(
    format: HdrFormat,
    source: &SourceTraits<'_>,
    settings: &HdrSettings,
    caps: &EncoderCapabilities,
) -> Result<HdrProfile, String> {
    let detected = source.detected;

    let profile = match format {
        HdrFormat::None | HdrFormat::Auto => return Ok(HdrProfile::None),
        HdrFormat::DolbyVision => {
            if !settings.dolby_vision_enabled {
                return Err("dolby_vision_enabled is false".into());
            }
            let HdrProfile::DolbyVision { profile, .. } = detected else {
                return Err("source carries no Dolby Vision metadata".into());
            };
            if let Some(pinned) = settings.dolby_vision_profile {
                if pinned != *profile {
                    return Err(format!(
                        "source is Dolby Vision profile {profile}, configured profile is {pinned}"
                    ));
                }
            }
            detected.clone()
        }
        HdrFormat::Hdr10Plus => match detected {
            HdrProfile::Hdr10Plus { .. } => detected.clone(),
            _ => return Err("source carries no HDR10+ dynamic metadata".into()),
        },
        HdrFormat::Hdr10 => match detected {
            HdrProfile::Hdr10(_) => detected.clone(),
            HdrProfile::Hdr10Plus { static_metadata, .. }
            | HdrProfile::DolbyVision { static_metadata, .. }
                if !static_metadata.is_empty() || source.pq =>
            {
                HdrProfile::Hdr10(static_metadata.clone())
            }
            _ => return Err("source carries no HDR10 static metadata or PQ transfer".into()),
        },
        HdrFormat::Hlg => {
            let dv_hlg = matches!(
                detected,
                HdrProfile::DolbyVision {
                    profile: DolbyVisionProfile::P8_4,
                    ..
                }
            );
            if !(source.hlg || dv_hlg || *detected == HdrProfile::Hlg) {
                return Err("source has no HLG transfer".into());
            }
            HdrProfile::Hlg
        }
    };

    if !caps.supports(format) {
        return Err(format!("{} cannot carry {format}", caps.name));
    }
    Ok(profile)
}
