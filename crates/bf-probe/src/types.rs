//! Core types for media probe results.

use std::path::PathBuf;
use std::time::Duration;

use bf_core::StreamKind;
use serde::{Deserialize, Serialize};

/// Immutable description of one media file's streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Path to the probed file.
    pub path: PathBuf,
    /// Container duration, if the tool reported one.
    pub duration: Option<Duration>,
    /// Streams in container order.
    pub streams: Vec<StreamInfo>,
}

impl MediaDescriptor {
    pub fn new(path: impl Into<PathBuf>, duration: Option<Duration>, streams: Vec<StreamInfo>) -> Self {
        Self {
            path: path.into(),
            duration,
            streams,
        }
    }

    /// Streams of one kind, in container order.
    pub fn streams_of(&self, kind: StreamKind) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(move |s| s.kind == kind)
    }

    /// The stream the encoder maps as video: the first default video stream,
    /// else the first video stream.
    pub fn primary_video(&self) -> Option<&StreamInfo> {
        self.streams_of(StreamKind::Video)
            .find(|s| s.disposition.default)
            .or_else(|| self.streams_of(StreamKind::Video).next())
    }

    pub fn audio_count(&self) -> usize {
        self.streams_of(StreamKind::Audio).count()
    }

    /// Number of distinct audio tracks, counting language + codec + channel
    /// layout once. Discs often repeat identical tracks across angles.
    pub fn distinct_audio_count(&self) -> usize {
        let mut seen = Vec::new();
        for s in self.streams_of(StreamKind::Audio) {
            let key = (s.language.clone(), s.codec.clone(), s.channels);
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        seen.len()
    }
}

/// One elementary stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Absolute stream index within the container.
    pub index: u32,
    pub kind: StreamKind,
    /// Codec name as reported by the probing tool (e.g. "hevc", "truehd").
    pub codec: String,
    /// Language tag; `None` when absent or undetermined.
    pub language: Option<String>,
    /// Free-form stream title.
    pub title: Option<String>,
    /// Audio channel count.
    pub channels: Option<u32>,
    /// Video width in pixels.
    pub width: Option<u32>,
    /// Video height in pixels.
    pub height: Option<u32>,
    /// Video bit depth (8, 10, 12).
    pub bit_depth: Option<u8>,
    /// Pixel format name (e.g. "yuv420p10le").
    pub pix_fmt: Option<String>,
    /// Colour description of a video stream.
    pub color: ColorInfo,
    /// HDR side data of a video stream.
    pub side_data: HdrSideData,
    pub disposition: Disposition,
}

impl StreamInfo {
    fn bare(index: u32, kind: StreamKind, codec: &str) -> Self {
        Self {
            index,
            kind,
            codec: codec.to_string(),
            language: None,
            title: None,
            channels: None,
            width: None,
            height: None,
            bit_depth: None,
            pix_fmt: None,
            color: ColorInfo::default(),
            side_data: HdrSideData::default(),
            disposition: Disposition::default(),
        }
    }

    pub fn video(index: u32, codec: &str, width: u32, height: u32, bit_depth: u8) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            bit_depth: Some(bit_depth),
            ..Self::bare(index, StreamKind::Video, codec)
        }
    }

    pub fn audio(index: u32, codec: &str, language: Option<&str>, channels: u32) -> Self {
        Self {
            language: language.map(str::to_string),
            channels: Some(channels),
            ..Self::bare(index, StreamKind::Audio, codec)
        }
    }

    pub fn subtitle(index: u32, codec: &str, language: Option<&str>) -> Self {
        Self {
            language: language.map(str::to_string),
            ..Self::bare(index, StreamKind::Subtitle, codec)
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_color(mut self, color: ColorInfo) -> Self {
        self.color = color;
        self
    }

    pub fn with_side_data(mut self, side_data: HdrSideData) -> Self {
        self.side_data = side_data;
        self
    }

    /// Commentary by disposition flag, or by a title that says so.
    pub fn is_commentary(&self) -> bool {
        self.disposition.commentary
            || self
                .title
                .as_deref()
                .is_some_and(|t| t.to_ascii_lowercase().contains("commentary"))
    }
}

/// Stream disposition flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    pub default: bool,
    pub forced: bool,
    pub commentary: bool,
}

/// Colour description of a video stream, using ffmpeg's names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorInfo {
    /// e.g. "bt2020"
    pub primaries: Option<String>,
    /// e.g. "smpte2084" (PQ) or "arib-std-b67" (HLG)
    pub transfer: Option<String>,
    /// e.g. "bt2020nc"
    pub matrix: Option<String>,
}

impl ColorInfo {
    pub fn is_pq(&self) -> bool {
        self.transfer.as_deref() == Some("smpte2084")
    }

    pub fn is_hlg(&self) -> bool {
        self.transfer.as_deref() == Some("arib-std-b67")
    }
}

/// HDR-related side data carried by a video stream or its first frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HdrSideData {
    /// Dolby Vision configuration record.
    pub dolby_vision: Option<DvConfig>,
    /// SMPTE ST 2086 mastering display colour volume.
    pub mastering_display: Option<MasteringDisplay>,
    /// CTA-861.3 content light level.
    pub content_light: Option<ContentLight>,
    /// SMPTE ST 2094-40 dynamic metadata seen.
    pub hdr10_plus: bool,
}

impl HdrSideData {
    pub fn is_empty(&self) -> bool {
        self.dolby_vision.is_none()
            && self.mastering_display.is_none()
            && self.content_light.is_none()
            && !self.hdr10_plus
    }

    /// Fill in whatever this value lacks from `other`.
    pub fn merge(&mut self, other: HdrSideData) {
        if self.dolby_vision.is_none() {
            self.dolby_vision = other.dolby_vision;
        }
        if self.mastering_display.is_none() {
            self.mastering_display = other.mastering_display;
        }
        if self.content_light.is_none() {
            self.content_light = other.content_light;
        }
        self.hdr10_plus |= other.hdr10_plus;
    }
}

/// Dolby Vision configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvConfig {
    /// Dolby Vision profile number (0-10).
    pub profile: u8,
    pub level: Option<u8>,
    /// Whether an RPU (Reference Processing Unit) is present.
    pub rpu_present: bool,
    /// Whether an enhancement layer is present.
    pub el_present: bool,
    /// Whether a base layer is present.
    pub bl_present: bool,
    /// Base-layer signal compatibility id (1 = HDR10, 2 = SDR, 4 = HLG).
    pub bl_compatibility_id: u8,
}

/// Mastering display colour volume in CIE 1931 xy and cd/m².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasteringDisplay {
    pub red: (f64, f64),
    pub green: (f64, f64),
    pub blue: (f64, f64),
    pub white_point: (f64, f64),
    pub min_luminance: f64,
    pub max_luminance: f64,
}

/// Content light level in cd/m².
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLight {
    /// MaxCLL
    pub max_content: u32,
    /// MaxFALL
    pub max_average: u32,
}
