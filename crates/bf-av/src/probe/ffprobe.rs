//! FFprobe-based [`bf_probe::Prober`] implementation.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into a [`MediaDescriptor`]. Blu-ray transport
//! streams often carry HDR mastering metadata only in frame side data, so when
//! the primary video stream reports none a second call inspects the first
//! video frame and merges what it finds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bf_core::StreamKind;
use bf_probe::types::{
    ColorInfo, ContentLight, Disposition, DvConfig, HdrSideData, MasteringDisplay,
    MediaDescriptor, StreamInfo,
};
use bf_probe::Prober;
use serde::Deserialize;

use crate::command::ToolCommand;

/// Per-call ffprobe timeout. The locator applies its own ceiling on top.
const PROBE_TIMEOUT: Duration = Duration::from_secs(120);

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Create a prober that finds ffprobe on `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("ffprobe").ok().map(Self::new)
    }

    async fn run(&self, path: &Path, extra: &[&str]) -> bf_core::Result<String> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args(["-v", "quiet", "-print_format", "json"])
            .args(extra.iter().copied())
            .arg(path.to_string_lossy())
            .timeout(PROBE_TIMEOUT);
        tracing::debug!("Running {}", cmd.display());

        cmd.execute()
            .await
            .map(|out| out.stdout)
            .map_err(|e| bf_core::Error::probe(path, e.to_string()))
    }

    /// Side data from the first decoded video frame.
    async fn first_frame_side_data(&self, path: &Path) -> bf_core::Result<HdrSideData> {
        let json = self
            .run(
                path,
                &["-select_streams", "v:0", "-show_frames", "-read_intervals", "%+#1"],
            )
            .await?;
        let frames: FfprobeFrames = serde_json::from_str(&json)
            .map_err(|e| bf_core::Error::probe(path, format!("ffprobe frame JSON parse error: {e}")))?;

        let mut side_data = HdrSideData::default();
        if let Some(frame) = frames.frames.into_iter().next() {
            side_data.merge(parse_side_data(&frame.side_data_list));
        }
        Ok(side_data)
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> bf_core::Result<MediaDescriptor> {
        let json = self.run(path, &["-show_format", "-show_streams"]).await?;
        let mut descriptor = parse_ffprobe_json(path, &json)?;

        // PQ without any stream-level side data: look at the first frame.
        let video_pos = descriptor
            .streams
            .iter()
            .position(|s| s.kind == StreamKind::Video && s.side_data.is_empty() && s.color.is_pq());

        if let Some(pos) = video_pos {
            match self.first_frame_side_data(path).await {
                Ok(frame_side_data) => descriptor.streams[pos].side_data.merge(frame_side_data),
                Err(e) => tracing::debug!("Frame side data unavailable for {}: {e}", path.display()),
            }
        }

        Ok(descriptor)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bits_per_raw_sample: Option<String>,
    pix_fmt: Option<String>,
    channels: Option<u32>,
    color_primaries: Option<String>,
    color_transfer: Option<String>,
    color_space: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    tags: FfprobeTags,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    default: u8,
    #[serde(default)]
    forced: u8,
    #[serde(default)]
    comment: u8,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeSideData {
    side_data_type: Option<String>,
    // DOVI configuration record
    dv_profile: Option<u8>,
    dv_level: Option<u8>,
    rpu_present_flag: Option<u8>,
    el_present_flag: Option<u8>,
    bl_present_flag: Option<u8>,
    dv_bl_signal_compatibility_id: Option<u8>,
    // Mastering display metadata
    red_x: Option<String>,
    red_y: Option<String>,
    green_x: Option<String>,
    green_y: Option<String>,
    blue_x: Option<String>,
    blue_y: Option<String>,
    white_point_x: Option<String>,
    white_point_y: Option<String>,
    min_luminance: Option<String>,
    max_luminance: Option<String>,
    // Content light level metadata
    max_content: Option<u32>,
    max_average: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFrames {
    #[serde(default)]
    frames: Vec<FfprobeFrame>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFrame {
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse the JSON printed by `ffprobe -show_format -show_streams`.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> bf_core::Result<MediaDescriptor> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| bf_core::Error::probe(path, format!("ffprobe JSON parse error: {e}")))?;

    let duration = output
        .format
        .duration
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64);

    let streams = output.streams.into_iter().filter_map(map_stream).collect();

    Ok(MediaDescriptor::new(path, duration, streams))
}

fn map_stream(stream: FfprobeStream) -> Option<StreamInfo> {
    let kind = match stream.codec_type.as_deref()? {
        "video" => StreamKind::Video,
        "audio" => StreamKind::Audio,
        "subtitle" => StreamKind::Subtitle,
        _ => return None,
    };

    let bit_depth = stream
        .bits_per_raw_sample
        .as_deref()
        .and_then(|s| s.parse::<u8>().ok())
        .or_else(|| stream.pix_fmt.as_deref().map(bit_depth_from_pix_fmt));

    Some(StreamInfo {
        index: stream.index,
        kind,
        codec: stream.codec_name.unwrap_or_else(|| "unknown".into()),
        language: normalize_language_tag(stream.tags.language),
        title: stream.tags.title,
        channels: stream.channels,
        width: stream.width,
        height: stream.height,
        bit_depth: if kind == StreamKind::Video { bit_depth } else { None },
        pix_fmt: stream.pix_fmt,
        color: ColorInfo {
            primaries: stream.color_primaries,
            transfer: stream.color_transfer,
            matrix: stream.color_space,
        },
        side_data: parse_side_data(&stream.side_data_list),
        disposition: Disposition {
            default: stream.disposition.default == 1,
            forced: stream.disposition.forced == 1,
            commentary: stream.disposition.comment == 1,
        },
    })
}

/// `und` and empty tags carry no information.
fn normalize_language_tag(tag: Option<String>) -> Option<String> {
    tag.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("und"))
}

fn bit_depth_from_pix_fmt(pix_fmt: &str) -> u8 {
    if pix_fmt.contains("12") {
        12
    } else if pix_fmt.contains("10") {
        10
    } else {
        8
    }
}

fn parse_side_data(list: &[FfprobeSideData]) -> HdrSideData {
    let mut out = HdrSideData::default();

    for sd in list {
        match sd.side_data_type.as_deref().unwrap_or("") {
            "DOVI configuration record" => {
                out.dolby_vision = Some(DvConfig {
                    profile: sd.dv_profile.unwrap_or(0),
                    level: sd.dv_level,
                    rpu_present: sd.rpu_present_flag == Some(1),
                    el_present: sd.el_present_flag == Some(1),
                    bl_present: sd.bl_present_flag == Some(1),
                    bl_compatibility_id: sd.dv_bl_signal_compatibility_id.unwrap_or(0),
                });
            }
            "Mastering display metadata" => {
                out.mastering_display = parse_mastering_display(sd);
            }
            "Content light level metadata" => {
                if let (Some(max_content), Some(max_average)) = (sd.max_content, sd.max_average) {
                    out.content_light = Some(ContentLight {
                        max_content,
                        max_average,
                    });
                }
            }
            t if t.contains("SMPTE2094-40") || t.contains("HDR10+") => {
                out.hdr10_plus = true;
            }
            _ => {}
        }
    }

    out
}

/// All ten values must be present; a partial record is ignored.
fn parse_mastering_display(sd: &FfprobeSideData) -> Option<MasteringDisplay> {
    let r = |v: &Option<String>| v.as_deref().and_then(parse_rational);
    Some(MasteringDisplay {
        red: (r(&sd.red_x)?, r(&sd.red_y)?),
        green: (r(&sd.green_x)?, r(&sd.green_y)?),
        blue: (r(&sd.blue_x)?, r(&sd.blue_y)?),
        white_point: (r(&sd.white_point_x)?, r(&sd.white_point_y)?),
        min_luminance: r(&sd.min_luminance)?,
        max_luminance: r(&sd.max_luminance)?,
    })
}

/// Parse "34000/50000" or a plain number.
fn parse_rational(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => s.trim().parse().ok(),
    }
}
