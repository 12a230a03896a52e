//! The fully resolved encode plan.

use std::path::PathBuf;
use std::time::Duration;

use bf_probe::MediaDescriptor;
use serde::Serialize;

use crate::hdr::HdrProfile;
use crate::tracks::TrackSelection;

/// What ffmpeg reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Single(PathBuf),
    /// Transport stream segments joined at byte level, in playlist order.
    Concat(Vec<PathBuf>),
}

impl InputSource {
    pub fn from_segments(mut paths: Vec<PathBuf>) -> Self {
        if paths.len() == 1 {
            Self::Single(paths.remove(0))
        } else {
            Self::Concat(paths)
        }
    }

    /// The `-i` argument.
    pub fn to_ffmpeg_input(&self) -> String {
        match self {
            Self::Single(path) => path.display().to_string(),
            Self::Concat(paths) => {
                let joined: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                format!("concat:{}", joined.join("|"))
            }
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            Self::Single(path) => vec![path.clone()],
            Self::Concat(paths) => paths.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AudioMode {
    Copy,
    Transcode { codec: String },
}

/// Concrete video encoder settings. Nothing here is `auto`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoParams {
    pub codec: String,
    pub preset: Option<String>,
    pub crf: u32,
    pub threads: u32,
    pub gpu_device: Option<u32>,
    pub bit_depth: u8,
    pub pixel_format: String,
    pub pixel_format_conversion: bool,
    /// Source index of the video stream to encode.
    pub stream_index: u32,
    /// Encoder-specific arguments placed after `-c:v <codec>`.
    pub args: Vec<String>,
}

/// Everything the execution supervisor needs, fully resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodePlan {
    pub feature_id: String,
    pub input: InputSource,
    pub output: PathBuf,
    pub descriptor: MediaDescriptor,
    pub duration: Duration,
    pub hdr: HdrProfile,
    pub tracks: TrackSelection,
    pub video: VideoParams,
    pub audio: AudioMode,
    pub preserve_chapters: bool,
    pub overwrite: bool,
    /// Warnings gathered while analysing and compiling.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment_is_plain_path() {
        let input = InputSource::from_segments(vec![PathBuf::from("/d/BDMV/STREAM/00800.m2ts")]);
        assert_eq!(input, InputSource::Single(PathBuf::from("/d/BDMV/STREAM/00800.m2ts")));
        assert_eq!(input.to_ffmpeg_input(), "/d/BDMV/STREAM/00800.m2ts");
    }

    #[test]
    fn segments_use_concat_protocol_in_order() {
        let input = InputSource::from_segments(vec![
            PathBuf::from("/d/00011.m2ts"),
            PathBuf::from("/d/00010.m2ts"),
        ]);
        assert_eq!(input.to_ffmpeg_input(), "concat:/d/00011.m2ts|/d/00010.m2ts");
        assert_eq!(input.paths().len(), 2);
    }
}
