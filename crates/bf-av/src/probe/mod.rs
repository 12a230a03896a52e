//! Probe backends.

pub mod ffprobe;

pub use ffprobe::{parse_ffprobe_json, FfprobeProber};
