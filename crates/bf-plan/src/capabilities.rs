//! Static encoder capability table.
//!
//! The compiler consults this table to resolve `auto` settings and to reject
//! configurations that ask an encoder for something it cannot do.

use bf_core::{Error, HdrFormat, Result};

/// Argument dialect an encoder speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderFamily {
    X265,
    X264,
    SvtAv1,
    Nvenc,
    Qsv,
    VideoToolbox,
}

/// What a single ffmpeg video encoder supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCapabilities {
    pub name: &'static str,
    pub family: EncoderFamily,
    /// Accepts a `gpu_device` index. Hardware encoders that pick their
    /// device themselves (QSV, VideoToolbox) do not.
    pub gpu: bool,
    pub max_bit_depth: u8,
    pub hdr10: bool,
    pub hdr10_plus: bool,
    pub hlg: bool,
    pub dolby_vision: bool,
    /// `None` when the encoder has no preset knob.
    pub default_preset: Option<&'static str>,
    pub default_crf: u32,
    pub max_crf: u32,
}

impl EncoderCapabilities {
    /// Whether the encoder can carry `format` into its output.
    pub fn supports(&self, format: HdrFormat) -> bool {
        match format {
            HdrFormat::None | HdrFormat::Auto => true,
            HdrFormat::Hdr10 => self.hdr10,
            HdrFormat::Hdr10Plus => self.hdr10_plus,
            HdrFormat::Hlg => self.hlg,
            HdrFormat::DolbyVision => self.dolby_vision,
        }
    }
}

const fn cpu(
    name: &'static str,
    family: EncoderFamily,
    max_bit_depth: u8,
    hdr: (bool, bool, bool, bool),
    default_preset: &'static str,
    default_crf: u32,
    max_crf: u32,
) -> EncoderCapabilities {
    EncoderCapabilities {
        name,
        family,
        gpu: false,
        max_bit_depth,
        hdr10: hdr.0,
        hdr10_plus: hdr.1,
        hlg: hdr.2,
        dolby_vision: hdr.3,
        default_preset: Some(default_preset),
        default_crf,
        max_crf,
    }
}

/// Every encoder bdforge knows how to drive.
pub static ENCODERS: &[EncoderCapabilities] = &[
    cpu("libx265", EncoderFamily::X265, 10, (true, true, true, true), "veryslow", 14, 51),
    cpu("libx264", EncoderFamily::X264, 10, (false, false, true, false), "veryslow", 14, 51),
    cpu("libsvtav1", EncoderFamily::SvtAv1, 10, (true, false, true, false), "4", 24, 63),
    EncoderCapabilities {
        name: "hevc_nvenc",
        family: EncoderFamily::Nvenc,
        gpu: true,
        max_bit_depth: 10,
        hdr10: true,
        hdr10_plus: false,
        hlg: true,
        dolby_vision: false,
        default_preset: Some("p7"),
        default_crf: 19,
        max_crf: 51,
    },
    EncoderCapabilities {
        name: "h264_nvenc",
        family: EncoderFamily::Nvenc,
        gpu: true,
        max_bit_depth: 8,
        hdr10: false,
        hdr10_plus: false,
        hlg: false,
        dolby_vision: false,
        default_preset: Some("p7"),
        default_crf: 19,
        max_crf: 51,
    },
    EncoderCapabilities {
        name: "av1_nvenc",
        family: EncoderFamily::Nvenc,
        gpu: true,
        max_bit_depth: 10,
        hdr10: true,
        hdr10_plus: false,
        hlg: true,
        dolby_vision: false,
        default_preset: Some("p7"),
        default_crf: 19,
        max_crf: 51,
    },
    EncoderCapabilities {
        name: "hevc_qsv",
        family: EncoderFamily::Qsv,
        gpu: false,
        max_bit_depth: 10,
        hdr10: true,
        hdr10_plus: false,
        hlg: true,
        dolby_vision: false,
        default_preset: Some("veryslow"),
        default_crf: 19,
        max_crf: 51,
    },
    EncoderCapabilities {
        name: "hevc_videotoolbox",
        family: EncoderFamily::VideoToolbox,
        gpu: false,
        max_bit_depth: 10,
        hdr10: true,
        hdr10_plus: false,
        hlg: true,
        dolby_vision: false,
        default_preset: None,
        default_crf: 19,
        max_crf: 100,
    },
];

/// Look up an encoder by its ffmpeg name.
pub fn lookup(codec: &str) -> Result<&'static EncoderCapabilities> {
    ENCODERS.iter().find(|e| e.name == codec).ok_or_else(|| {
        let known: Vec<&str> = ENCODERS.iter().map(|e| e.name).collect();
        Error::conflict(
            "video_codec",
            format!("unknown encoder '{codec}' (supported: {})", known.join(", ")),
        )
    })
}
