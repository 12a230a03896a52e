//! Encoding configuration types.
//!
//! The top-level [`EncodingConfig`] is deserialized from TOML. Every field is
//! optional and defaults to the behaviour of a high-quality archival x265
//! encode, so an empty file is valid. Unknown keys are rejected rather than
//! silently ignored.
//!
//! Fields that may be left to the planner use [`Setting`], which accepts the
//! literal string `"auto"` or a concrete value.

use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

use crate::error::Result;
use crate::media::{DolbyVisionProfile, HdrFormat};
use crate::Error;

// ---------------------------------------------------------------------------
// Setting
// ---------------------------------------------------------------------------

/// A configuration value that is either resolved by the planner or fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Setting<T> {
    #[default]
    Auto,
    Fixed(T),
}

impl<T> Setting<T> {
    /// The fixed value, if any.
    pub fn fixed(&self) -> Option<&T> {
        match self {
            Setting::Auto => None,
            Setting::Fixed(v) => Some(v),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Setting::Auto)
    }
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Setting::Auto => serializer.serialize_str("auto"),
            Setting::Fixed(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Setting<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Text(String),
            Value(T),
        }

        match Raw::<T>::deserialize(deserializer)? {
            Raw::Text(s) if s.eq_ignore_ascii_case("auto") => Ok(Setting::Auto),
            Raw::Text(s) => {
                T::deserialize(<String as IntoDeserializer<'de, D::Error>>::into_deserializer(s))
                    .map(Setting::Fixed)
            }
            Raw::Value(v) => Ok(Setting::Fixed(v)),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level EncodingConfig
// ---------------------------------------------------------------------------

/// Upper bound of the widest quality scale among supported encoders.
/// Per-encoder limits are checked when the plan is compiled.
pub const MAX_CRF: u32 = 100;

/// Root encoding configuration.
///
/// Scalar fields come before the nested tables so the struct serializes to
/// valid TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// ffmpeg encoder name, e.g. `libx265` or `hevc_nvenc`.
    pub video_codec: String,
    /// Encoder preset; `auto` picks the codec's archival default.
    pub video_preset: Setting<String>,
    /// Constant rate factor; `auto` picks the codec's default.
    pub video_crf: Setting<u32>,
    /// Encoder thread count; `auto` uses the number of logical CPUs.
    pub max_threads: Setting<u32>,
    /// GPU index for hardware encoders. Absent means "none" for CPU codecs
    /// and device 0 for GPU codecs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_device: Option<u32>,
    /// Stream-copy selected audio instead of transcoding it.
    pub copy_audio: bool,
    /// Include non-preferred subtitle languages when a preferred one is missing.
    pub copy_subtitles: bool,
    /// Language tags in preference order, most preferred first.
    pub preferred_languages: Vec<String>,
    /// Carry HDR metadata through to the output.
    pub preserve_hdr: bool,
    /// Always encode 10-bit, even from an 8-bit SDR source.
    pub force_10bit: bool,
    /// Copy chapter markers from the source.
    pub preserve_chapters: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<PathBuf>,
    pub hdr_settings: HdrSettings,
    pub locator: LocatorConfig,
    pub supervisor: SupervisorConfig,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            video_preset: Setting::Auto,
            video_crf: Setting::Auto,
            max_threads: Setting::Auto,
            gpu_device: None,
            copy_audio: true,
            copy_subtitles: true,
            preferred_languages: default_languages(),
            preserve_hdr: true,
            force_10bit: true,
            preserve_chapters: true,
            ffmpeg_path: None,
            ffprobe_path: None,
            hdr_settings: HdrSettings::default(),
            locator: LocatorConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl EncodingConfig {
    /// Deserialize an `EncodingConfig` from a TOML string.
    ///
    /// String-based so the caller decides how the file is found and read.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Render this configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("config render error: {e}")))
    }

    /// Reject values no plan could be built from.
    pub fn validate(&self) -> Result<()> {
        if self.video_codec.trim().is_empty() {
            return Err(Error::Config("video_codec must not be empty".into()));
        }
        if let Some(crf) = self.video_crf.fixed() {
            if *crf > MAX_CRF {
                return Err(Error::Config(format!("video_crf {crf} is outside 0..={MAX_CRF}")));
            }
        }
        if self.max_threads.fixed() == Some(&0) {
            return Err(Error::Config("max_threads must be at least 1".into()));
        }
        if self.hdr_settings.fallback_format == HdrFormat::Auto {
            return Err(Error::Config(
                "hdr_settings.fallback_format cannot be 'auto'".into(),
            ));
        }
        if !(self.supervisor.space_safety_factor >= 1.0) {
            return Err(Error::Config(format!(
                "supervisor.space_safety_factor {} must be >= 1.0",
                self.supervisor.space_safety_factor
            )));
        }
        Ok(())
    }

    /// Return a list of non-fatal issues worth telling the operator about.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.preferred_languages.is_empty() {
            warnings.push("preferred_languages is empty; defaulting to [\"eng\"]".into());
        }

        if !self.preserve_hdr && self.hdr_settings.preferred_format != HdrFormat::Auto {
            warnings.push(format!(
                "hdr_settings.preferred_format '{}' is ignored because preserve_hdr is false",
                self.hdr_settings.preferred_format
            ));
        }

        if !self.hdr_settings.dolby_vision_enabled
            && self.hdr_settings.preferred_format == HdrFormat::DolbyVision
        {
            warnings.push(
                "preferred_format is dolbyvision but dolby_vision_enabled is false; \
                 fallback_format will be used"
                    .into(),
            );
        }

        if self.locator.min_duration_secs == 0 {
            warnings.push(
                "locator.min_duration_secs is 0; menus and trailers will be considered".into(),
            );
        }

        warnings
    }

    /// Preferred languages, falling back to English when none are configured.
    pub fn languages(&self) -> Vec<String> {
        if self.preferred_languages.is_empty() {
            default_languages()
        } else {
            self.preferred_languages.clone()
        }
    }
}

fn default_video_codec() -> String {
    "libx265".into()
}

fn default_languages() -> Vec<String> {
    vec!["eng".into()]
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HDR preservation preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HdrSettings {
    pub preferred_format: HdrFormat,
    #[serde(default = "default_fallback_format")]
    pub fallback_format: HdrFormat,
    #[serde(default = "default_true")]
    pub dolby_vision_enabled: bool,
    /// Pin the expected Dolby Vision profile; a source with a different
    /// profile is not carried as Dolby Vision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dolby_vision_profile: Option<DolbyVisionProfile>,
}

fn default_fallback_format() -> HdrFormat {
    HdrFormat::Hdr10
}

fn default_true() -> bool {
    true
}

impl Default for HdrSettings {
    fn default() -> Self {
        Self {
            preferred_format: HdrFormat::Auto,
            fallback_format: default_fallback_format(),
            dolby_vision_enabled: true,
            dolby_vision_profile: None,
        }
    }
}

/// Main-feature detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocatorConfig {
    /// Playlists shorter than this are treated as menus, trailers or extras.
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u64,
    /// Ceiling on probing one candidate's segments.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_min_duration() -> u64 {
    300
}
fn default_probe_timeout() -> u64 {
    60
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: default_min_duration(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Encoder execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Replace an existing output file instead of failing.
    pub overwrite: bool,
    /// Multiplier applied to the estimated output size during preflight.
    #[serde(default = "default_safety_factor")]
    pub space_safety_factor: f64,
    /// Audio encoder used when `copy_audio` is false.
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    /// Minimum interval between progress updates.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
}

fn default_safety_factor() -> f64 {
    1.25
}
fn default_audio_codec() -> String {
    "aac".into()
}
fn default_progress_interval() -> u64 {
    1000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            space_safety_factor: default_safety_factor(),
            audio_codec: default_audio_codec(),
            progress_interval_ms: default_progress_interval(),
        }
    }
}
