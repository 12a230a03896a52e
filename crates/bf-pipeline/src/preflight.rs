//! Checks run before the encoder starts.

use std::path::{Path, PathBuf};

use bf_core::config::SupervisorConfig;
use bf_core::{Error, Result};
use bf_plan::EncodePlan;

/// Video bitrate assumed at CRF 14.
const BASE_VIDEO_BPS: f64 = 40_000_000.0;
/// CRF steps that halve the bitrate.
const CRF_HALVING_STEP: f64 = 6.0;
/// Flat allowance for copied audio and subtitles.
const AUDIO_BPS: f64 = 1_500_000.0;

/// What preflight found.
#[derive(Debug, Clone, PartialEq)]
pub struct PreflightReport {
    pub output_dir: PathBuf,
    pub required_bytes: u64,
    /// `None` when free space cannot be queried on this platform.
    pub available_bytes: Option<u64>,
    pub warnings: Vec<String>,
}

/// Slower presets compress slightly better.
pub fn preset_factor(preset: Option<&str>) -> f64 {
    match preset {
        Some("placebo" | "veryslow") => 0.9,
        Some("slower") => 0.95,
        Some("medium") => 1.05,
        Some("fast" | "faster") => 1.1,
        Some("veryfast" | "superfast" | "ultrafast") => 1.2,
        _ => 1.0,
    }
}

/// Estimated output size in bytes, before the safety factor.
pub fn estimate_output_bytes(plan: &EncodePlan) -> u64 {
    let crf = f64::from(plan.video.crf);
    let video_bps = BASE_VIDEO_BPS
        * 0.5_f64.powf((crf - 14.0) / CRF_HALVING_STEP)
        * preset_factor(plan.video.preset.as_deref());
    let audio_bps = if plan.tracks.audio.is_empty() && plan.tracks.subtitles.is_empty() {
        0.0
    } else {
        AUDIO_BPS
    };
    let bytes = plan.duration.as_secs_f64() * (video_bps + audio_bps) / 8.0;
    bytes.round() as u64
}

/// Make sure the output directory exists, is writable, and has room.
///
/// # Errors
///
/// - [`Error::Io`] when the directory cannot be created or written.
/// - [`Error::InsufficientSpace`] when the estimate exceeds free space.
pub fn check(plan: &EncodePlan, config: &SupervisorConfig) -> Result<PreflightReport> {
    let output_dir = plan
        .output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    std::fs::create_dir_all(&output_dir).map_err(|e| Error::io(&output_dir, e))?;
    check_writable(&output_dir)?;

    let required_bytes =
        (estimate_output_bytes(plan) as f64 * config.space_safety_factor).round() as u64;
    let available_bytes = bf_av::disk::available_space(&output_dir)?;
    let mut warnings = Vec::new();

    match available_bytes {
        Some(available) if available < required_bytes => {
            return Err(Error::InsufficientSpace {
                path: output_dir,
                required: required_bytes,
                available,
            });
        }
        Some(available) => tracing::info!(
            "Preflight: ~{} MiB needed, {} MiB free in {}",
            required_bytes / (1024 * 1024),
            available / (1024 * 1024),
            output_dir.display()
        ),
        None => {
            warnings.push(format!(
                "free space in {} cannot be checked on this platform",
                output_dir.display()
            ));
        }
    }

    Ok(PreflightReport {
        output_dir,
        required_bytes,
        available_bytes,
        warnings,
    })
}

fn check_writable(dir: &Path) -> Result<()> {
    tempfile::Builder::new()
        .prefix(".bdforge-preflight-")
        .tempfile_in(dir)
        .map(drop)
        .map_err(|e| Error::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_plan::{AudioMode, HdrProfile, InputSource, MatchRule, SelectedTrack, TrackSelection, VideoParams};
    use bf_probe::MediaDescriptor;
    use std::time::Duration;

    fn plan(output: PathBuf, secs: u64, crf: u32) -> EncodePlan {
        EncodePlan {
            feature_id: "00800".into(),
            input: InputSource::Single(PathBuf::from("/s/1.m2ts")),
            output,
            descriptor: MediaDescriptor::new("/s/1.m2ts", None, vec![]),
            duration: Duration::from_secs(secs),
            hdr: HdrProfile::None,
            tracks: TrackSelection {
                audio: vec![SelectedTrack {
                    index: 1,
                    language: None,
                    rule: MatchRule::FirstAvailable,
                }],
                subtitles: vec![],
            },
            video: VideoParams {
                codec: "libx265".into(),
                preset: Some("slow".into()),
                crf,
                threads: 4,
                gpu_device: None,
                bit_depth: 10,
                pixel_format: "yuv420p10le".into(),
                pixel_format_conversion: false,
                stream_index: 0,
                args: vec![],
            },
            audio: AudioMode::Copy,
            preserve_chapters: true,
            overwrite: false,
            warnings: vec![],
        }
    }

    #[test]
    fn estimate_halves_every_six_crf() {
        let out = PathBuf::from("/out/x.mkv");
        // 8 s at (40 + 1.5) Mbit/s = 41.5 MB.
        assert_eq!(estimate_output_bytes(&plan(out.clone(), 8, 14)), 41_500_000);
        // 8 s at (20 + 1.5) Mbit/s.
        assert_eq!(estimate_output_bytes(&plan(out, 8, 20)), 21_500_000);
    }

    #[test]
    fn slower_presets_estimate_smaller() {
        assert!(preset_factor(Some("veryslow")) < preset_factor(Some("slow")));
        assert!(preset_factor(Some("ultrafast")) > preset_factor(Some("medium")));
        assert_eq!(preset_factor(None), 1.0);
    }

    #[test]
    fn creates_missing_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/out");
        let report = check(&plan(dir.join("x.mkv"), 1, 14), &SupervisorConfig::default()).unwrap();
        assert!(dir.is_dir());
        assert_eq!(report.output_dir, dir);
        assert!(report.required_bytes > 0);
        // Probe file is gone again.
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn huge_estimate_is_insufficient_space() {
        let tmp = tempfile::tempdir().unwrap();
        // A century of 40 Mbit/s video.
        let p = plan(tmp.path().join("x.mkv"), 100 * 365 * 24 * 3600, 0);
        let err = check(&p, &SupervisorConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InsufficientSpace { .. }));
        assert!(!tmp.path().join("x.mkv").exists());
    }

    #[test]
    fn unwritable_parent_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        let err = check(&plan(file.join("x.mkv"), 1, 14), &SupervisorConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
