//! Plan compilation: feature + HDR + tracks + config → [`EncodePlan`].
//!
//! Every `auto` setting is resolved here against the encoder capability
//! table, and every contradiction between configuration and that table is a
//! [`Error::PlanConflict`]. The output is a pure function of the inputs, so
//! compiling twice yields equal plans.

use std::path::{Path, PathBuf};

use bf_core::config::{EncodingConfig, Setting};
use bf_core::{Error, Result};
use bf_probe::{MasteringDisplay, StreamInfo};

use crate::capabilities::{self, EncoderCapabilities, EncoderFamily};
use crate::hdr::{HdrProfile, HdrResolution, StaticMetadata};
use crate::locator::FeatureCandidate;
use crate::plan::{AudioMode, EncodePlan, InputSource, VideoParams};
use crate::tracks::TrackSelection;

/// x265 tuning for high-bitrate archival encodes of film sources.
const X265_TUNING: &[&str] = &[
    "rd=4",
    "psy-rd=2.0",
    "psy-rdoq=2.0",
    "aq-mode=3",
    "aq-strength=0.8",
    "deblock=-1,-1",
    "me=star",
    "subme=7",
    "ref=6",
    "rc-lookahead=60",
    "b-adapt=2",
    "bframes=8",
    "keyint=250",
    "min-keyint=23",
    "merange=57",
    "weightp=2",
    "weightb=1",
    "strong-intra-smoothing=0",
];

/// Dolby Vision in x265 requires VBV; these are the level 5.1 high-tier limits.
const DV_VBV_KBPS: u32 = 160_000;

/// Build the encode plan.
///
/// # Errors
///
/// - [`Error::PlanConflict`] when configuration contradicts the encoder's capabilities.
/// - [`Error::OutputCollision`] when the output exists and overwrite is off.
/// - [`Error::Probe`] when the feature has no video stream.
pub fn compile(
    feature: &FeatureCandidate,
    hdr: &HdrResolution,
    tracks: &TrackSelection,
    config: &EncodingConfig,
    output_dir: &Path,
) -> Result<EncodePlan> {
    let caps = capabilities::lookup(&config.video_codec)?;
    let warnings = hdr.warnings.clone();

    let gpu_device = match (caps.gpu, config.gpu_device) {
        (false, Some(device)) => {
            return Err(Error::conflict(
                "gpu_device",
                format!("{} does not accept a device index; remove gpu_device {device}", caps.name),
            ));
        }
        (true, device) => Some(device.unwrap_or(0)),
        (false, None) => None,
    };

    // HDR sources always need 10-bit output, even with force_10bit off.
    let bit_depth = if !hdr.ten_bit {
        8
    } else if caps.max_bit_depth >= 10 {
        10
    } else if hdr.detected.is_hdr() {
        return Err(Error::conflict(
            "video_codec",
            format!(
                "source is {} but {} only produces 8-bit output",
                hdr.detected.format(),
                caps.name
            ),
        ));
    } else {
        return Err(Error::conflict(
            "force_10bit",
            format!("{} cannot encode 10-bit output", caps.name),
        ));
    };

    let preset = match &config.video_preset {
        Setting::Auto => caps.default_preset.map(str::to_string),
        Setting::Fixed(preset) if caps.default_preset.is_some() => Some(preset.clone()),
        Setting::Fixed(preset) => {
            return Err(Error::conflict(
                "video_preset",
                format!("{} has no presets; remove video_preset '{preset}'", caps.name),
            ));
        }
    };

    let crf = match config.video_crf {
        Setting::Auto => caps.default_crf,
        Setting::Fixed(crf) if crf <= caps.max_crf => crf,
        Setting::Fixed(crf) => {
            return Err(Error::conflict(
                "video_crf",
                format!("{crf} exceeds the maximum of {} for {}", caps.max_crf, caps.name),
            ));
        }
    };

    let threads = match config.max_threads {
        Setting::Auto => u32::try_from(num_cpus::get()).unwrap_or(u32::MAX).max(1),
        Setting::Fixed(threads) => threads.max(1),
    };

    let video = feature
        .descriptor
        .primary_video()
        .ok_or_else(|| Error::probe(&feature.descriptor.path, "feature has no video stream"))?;

    let output = output_path(feature, output_dir);
    if output.exists() && !config.supervisor.overwrite {
        return Err(Error::OutputCollision { path: output });
    }

    let ten_bit = bit_depth == 10;
    let target = hdr.target.clone();

    let settings = ResolvedVideo {
        caps,
        preset: preset.as_deref(),
        crf,
        threads,
        gpu_device,
        ten_bit,
    };
    let mut args = encoder_args(&settings, &target);
    args.extend(color_args(video, &target));

    let pixel_format = match (ten_bit, caps.family) {
        (false, _) => "yuv420p",
        (true, EncoderFamily::Nvenc | EncoderFamily::Qsv | EncoderFamily::VideoToolbox) => "p010le",
        (true, _) => "yuv420p10le",
    };

    let audio = if config.copy_audio {
        AudioMode::Copy
    } else {
        AudioMode::Transcode {
            codec: config.supervisor.audio_codec.clone(),
        }
    };

    tracing::info!(
        "Plan: {} crf {crf}{} {bit_depth}-bit, HDR {} → {}",
        caps.name,
        preset.as_deref().map(|p| format!(" preset {p}")).unwrap_or_default(),
        target.format(),
        output.display()
    );

    Ok(EncodePlan {
        feature_id: feature.id.clone(),
        input: InputSource::from_segments(feature.segment_paths()),
        output,
        descriptor: feature.descriptor.clone(),
        duration: feature.duration,
        hdr: target,
        tracks: tracks.clone(),
        video: VideoParams {
            codec: caps.name.to_string(),
            preset,
            crf,
            threads,
            gpu_device,
            bit_depth,
            pixel_format: pixel_format.to_string(),
            pixel_format_conversion: hdr.pixel_format_conversion && ten_bit,
            stream_index: video.index,
            args,
        },
        audio,
        preserve_chapters: config.preserve_chapters,
        overwrite: config.supervisor.overwrite,
        warnings,
    })
}

/// `<output_dir>/<title or id>.mkv`, with path-hostile characters replaced.
pub fn output_path(feature: &FeatureCandidate, output_dir: &Path) -> PathBuf {
    let name = feature
        .title
        .as_deref()
        .map(sanitize_file_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| sanitize_file_name(&feature.id));
    let name = if name.is_empty() { "feature".to_string() } else { name };
    output_dir.join(format!("{name}.mkv"))
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}

struct ResolvedVideo<'a> {
    caps: &'a EncoderCapabilities,
    preset: Option<&'a str>,
    crf: u32,
    threads: u32,
    gpu_device: Option<u32>,
    ten_bit: bool,
}

fn encoder_args(v: &ResolvedVideo<'_>, target: &HdrProfile) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(preset) = v.preset {
        args.extend(["-preset".to_string(), preset.to_string()]);
    }

    match v.caps.family {
        EncoderFamily::X265 => {
            args.push("-x265-params".into());
            args.push(x265_params(v, target).join(":"));
            if matches!(target, HdrProfile::DolbyVision { .. }) {
                args.extend(["-dolbyvision".into(), "1".into()]);
            }
        }
        EncoderFamily::X264 => {
            args.extend(["-crf".into(), v.crf.to_string()]);
            args.extend(["-threads".into(), v.threads.to_string()]);
            if v.ten_bit {
                args.extend(["-profile:v".into(), "high10".into()]);
            }
        }
        EncoderFamily::SvtAv1 => {
            args.extend(["-crf".into(), v.crf.to_string()]);
            let params = svtav1_params(target);
            if !params.is_empty() {
                args.push("-svtav1-params".into());
                args.push(params.join(":"));
            }
        }
        EncoderFamily::Nvenc => {
            let cq = v.crf.to_string();
            let qmax = (v.crf + 2).to_string();
            let gpu = v.gpu_device.unwrap_or(0).to_string();
            args.extend(
                [
                    "-rc",
                    "vbr",
                    "-cq",
                    cq.as_str(),
                    "-qmin",
                    cq.as_str(),
                    "-qmax",
                    qmax.as_str(),
                    "-b:v",
                    "0",
                    "-gpu",
                    gpu.as_str(),
                    "-spatial_aq",
                    "1",
                    "-temporal_aq",
                    "1",
                    "-rc-lookahead",
                    "32",
                ]
                .map(String::from),
            );
            if v.ten_bit && v.caps.name == "hevc_nvenc" {
                args.extend(["-profile:v".into(), "main10".into()]);
            }
        }
        EncoderFamily::Qsv => {
            args.extend(["-global_quality".into(), v.crf.to_string()]);
            if v.ten_bit {
                args.extend(["-profile:v".into(), "main10".into()]);
            }
        }
        EncoderFamily::VideoToolbox => {
            args.extend(["-q:v".into(), v.crf.to_string()]);
            if v.ten_bit {
                args.extend(["-profile:v".into(), "main10".into()]);
            }
        }
    }
    args
}

fn x265_params(v: &ResolvedVideo<'_>, target: &HdrProfile) -> Vec<String> {
    let mut params = vec![
        format!("crf={}", v.crf),
        format!("pools={}", v.threads),
        format!("frame-threads={}", v.threads.min(16)),
    ];
    params.extend(X265_TUNING.iter().map(|p| p.to_string()));
    if v.ten_bit {
        params.extend(["profile=main10".into(), "high-tier=1".into()]);
    }

    if let Some(meta) = target.static_metadata() {
        params.extend(
            [
                "hdr10=1",
                "hdr10-opt=1",
                "repeat-headers=1",
                "colorprim=bt2020",
                "transfer=smpte2084",
                "colormatrix=bt2020nc",
            ]
            .map(String::from),
        );
        params.extend(static_metadata_params(meta));
    }

    match target {
        HdrProfile::Hdr10Plus { .. } => params.push("dhdr10-opt=1".into()),
        HdrProfile::DolbyVision { profile, .. } => {
            params.push(format!("dolby-vision-profile={}", profile.x265_value()));
            params.push(format!("vbv-maxrate={DV_VBV_KBPS}"));
            params.push(format!("vbv-bufsize={DV_VBV_KBPS}"));
        }
        HdrProfile::Hlg => params.extend(
            [
                "colorprim=bt2020",
                "transfer=arib-std-b67",
                "colormatrix=bt2020nc",
                "repeat-headers=1",
            ]
            .map(String::from),
        ),
        HdrProfile::None | HdrProfile::Hdr10(_) => {}
    }
    params
}

fn static_metadata_params(meta: &StaticMetadata) -> Vec<String> {
    let mut params = Vec::new();
    if let Some(md) = &meta.mastering {
        params.push(format!("master-display={}", x265_master_display(md)));
    }
    if let Some(cll) = &meta.content_light {
        params.push(format!("max-cll={},{}", cll.max_content, cll.max_average));
    }
    params
}

/// `G(x,y)B(x,y)R(x,y)WP(x,y)L(max,min)` in 0.00002 chromaticity and
/// 0.0001 cd/m² units.
pub fn x265_master_display(md: &MasteringDisplay) -> String {
    let c = |v: f64| (v * 50_000.0).round() as u64;
    let l = |v: f64| (v * 10_000.0).round() as u64;
    format!(
        "G({},{})B({},{})R({},{})WP({},{})L({},{})",
        c(md.green.0),
        c(md.green.1),
        c(md.blue.0),
        c(md.blue.1),
        c(md.red.0),
        c(md.red.1),
        c(md.white_point.0),
        c(md.white_point.1),
        l(md.max_luminance),
        l(md.min_luminance),
    )
}

fn svtav1_params(target: &HdrProfile) -> Vec<String> {
    let Some(meta) = target.static_metadata() else {
        return Vec::new();
    };
    let mut params = vec!["enable-hdr=1".to_string()];
    if let Some(md) = &meta.mastering {
        params.push(format!(
            "mastering-display=G({:.4},{:.4})B({:.4},{:.4})R({:.4},{:.4})WP({:.4},{:.4})L({:.4},{:.4})",
            md.green.0,
            md.green.1,
            md.blue.0,
            md.blue.1,
            md.red.0,
            md.red.1,
            md.white_point.0,
            md.white_point.1,
            md.max_luminance,
            md.min_luminance,
        ));
    }
    if let Some(cll) = &meta.content_light {
        params.push(format!("content-light={},{}", cll.max_content, cll.max_average));
    }
    params
}

/// Colour tags for the output stream: the HDR target's when there is one,
/// otherwise whatever the source declared.
fn color_args(video: &StreamInfo, target: &HdrProfile) -> Vec<String> {
    let (primaries, transfer, matrix) = match target {
        HdrProfile::Hlg => (Some("bt2020"), Some("arib-std-b67"), Some("bt2020nc")),
        t if t.is_hdr() => (Some("bt2020"), Some("smpte2084"), Some("bt2020nc")),
        _ => (
            video.color.primaries.as_deref(),
            video.color.transfer.as_deref(),
            video.color.matrix.as_deref(),
        ),
    };

    let mut args = Vec::new();
    for (flag, value) in [
        ("-color_primaries", primaries),
        ("-color_trc", transfer),
        ("-colorspace", matrix),
    ] {
        if let Some(value) = value.filter(|v| !v.is_empty() && *v != "unknown") {
            args.extend([flag.to_string(), value.to_string()]);
        }
    }
    args
}
