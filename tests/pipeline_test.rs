//! Pipeline integration tests
//!
//! Drive `Pipeline` end to end over synthetic disc trees, with a scripted
//! prober and (on unix) a shell script standing in for ffmpeg.

mod common;

use assert_matches::assert_matches;
use bf_av::ToolRegistry;
use bf_core::config::{EncodingConfig, Setting};
use bf_core::events::{EventBus, EventPayload, SupervisorState};
use bf_core::{HdrFormat, Stage};
use bf_pipeline::{ffmpeg_args, Pipeline};
use bf_plan::{HdrProfile, InputSource, MatchRule};
use bf_probe::{ColorInfo, ContentLight, HdrSideData, MasteringDisplay, StreamInfo};
use common::{disc, FakeProber, MINUTE, TICKS_PER_SEC};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn pipeline(config: EncodingConfig, prober: Arc<FakeProber>, ffmpeg: &Path) -> Pipeline {
    let tools = ToolRegistry::with_paths(ffmpeg, "/nonexistent/ffprobe");
    Pipeline::new(Arc::new(config), prober, Arc::new(tools))
}

fn missing_ffmpeg() -> PathBuf {
    PathBuf::from("/nonexistent/ffmpeg")
}

fn hdr10_plus_video() -> StreamInfo {
    StreamInfo::video(0, "hevc", 3840, 2160, 10)
        .with_color(ColorInfo {
            primaries: Some("bt2020".into()),
            transfer: Some("smpte2084".into()),
            matrix: Some("bt2020nc".into()),
        })
        .with_side_data(HdrSideData {
            mastering_display: Some(MasteringDisplay {
                red: (0.68, 0.32),
                green: (0.265, 0.69),
                blue: (0.15, 0.06),
                white_point: (0.3127, 0.329),
                min_luminance: 0.0001,
                max_luminance: 1000.0,
            }),
            content_light: Some(ContentLight {
                max_content: 1000,
                max_average: 400,
            }),
            hdr10_plus: true,
            ..Default::default()
        })
}

#[tokio::test]
async fn dry_run_picks_longest_playlist() {
    let d = disc(
        "Some.Movie.2020",
        &[
            ("00001", vec![("00100", 5 * MINUTE)]),
            ("00002", vec![("00200", 95 * MINUTE)]),
            ("00003", vec![("00300", 50 * MINUTE), ("00301", 44 * MINUTE)]),
        ],
    );
    let prober = Arc::new(
        FakeProber::new(common::basic_streams())
            .with("00200", common::streams_with_audio(2))
            .with("00300", common::streams_with_audio(6))
            .with("00301", common::streams_with_audio(6)),
    );
    let out = tempfile::tempdir().unwrap();

    let result = pipeline(EncodingConfig::default(), prober, &missing_ffmpeg())
        .with_dry_run(true)
        .run(&d.root, out.path())
        .await;

    assert!(result.success, "{:?}", result.failure);
    assert!(result.output.is_none());
    let plan = result.plan.unwrap();
    assert_eq!(plan.feature_id, "00002");
    assert_eq!(plan.input, InputSource::Single(d.root.join("BDMV/STREAM/00200.m2ts")));
    assert_eq!(plan.output, out.path().join("Some Movie 2020.mkv"));
    assert_eq!(plan.duration.as_secs(), 95 * 60);
    // Nothing written in dry-run mode.
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn non_preferred_audio_is_kept_in_source_order() {
    let d = disc("Disc", &[("00001", vec![("00100", 100 * MINUTE)])]);
    let prober = Arc::new(FakeProber::new(vec![
        StreamInfo::video(0, "h264", 1920, 1080, 8),
        StreamInfo::audio(1, "ac3", Some("kor"), 6),
        StreamInfo::audio(2, "dts", Some("fra"), 6),
    ]));
    let mut config = EncodingConfig::default();
    config.preferred_languages = vec!["eng".into(), "jpn".into()];
    let out = tempfile::tempdir().unwrap();

    let result = pipeline(config, prober, &missing_ffmpeg())
        .with_dry_run(true)
        .run(&d.root, out.path())
        .await;

    let plan = result.plan.unwrap();
    assert_eq!(plan.tracks.audio_indices().collect::<Vec<_>>(), vec![1, 2]);
    assert!(plan
        .tracks
        .audio
        .iter()
        .all(|t| t.rule == MatchRule::FallbackNonPreferred));
}

#[tokio::test]
async fn hdr10_plus_on_nvenc_downgrades_with_warning() {
    let d = disc("Disc", &[("00001", vec![("00100", 100 * MINUTE)])]);
    let prober = Arc::new(FakeProber::new(vec![
        hdr10_plus_video(),
        StreamInfo::audio(1, "truehd", Some("eng"), 8),
    ]));
    let mut config = EncodingConfig::default();
    config.video_codec = "hevc_nvenc".into();
    config.hdr_settings.fallback_format = HdrFormat::Hdr10;
    let out = tempfile::tempdir().unwrap();

    let result = pipeline(config, prober, &missing_ffmpeg())
        .with_dry_run(true)
        .run(&d.root, out.path())
        .await;

    assert!(result.success, "{:?}", result.failure);
    let plan = result.plan.unwrap();
    assert_matches!(plan.hdr, HdrProfile::Hdr10(_));
    let downgrades: Vec<_> = result
        .warnings
        .iter()
        .filter(|w| w.contains("falling back to hdr10"))
        .collect();
    assert_eq!(downgrades.len(), 1);

    let args = ffmpeg_args(&plan);
    assert!(args.windows(2).any(|w| w == ["-c:v", "hevc_nvenc"]));
    assert!(args.windows(2).any(|w| w == ["-color_trc", "smpte2084"]));
}

#[tokio::test]
async fn existing_output_is_a_compile_failure() {
    let d = disc("Movie", &[("00001", vec![("00100", 100 * MINUTE)])]);
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let out = tempfile::tempdir().unwrap();
    let existing = out.path().join("Movie.mkv");
    std::fs::write(&existing, b"keep me").unwrap();

    let result = pipeline(EncodingConfig::default(), prober, &missing_ffmpeg())
        .run(&d.root, out.path())
        .await;

    assert!(!result.success);
    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, Stage::Compile);
    assert_eq!(failure.path.as_deref(), Some(existing.as_path()));
    assert_eq!(std::fs::read(&existing).unwrap(), b"keep me");
}

#[tokio::test]
async fn compile_failure_keeps_locator_warnings() {
    let d = disc("Movie", &[("00001", vec![("00100", 100 * MINUTE)])]);
    std::fs::write(
        d.root.join("BDMV/PLAYLIST/00002.mpls"),
        common::mpls_bytes(&[("00404", 0, 120 * MINUTE)]),
    )
    .unwrap();
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let mut config = EncodingConfig::default();
    config.gpu_device = Some(1);
    let out = tempfile::tempdir().unwrap();
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let result = pipeline(config, prober, &missing_ffmpeg())
        .with_events(events)
        .run(&d.root, out.path())
        .await;

    assert_eq!(result.failure.unwrap().stage, Stage::Compile);
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("playlist 00002 dropped") && w.contains("00404")),
        "{:?}",
        result.warnings
    );

    let mut published = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EventPayload::Warning { message } = event.payload {
            published.push(message);
        }
    }
    assert_eq!(published, result.warnings);
}

#[tokio::test]
async fn svtav1_accepts_crf_above_x265_range() {
    let d = disc("Movie", &[("00001", vec![("00100", 100 * MINUTE)])]);
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let mut config = EncodingConfig::default();
    config.video_codec = "libsvtav1".into();
    config.video_crf = Setting::Fixed(55);
    let out = tempfile::tempdir().unwrap();

    let result = pipeline(config, prober, &missing_ffmpeg())
        .with_dry_run(true)
        .run(&d.root, out.path())
        .await;

    assert!(result.success, "{:?}", result.failure);
    assert_eq!(result.plan.unwrap().video.crf, 55);
}

#[tokio::test]
async fn invalid_config_fails_before_probing() {
    let d = disc("Movie", &[("00001", vec![("00100", 100 * MINUTE)])]);
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let mut config = EncodingConfig::default();
    config.video_crf = Setting::Fixed(170);
    let out = tempfile::tempdir().unwrap();

    let result = pipeline(config, prober.clone(), &missing_ffmpeg())
        .run(&d.root, out.path())
        .await;

    assert_eq!(result.failure.unwrap().stage, Stage::Configure);
    assert_eq!(prober.calls(), 0);
}

#[tokio::test]
async fn directory_without_bdmv_fails_in_locate() {
    let dir = tempfile::tempdir().unwrap();
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let out = tempfile::tempdir().unwrap();

    let result = pipeline(EncodingConfig::default(), prober, &missing_ffmpeg())
        .run(dir.path(), out.path())
        .await;

    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, Stage::Locate);
    assert_eq!(failure.path.as_deref(), Some(dir.path()));
}

#[tokio::test]
async fn missing_ffmpeg_is_reported_in_preflight() {
    let d = disc("Movie", &[("00001", vec![("00100", 100 * MINUTE)])]);
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let out = tempfile::tempdir().unwrap();
    let tools = ToolRegistry::default();

    let result = Pipeline::new(Arc::new(EncodingConfig::default()), prober, Arc::new(tools))
        .run(&d.root, out.path())
        .await;

    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, Stage::Preflight);
    assert!(failure.message.contains("ffmpeg"));
}

/// Config for short synthetic encodes that fit on any test filesystem.
#[cfg(unix)]
fn short_config() -> EncodingConfig {
    let mut config = EncodingConfig::default();
    config.video_crf = Setting::Fixed(28);
    config.locator.min_duration_secs = 1;
    config.supervisor.progress_interval_ms = 0;
    config
}

#[cfg(unix)]
#[tokio::test]
async fn encode_succeeds_and_reports_progress() {
    let d = disc("Short", &[("00001", vec![("00100", 4 * TICKS_PER_SEC)])]);
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let bin = tempfile::tempdir().unwrap();
    let ffmpeg = common::fake_ffmpeg(
        bin.path(),
        r#"echo "out_time_us=2000000" >&2
echo "progress=continue" >&2
echo "out_time_us=4000000" >&2
echo "progress=end" >&2
printf 'encoded' > "$last""#,
    );
    let out = tempfile::tempdir().unwrap();
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let result = pipeline(short_config(), prober, &ffmpeg)
        .with_events(events)
        .run(&d.root, out.path())
        .await;

    assert!(result.success, "{:?}", result.failure);
    let output = result.output.unwrap();
    assert_eq!(output, out.path().join("Short.mkv"));
    assert_eq!(std::fs::read(&output).unwrap(), b"encoded");

    let mut progress = Vec::new();
    let mut states = Vec::new();
    let mut finished = None;
    while let Ok(event) = rx.try_recv() {
        match event.payload {
            EventPayload::Progress { processed_secs, .. } => progress.push(processed_secs),
            EventPayload::StateChanged { state } => states.push(state),
            EventPayload::Finished { success, .. } => finished = Some(success),
            EventPayload::Warning { .. } => {}
        }
    }
    assert_eq!(progress, vec![2.0, 4.0]);
    assert_eq!(states.last(), Some(&SupervisorState::Succeeded));
    assert_eq!(finished, Some(true));
}

#[cfg(unix)]
#[tokio::test]
async fn encoder_failure_carries_diagnostics() {
    let d = disc("Short", &[("00001", vec![("00100", 4 * TICKS_PER_SEC)])]);
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let bin = tempfile::tempdir().unwrap();
    let ffmpeg = common::fake_ffmpeg(
        bin.path(),
        r#"echo "Unknown encoder 'libx265'" >&2
exit 1"#,
    );
    let out = tempfile::tempdir().unwrap();

    let result = pipeline(short_config(), prober, &ffmpeg).run(&d.root, out.path()).await;

    assert!(!result.success);
    assert!(!result.aborted);
    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, Stage::Encode);
    assert!(failure.message.contains("Unknown encoder"), "{}", failure.message);
    assert!(!out.path().join("Short.mkv").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn cancelled_run_is_aborted_without_output() {
    let d = disc("Short", &[("00001", vec![("00100", 4 * TICKS_PER_SEC)])]);
    let prober = Arc::new(FakeProber::new(common::basic_streams()));
    let bin = tempfile::tempdir().unwrap();
    let ffmpeg = common::fake_ffmpeg(bin.path(), r#"printf 'x' > "$last"; sleep 30"#);
    let out = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let result = pipeline(short_config(), prober, &ffmpeg)
        .with_cancellation(token)
        .run(&d.root, out.path())
        .await;

    assert!(result.aborted);
    assert_eq!(result.failure.unwrap().stage, Stage::Encode);
    assert!(!out.path().join("Short.mkv").exists());
}
