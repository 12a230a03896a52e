//! Execution supervisor: preflight, run ffmpeg, report, clean up.
//!
//! State machine:
//!
//! ```text
//! Idle → Preflight → Running → Succeeded
//!            │           ├────→ Failed
//!            └───────────┴────→ Aborted
//! ```
//!
//! Every transition is published on the [`EventBus`]. Encoder failures are
//! never retried.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bf_av::ToolCommand;
use bf_core::config::SupervisorConfig;
use bf_core::events::{EventBus, EventPayload, SupervisorState};
use bf_core::{Error, Result, RunId, Stage};
use bf_plan::EncodePlan;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use crate::args::ffmpeg_args;
use crate::preflight;
use crate::progress::ProgressParser;

/// Lines of non-progress stderr kept for [`Error::Encoder`].
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Runs one [`EncodePlan`] to completion.
pub struct Supervisor {
    run_id: RunId,
    ffmpeg: PathBuf,
    config: SupervisorConfig,
    bus: EventBus,
    cancel: CancellationToken,
    state: SupervisorState,
    /// Last non-terminal state, for attributing failures.
    last_active: SupervisorState,
}

impl Supervisor {
    pub fn new(
        run_id: RunId,
        ffmpeg: impl Into<PathBuf>,
        config: SupervisorConfig,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            ffmpeg: ffmpeg.into(),
            config,
            bus,
            cancel,
            state: SupervisorState::Idle,
            last_active: SupervisorState::Idle,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// The stage a failure belongs to: preflight until ffmpeg has started.
    pub fn failed_stage(&self) -> Stage {
        match self.last_active {
            SupervisorState::Idle | SupervisorState::Preflight => Stage::Preflight,
            _ => Stage::Encode,
        }
    }

    fn transition(&mut self, state: SupervisorState) {
        tracing::debug!("Supervisor {} → {state}", self.state);
        if !state.is_terminal() {
            self.last_active = state;
        }
        self.state = state;
        self.bus
            .publish(self.run_id, EventPayload::StateChanged { state });
    }

    fn warn(&self, message: String) {
        self.bus
            .publish(self.run_id, EventPayload::Warning { message });
    }

    /// Encode `plan`, returning the output path.
    ///
    /// # Errors
    ///
    /// - Anything [`preflight::check`] reports.
    /// - [`Error::Tool`] when ffmpeg cannot be spawned.
    /// - [`Error::Encoder`] on a non-zero exit, with the stderr tail.
    /// - [`Error::Aborted`] when the cancellation token fires.
    /// - [`Error::Io`] when ffmpeg reports success but left no output.
    pub async fn run(&mut self, plan: &EncodePlan) -> Result<PathBuf> {
        let result = self.run_inner(plan).await;
        let terminal = match &result {
            Ok(_) => SupervisorState::Succeeded,
            Err(Error::Aborted) => SupervisorState::Aborted,
            Err(_) => SupervisorState::Failed,
        };
        self.transition(terminal);
        result
    }

    async fn run_inner(&mut self, plan: &EncodePlan) -> Result<PathBuf> {
        self.transition(SupervisorState::Preflight);
        let report = preflight::check(plan, &self.config)?;
        for warning in report.warnings {
            self.warn(warning);
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Aborted);
        }

        // Only files this run created may be removed on failure.
        let output_preexisted = plan.output.exists();

        self.transition(SupervisorState::Running);
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.args(ffmpeg_args(plan));
        tracing::info!("Encoding {} → {}", plan.feature_id, plan.output.display());
        tracing::debug!("{}", cmd.display());

        let mut child = cmd.spawn_with_stderr()?;
        let outcome = self.watch(&mut child, plan).await;

        match outcome {
            Ok(()) => {}
            Err(e) => {
                if !output_preexisted || plan.overwrite {
                    remove_partial(&plan.output).await;
                }
                return Err(e);
            }
        }

        if !plan.output.is_file() {
            return Err(Error::io(
                &plan.output,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "encoder exited successfully but produced no output",
                ),
            ));
        }
        tracing::info!("Encode finished: {}", plan.output.display());
        Ok(plan.output.clone())
    }

    /// Stream stderr until EOF, then wait for exit. Cancellation kills the
    /// child at any point.
    async fn watch(&self, child: &mut Child, plan: &EncodePlan) -> Result<()> {
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::tool("ffmpeg", "stderr was not captured"))?;
        let mut lines = BufReader::new(stderr).lines();

        let mut parser = ProgressParser::new(
            plan.duration,
            Duration::from_millis(self.config.progress_interval_ms),
        );
        let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return abort(child).await;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(&line, &mut parser, &mut tail),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Reading ffmpeg stderr failed: {e}");
                        break;
                    }
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return abort(child).await,
            status = child.wait() => status.map_err(|e| Error::io(&self.ffmpeg, e))?,
        };

        if status.success() {
            Ok(())
        } else {
            let tail: Vec<String> = tail.into_iter().collect();
            Err(Error::Encoder {
                status: status.to_string(),
                tail: tail.join("\n"),
            })
        }
    }

    fn handle_line(&self, line: &str, parser: &mut ProgressParser, tail: &mut VecDeque<String>) {
        if ProgressParser::is_progress_line(line) {
            if let Some(update) = parser.feed(line) {
                self.bus.publish(
                    self.run_id,
                    EventPayload::Progress {
                        processed_secs: update.processed.as_secs_f64(),
                        total_secs: update.total.as_secs_f64(),
                        eta_secs: update.eta.map(|d| d.as_secs_f64()),
                        speed: update.speed,
                    },
                );
            }
            return;
        }

        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        tracing::trace!("ffmpeg: {line}");
        if tail.len() == DIAGNOSTIC_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }
}

async fn abort(child: &mut Child) -> Result<()> {
    tracing::warn!("Cancellation requested; stopping encoder");
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill encoder: {e}");
    }
    Err(Error::Aborted)
}

async fn remove_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => tracing::info!("Removed partial output {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove partial output {}: {e}", output.display()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bf_core::events::Event;
    use bf_plan::{AudioMode, HdrProfile, InputSource, TrackSelection, VideoParams};
    use bf_probe::MediaDescriptor;
    use std::os::unix::fs::PermissionsExt;
    use tokio::sync::broadcast;

    /// Write an executable shell script standing in for ffmpeg. The output
    /// path is always the last argument.
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ffmpeg");
        let script = format!("#!/bin/sh\nfor last; do :; done\n{body}\n");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn plan(output: PathBuf) -> EncodePlan {
        EncodePlan {
            feature_id: "00800".into(),
            input: InputSource::Single(PathBuf::from("/s/1.m2ts")),
            output,
            descriptor: MediaDescriptor::new("/s/1.m2ts", None, vec![]),
            duration: Duration::from_secs(10),
            hdr: HdrProfile::None,
            tracks: TrackSelection::default(),
            video: VideoParams {
                codec: "libx265".into(),
                preset: None,
                crf: 40,
                threads: 1,
                gpu_device: None,
                bit_depth: 8,
                pixel_format: "yuv420p".into(),
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

    fn supervisor(ffmpeg: PathBuf, bus: EventBus, cancel: CancellationToken) -> Supervisor {
        let config = SupervisorConfig {
            progress_interval_ms: 0,
            ..Default::default()
        };
        Supervisor::new(RunId::new(), ffmpeg, config, bus, cancel)
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<EventPayload> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.payload);
        }
        out
    }

    fn states(events: &[EventPayload]) -> Vec<SupervisorState> {
        events
            .iter()
            .filter_map(|e| match e {
                EventPayload::StateChanged { state } => Some(*state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn successful_encode_reports_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            "echo 'out_time_us=5000000' >&2\necho 'speed=2.0x' >&2\necho 'progress=continue' >&2\n\
             echo 'out_time_us=10000000' >&2\necho 'progress=end' >&2\necho data > \"$last\"",
        );
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let out = tmp.path().join("out/Movie.mkv");

        let mut sup = supervisor(ffmpeg, bus, CancellationToken::new());
        let result = sup.run(&plan(out.clone())).await.unwrap();
        assert_eq!(result, out);
        assert_eq!(sup.state(), SupervisorState::Succeeded);

        let events = drain(&mut rx);
        assert_eq!(
            states(&events),
            vec![
                SupervisorState::Preflight,
                SupervisorState::Running,
                SupervisorState::Succeeded
            ]
        );
        let progress: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                EventPayload::Progress { processed_secs, .. } => Some(*processed_secs),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![5.0, 10.0]);
    }

    #[tokio::test]
    async fn non_zero_exit_is_encoder_error_with_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            "echo 'progress=continue' >&2\necho partial > \"$last\"\n\
             i=0; while [ $i -lt 30 ]; do echo \"diag line $i\" >&2; i=$((i+1)); done\nexit 1",
        );
        let out = tmp.path().join("Movie.mkv");
        let mut sup = supervisor(ffmpeg, EventBus::default(), CancellationToken::new());
        let err = sup.run(&plan(out.clone())).await.unwrap_err();

        assert_eq!(sup.state(), SupervisorState::Failed);
        let Error::Encoder { tail, .. } = &err else {
            panic!("expected encoder error, got {err:?}");
        };
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), DIAGNOSTIC_TAIL_LINES);
        assert_eq!(lines[0], "diag line 10");
        assert_eq!(lines[19], "diag line 29");
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn cancellation_kills_and_removes_partial_output() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            "echo partial > \"$last\"\necho 'progress=continue' >&2\nexec sleep 30",
        );
        let out = tmp.path().join("Movie.mkv");
        let cancel = CancellationToken::new();
        let mut sup = supervisor(ffmpeg, EventBus::default(), cancel.clone());

        let trigger = {
            let out = out.clone();
            tokio::spawn(async move {
                while !out.exists() {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                cancel.cancel();
            })
        };

        let started = std::time::Instant::now();
        let err = sup.run(&plan(out.clone())).await.unwrap_err();
        trigger.await.unwrap();

        assert_matches!(err, Error::Aborted);
        assert_eq!(sup.state(), SupervisorState::Aborted);
        assert!(!out.exists());
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test]
    async fn cancelled_before_start_never_spawns() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("spawned");
        let ffmpeg = fake_ffmpeg(tmp.path(), &format!("touch {}", marker.display()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sup = supervisor(ffmpeg, EventBus::default(), cancel);

        let err = sup.run(&plan(tmp.path().join("Movie.mkv"))).await.unwrap_err();
        assert_matches!(err, Error::Aborted);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn success_without_output_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(tmp.path(), "exit 0");
        let mut sup = supervisor(ffmpeg, EventBus::default(), CancellationToken::new());
        let err = sup.run(&plan(tmp.path().join("Movie.mkv"))).await.unwrap_err();
        assert_matches!(err, Error::Io { .. });
    }

    #[tokio::test]
    async fn missing_binary_is_tool_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sup = supervisor(
            tmp.path().join("no-such-ffmpeg"),
            EventBus::default(),
            CancellationToken::new(),
        );
        let err = sup.run(&plan(tmp.path().join("Movie.mkv"))).await.unwrap_err();
        assert_matches!(err, Error::Tool { .. });
        assert_eq!(sup.state(), SupervisorState::Failed);
    }
}
