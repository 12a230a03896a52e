//! End-to-end pipeline: locate → resolve → compile → preflight → encode.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bf_av::ToolRegistry;
use bf_core::config::EncodingConfig;
use bf_core::events::{EventBus, EventPayload};
use bf_core::{Error, RunId, Stage};
use bf_plan::{capabilities, compile, hdr, tracks, EncodePlan, FeatureLocator};
use bf_probe::Prober;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::supervisor::Supervisor;

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub stage: Stage,
    pub message: String,
    /// The file or directory implicated, if any.
    pub path: Option<PathBuf>,
}

/// A failed analysis, with the warnings raised before it failed.
#[derive(Debug)]
pub struct PlanError {
    pub stage: Stage,
    pub error: Error,
    pub warnings: Vec<String>,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct EncodeResult {
    pub run_id: RunId,
    pub success: bool,
    /// The encoded file; `None` on failure and in dry-run mode.
    pub output: Option<PathBuf>,
    pub elapsed: Duration,
    pub failure: Option<Failure>,
    /// Cancelled by the user rather than failed.
    pub aborted: bool,
    /// Warnings gathered during analysis and compilation.
    pub warnings: Vec<String>,
    /// The compiled plan, when compilation got that far.
    #[serde(skip)]
    pub plan: Option<EncodePlan>,
}

/// Shared dependencies for pipeline runs.
pub struct Pipeline {
    pub config: Arc<EncodingConfig>,
    pub prober: Arc<dyn Prober>,
    pub tools: Arc<ToolRegistry>,
    /// Stop after compiling the plan.
    pub dry_run: bool,
    pub cancellation: CancellationToken,
    pub events: EventBus,
}

impl Pipeline {
    pub fn new(config: Arc<EncodingConfig>, prober: Arc<dyn Prober>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            prober,
            tools,
            dry_run: false,
            cancellation: CancellationToken::new(),
            events: EventBus::default(),
        }
    }

    /// Builder: set dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Builder: attach an event bus.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Analyse `input` and compile its plan without encoding.
    ///
    /// Returns the plan plus every warning raised along the way. Errors carry
    /// the stage they occurred in and the warnings gathered before it.
    pub async fn plan(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> std::result::Result<(EncodePlan, Vec<String>), PlanError> {
        let mut warnings = Vec::new();
        match self.compile_plan(input, output_dir, &mut warnings).await {
            Ok(plan) => Ok((plan, warnings)),
            Err((stage, error)) => Err(PlanError {
                stage,
                error,
                warnings,
            }),
        }
    }

    async fn compile_plan(
        &self,
        input: &Path,
        output_dir: &Path,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<EncodePlan, (Stage, Error)> {
        let config = self.config.as_ref();
        config.validate().map_err(|e| (Stage::Configure, e))?;
        warnings.extend(config.warnings());

        tracing::info!("Locating main feature in {}", input.display());
        let locator = FeatureLocator::new(self.prober.as_ref(), &config.locator);
        let located = locator
            .locate(input, warnings)
            .await
            .map_err(|e| (e.stage().unwrap_or(Stage::Locate), e))?;
        tracing::debug!("Candidates, best first: {}", located.ranked_ids.join(", "));
        let feature = located.feature;

        let caps = capabilities::lookup(&config.video_codec).map_err(|e| (Stage::Compile, e))?;
        let resolution = hdr::resolve(
            feature.descriptor.primary_video(),
            &config.hdr_settings,
            config.preserve_hdr,
            config.force_10bit,
            caps,
        );
        let selection = tracks::select_tracks(&feature.descriptor, config);

        // Resolution warnings belong to the run even when compilation fails.
        let plan = compile(&feature, &resolution, &selection, config, output_dir);
        warnings.extend(resolution.warnings.iter().cloned());
        plan.map_err(|e| (e.stage().unwrap_or(Stage::Compile), e))
    }

    /// Run the whole pipeline for one input. Never panics on pipeline
    /// failures; they are reported in the result.
    pub async fn run(&self, input: &Path, output_dir: &Path) -> EncodeResult {
        let run_id = RunId::new();
        let started = Instant::now();

        let mut result = EncodeResult {
            run_id,
            success: false,
            output: None,
            elapsed: Duration::ZERO,
            failure: None,
            aborted: false,
            warnings: Vec::new(),
            plan: None,
        };

        match self.plan(input, output_dir).await {
            Ok((plan, warnings)) => {
                self.publish_warnings(run_id, &warnings);
                result.warnings = warnings;

                if self.dry_run {
                    tracing::info!("Dry run: plan compiled for {}", plan.output.display());
                    result.success = true;
                } else {
                    match self.encode(run_id, &plan).await {
                        Ok(output) => {
                            result.success = true;
                            result.output = Some(output);
                        }
                        Err((stage, e)) => {
                            result.aborted = matches!(e, Error::Aborted);
                            result.failure = Some(failure(stage, &e));
                        }
                    }
                }
                result.plan = Some(plan);
            }
            Err(e) => {
                self.publish_warnings(run_id, &e.warnings);
                result.failure = Some(failure(e.stage, &e.error));
                result.warnings = e.warnings;
            }
        }

        if let Some(f) = &result.failure {
            tracing::error!("[{}] {}", f.stage, f.message);
        }
        result.elapsed = started.elapsed();
        self.events.publish(
            run_id,
            EventPayload::Finished {
                success: result.success,
                output: result.output.clone(),
            },
        );
        result
    }

    fn publish_warnings(&self, run_id: RunId, warnings: &[String]) {
        for message in warnings {
            self.events.publish(
                run_id,
                EventPayload::Warning {
                    message: message.clone(),
                },
            );
        }
    }

    async fn encode(&self, run_id: RunId, plan: &EncodePlan) -> std::result::Result<PathBuf, (Stage, Error)> {
        let ffmpeg = self
            .tools
            .require("ffmpeg")
            .map_err(|e| (Stage::Preflight, e))?
            .to_path_buf();

        let mut supervisor = Supervisor::new(
            run_id,
            ffmpeg,
            self.config.supervisor.clone(),
            self.events.clone(),
            self.cancellation.clone(),
        );
        supervisor.run(plan).await.map_err(|e| {
            let stage = e.stage().unwrap_or_else(|| supervisor.failed_stage());
            (stage, e)
        })
    }
}

fn failure(stage: Stage, error: &Error) -> Failure {
    Failure {
        stage,
        message: error.to_string(),
        path: error.path().map(Path::to_path_buf),
    }
}
