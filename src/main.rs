mod cli;

use bdforge::observer::{self, clock, Observer};
use bdforge::{batch, config};
use bf_av::{FfprobeProber, ToolCommand, ToolRegistry};
use bf_core::config::EncodingConfig;
use bf_core::events::EventBus;
use bf_pipeline::{ffmpeg_args, EncodeResult, Pipeline};
use bf_plan::EncodePlan;
use bf_core::StreamKind;
use bf_probe::{MediaDescriptor, Prober};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Conventional exit status after SIGINT.
const EXIT_ABORTED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "bdforge=debug,bf_core=debug,bf_probe=debug,bf_av=debug,bf_plan=debug,bf_pipeline=debug"
                .to_string()
        } else {
            "info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Encode {
            input,
            output,
            dry_run,
            overwrite,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(encode(&input, &output, cli.config.as_deref(), dry_run, overwrite))
        }
        Commands::Batch {
            input_dir,
            output_dir,
            dry_run,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_batch(&input_dir, &output_dir, cli.config.as_deref(), dry_run))
        }
        Commands::Probe { path, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&path, cli.config.as_deref(), json))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::InitConfig { path, force } => {
            config::write_default_config(&path, force)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => {
            println!("bdforge {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Build a pipeline whose cancellation token is wired to Ctrl-C.
fn build_pipeline(config: EncodingConfig, dry_run: bool) -> Result<Pipeline> {
    let tools = ToolRegistry::discover(&config);
    let ffprobe = tools
        .require("ffprobe")
        .context("ffprobe is required to analyse inputs")?
        .to_path_buf();
    let prober: Arc<dyn Prober> = Arc::new(FfprobeProber::new(ffprobe));

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping");
            on_interrupt.cancel();
        }
    });

    Ok(Pipeline::new(Arc::new(config), prober, Arc::new(tools))
        .with_dry_run(dry_run)
        .with_cancellation(token)
        .with_events(EventBus::default()))
}

async fn encode(
    input: &Path,
    output_dir: &Path,
    config_path: Option<&Path>,
    dry_run: bool,
    overwrite: bool,
) -> Result<ExitCode> {
    let mut config = config::load_config_or_default(config_path)?;
    if overwrite {
        config.supervisor.overwrite = true;
    }

    let pipeline = build_pipeline(config, dry_run)?;
    let observer = Observer::spawn(&pipeline.events, observer::log_event);
    let result = pipeline.run(input, output_dir).await;
    observer.finish().await;

    report(&pipeline, input, &result);
    Ok(exit_code(std::slice::from_ref(&result)))
}

async fn run_batch(
    input_dir: &Path,
    output_dir: &Path,
    config_path: Option<&Path>,
    dry_run: bool,
) -> Result<ExitCode> {
    let config = config::load_config_or_default(config_path)?;
    let inputs = batch::discover_inputs(input_dir)?;
    if inputs.is_empty() {
        anyhow::bail!("No disc directories or media files found in {:?}", input_dir);
    }
    tracing::info!("Found {} input(s) in {}", inputs.len(), input_dir.display());

    let pipeline = build_pipeline(config, dry_run)?;
    let observer = Observer::spawn(&pipeline.events, observer::log_event);
    let results = batch::run_batch(&pipeline, &inputs, output_dir).await;
    observer.finish().await;

    for (input, result) in &results {
        report(&pipeline, input, result);
    }

    let succeeded = results.iter().filter(|(_, r)| r.success).count();
    println!(
        "\nBatch complete: {} succeeded, {} failed, {} not started",
        succeeded,
        results.len() - succeeded,
        inputs.len() - results.len()
    );

    let results: Vec<EncodeResult> = results.into_iter().map(|(_, r)| r).collect();
    Ok(exit_code(&results))
}

fn report(pipeline: &Pipeline, input: &Path, result: &EncodeResult) {
    println!("\n{}", input.display());
    if pipeline.dry_run {
        if let Some(plan) = &result.plan {
            print_plan(pipeline, plan);
        }
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }

    match (&result.failure, &result.output) {
        (Some(failure), _) => {
            println!("  [{}] {}", failure.stage, failure.message);
        }
        (None, Some(output)) => {
            println!("  encoded {} in {:.0?}", output.display(), result.elapsed);
        }
        (None, None) => {}
    }
}

fn print_plan(pipeline: &Pipeline, plan: &EncodePlan) {
    println!("  Feature: {} ({})", plan.feature_id, clock(plan.duration.as_secs_f64()));
    println!("  Input: {}", plan.input.to_ffmpeg_input());
    println!("  Output: {}", plan.output.display());
    println!(
        "  Video: {} crf {} {}-bit {}",
        plan.video.codec,
        plan.video.crf,
        plan.video.bit_depth,
        plan.video.preset.as_deref().unwrap_or("")
    );
    println!("  HDR: {}", plan.hdr.format());
    println!(
        "  Audio: {:?}  Subtitles: {:?}",
        plan.tracks.audio_indices().collect::<Vec<_>>(),
        plan.tracks.subtitle_indices().collect::<Vec<_>>()
    );

    let ffmpeg = pipeline
        .tools
        .require("ffmpeg")
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from("ffmpeg"));
    let mut cmd = ToolCommand::new(ffmpeg);
    cmd.args(ffmpeg_args(plan));
    println!("\n[DRY RUN] {}", cmd.display());
}

/// 130 if any run was aborted, 1 if any failed, else 0.
fn exit_code(results: &[EncodeResult]) -> ExitCode {
    if results.iter().any(|r| r.aborted) {
        ExitCode::from(EXIT_ABORTED)
    } else if results.iter().all(|r| r.success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn probe_file(path: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("File does not exist: {:?}", path);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config);
    let prober = FfprobeProber::new(tools.require("ffprobe")?.to_path_buf());
    let media = prober.probe(path).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&media)?);
    } else {
        print_media(&media);
    }
    Ok(())
}

fn print_media(media: &MediaDescriptor) {
    println!("File: {}", media.path.display());
    if let Some(duration) = media.duration {
        println!("Duration: {}", clock(duration.as_secs_f64()));
    }

    println!("\nVideo Tracks: {}", media.streams_of(StreamKind::Video).count());
    for track in media.streams_of(StreamKind::Video) {
        print!(
            "  [{}] {} {}x{}",
            track.index,
            track.codec,
            track.width.unwrap_or(0),
            track.height.unwrap_or(0)
        );
        if let Some(bits) = track.bit_depth {
            print!(", {} bit", bits);
        }
        println!();
        let (profile, _) = bf_plan::hdr::detect(track);
        if profile.is_hdr() {
            println!("      HDR: {}", profile.format());
        }
        if let Some(ref dv) = track.side_data.dolby_vision {
            println!(
                "      Dolby Vision: Profile {} (RPU: {}, EL: {}, BL: {})",
                dv.profile, dv.rpu_present, dv.el_present, dv.bl_present
            );
        }
    }

    println!("\nAudio Tracks: {}", media.audio_count());
    for track in media.streams_of(StreamKind::Audio) {
        print!("  [{}] {}", track.index, track.codec);
        if let Some(channels) = track.channels {
            print!(" {}ch", channels);
        }
        if let Some(ref lang) = track.language {
            print!(" ({})", lang);
        }
        if track.is_commentary() {
            print!(" [commentary]");
        }
        if track.disposition.default {
            print!(" [default]");
        }
        println!();
    }

    println!("\nSubtitle Tracks: {}", media.streams_of(StreamKind::Subtitle).count());
    for track in media.streams_of(StreamKind::Subtitle) {
        print!("  [{}] {}", track.index, track.codec);
        if let Some(ref lang) = track.language {
            print!(" ({})", lang);
        }
        if track.disposition.forced {
            print!(" [forced]");
        }
        println!();
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<ExitCode> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Some tools are missing. Install ffmpeg to encode.");
        Ok(ExitCode::FAILURE)
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let (config, source) = match path {
        Some(p) => (config::load_config(p)?, p.display().to_string()),
        None => match config::find_config() {
            Some(p) => (config::load_config(&p)?, p.display().to_string()),
            None => (EncodingConfig::default(), "built-in defaults".to_string()),
        },
    };

    println!("✓ Configuration is valid ({})", source);
    println!("  Video codec: {}", config.video_codec);
    println!("  Preferred languages: {}", config.languages().join(", "));
    println!(
        "  HDR: preserve={} preferred={} fallback={}",
        config.preserve_hdr, config.hdr_settings.preferred_format, config.hdr_settings.fallback_format
    );
    for warning in config.warnings() {
        println!("  warning: {warning}");
    }
    Ok(())
}
