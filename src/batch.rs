//! Batch mode: encode every disc and media file in a directory, one at a time.

use anyhow::{Context, Result};
use bf_pipeline::{EncodeResult, Pipeline};
use bf_plan::locator::MEDIA_EXTENSIONS;
use std::path::{Path, PathBuf};

/// Disc directories and media files directly inside `dir`, sorted by path.
///
/// A directory counts as a disc when it holds a `BDMV` directory; whether
/// the tree is complete is left to the locator so it can report why not.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read directory: {:?}", dir))?;

    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read directory: {:?}", dir))?
            .path();
        if path.is_dir() {
            if path.join("BDMV").is_dir() {
                inputs.push(path);
            } else {
                tracing::debug!("Skipping {} (no BDMV directory)", path.display());
            }
        } else if is_media_file(&path) {
            inputs.push(path);
        }
    }

    inputs.sort();
    Ok(inputs)
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MEDIA_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(e)))
}

/// Run `pipeline` over each input in order. Stops early once the pipeline's
/// cancellation token fires; the interrupted run is the last result.
pub async fn run_batch(
    pipeline: &Pipeline,
    inputs: &[PathBuf],
    output_dir: &Path,
) -> Vec<(PathBuf, EncodeResult)> {
    let mut results = Vec::with_capacity(inputs.len());

    for (i, input) in inputs.iter().enumerate() {
        if pipeline.cancellation.is_cancelled() {
            tracing::warn!("Batch cancelled; {} input(s) not started", inputs.len() - i);
            break;
        }
        tracing::info!("[{}/{}] {}", i + 1, inputs.len(), input.display());
        let result = pipeline.run(input, output_dir).await;
        results.push((input.clone(), result));
    }

    results
}
