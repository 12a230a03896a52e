//! Main feature detection.
//!
//! A disc carries dozens of playlists: menus, trailers, extras, alternate
//! cuts and decoys that reference the same clips in scrambled orders. The
//! [`FeatureLocator`] parses every playlist, probes each referenced clip once
//! (concurrently, under a per-probe timeout), drops candidates shorter than
//! the configured minimum and ranks the survivors by
//!
//! 1. total duration, longest first;
//! 2. distinct audio tracks, most first;
//! 3. playlist id, lowest first.
//!
//! Ranking only starts once every probe has finished, so probe completion
//! order never influences the result.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bf_core::config::LocatorConfig;
use bf_core::{Error, Result};
use bf_probe::{MediaDescriptor, Prober};
use futures::future::join_all;

use crate::bdmv::{DiscLayout, Playlist};

/// Media file extensions accepted as a single-segment feature.
pub const MEDIA_EXTENSIONS: &[&str] = &["mkv", "mp4", "m2ts", "ts"];

/// One clip within a feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub clip_id: String,
    pub path: PathBuf,
    pub duration: Duration,
}

/// A playlist (or single file) with its probed streams.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCandidate {
    /// Playlist id ("00800") or file stem.
    pub id: String,
    /// Human title of the source, used to name the output.
    pub title: Option<String>,
    pub segments: Vec<Segment>,
    /// Sum of segment durations.
    pub duration: Duration,
    /// Streams of the first segment, with the feature's total duration.
    pub descriptor: MediaDescriptor,
}

impl FeatureCandidate {
    pub fn new(
        id: impl Into<String>,
        title: Option<String>,
        segments: Vec<Segment>,
        mut descriptor: MediaDescriptor,
    ) -> Self {
        let duration = segments.iter().map(|s| s.duration).sum();
        descriptor.duration = Some(duration);
        Self {
            id: id.into(),
            title,
            segments,
            duration,
            descriptor,
        }
    }

    pub fn is_multi_segment(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segments.iter().map(|s| s.path.clone()).collect()
    }

    /// Ordering used to pick the main feature; the best candidate sorts first.
    fn rank_key(&self) -> (std::cmp::Reverse<Duration>, std::cmp::Reverse<usize>, u32, &str) {
        (
            std::cmp::Reverse(self.duration),
            std::cmp::Reverse(self.descriptor.distinct_audio_count()),
            self.id.parse().unwrap_or(u32::MAX),
            self.id.as_str(),
        )
    }
}

/// Sort candidates best-first.
pub fn rank(candidates: &mut [FeatureCandidate]) {
    candidates.sort_by(|a, b| a.rank_key().cmp(&b.rank_key()));
}

/// The chosen feature and the candidates it beat.
#[derive(Debug, Clone)]
pub struct LocatedFeature {
    pub feature: FeatureCandidate,
    /// Survivors after filtering, best first, including the chosen one.
    pub ranked_ids: Vec<String>,
}

/// Picks the main feature from a disc tree or accepts a single media file.
pub struct FeatureLocator<'a> {
    prober: &'a dyn Prober,
    min_duration: Duration,
    probe_timeout: Duration,
}

impl<'a> FeatureLocator<'a> {
    pub fn new(prober: &'a dyn Prober, config: &LocatorConfig) -> Self {
        Self {
            prober,
            min_duration: Duration::from_secs(config.min_duration_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs.max(1)),
        }
    }

    /// Locate the main feature at `input`.
    ///
    /// Dropped playlists and failed probes are appended to `warnings`, which
    /// keeps them even when no feature is found.
    ///
    /// # Errors
    ///
    /// - [`Error::Structure`] when `input` is neither a disc tree nor a media file.
    /// - [`Error::NoFeatureFound`] when no playlist survives probing and filtering.
    /// - [`Error::Probe`] when a single-file input cannot be probed.
    pub async fn locate(&self, input: &Path, warnings: &mut Vec<String>) -> Result<LocatedFeature> {
        if input.is_file() {
            return self.locate_file(input).await;
        }

        let layout = DiscLayout::detect(input)?;
        let (playlists, skipped) = layout.read_playlists()?;
        warnings.extend(skipped);
        let examined = playlists.len();
        tracing::info!("Found {examined} playlist(s) in {}", layout.bdmv.display());

        // Playlists whose declared span is already too short never need probing.
        let mut pending: Vec<(Playlist, Vec<PathBuf>)> = Vec::new();
        for playlist in playlists {
            let declared = playlist.declared_duration();
            if declared > Duration::ZERO && declared < self.min_duration {
                tracing::debug!("Playlist {} too short ({declared:?})", playlist.id);
                continue;
            }
            match resolve_clips(&layout, &playlist) {
                Ok(paths) => pending.push((playlist, paths)),
                Err(missing) => warnings.push(format!(
                    "playlist {} dropped: clip {missing} not found in {}",
                    playlist.id,
                    layout.stream_dir().display()
                )),
            }
        }

        // Each clip is probed once, however many playlists reference it.
        let clips: BTreeMap<String, PathBuf> = pending
            .iter()
            .flat_map(|(pl, paths)| {
                pl.items
                    .iter()
                    .map(|i| i.clip_id.clone())
                    .zip(paths.iter().cloned())
            })
            .collect();
        let probes = self.probe_all(clips).await;

        let title = layout.title();
        let mut candidates = Vec::new();
        for (playlist, paths) in pending {
            match build_candidate(&playlist, &paths, &probes, title.clone()) {
                Ok(candidate) if candidate.duration >= self.min_duration => candidates.push(candidate),
                Ok(candidate) => tracing::debug!(
                    "Playlist {} too short after probing ({:?})",
                    candidate.id,
                    candidate.duration
                ),
                Err(reason) => {
                    warnings.push(format!("playlist {} dropped: {reason}", playlist.id));
                }
            }
        }

        if candidates.is_empty() {
            return Err(Error::NoFeatureFound {
                path: input.to_path_buf(),
                examined,
            });
        }

        rank(&mut candidates);
        let ranked_ids = candidates.iter().map(|c| c.id.clone()).collect();
        let feature = candidates.swap_remove(0);
        tracing::info!(
            "Main feature: playlist {} ({} segment(s), {:?}, {} audio track(s))",
            feature.id,
            feature.segments.len(),
            feature.duration,
            feature.descriptor.audio_count()
        );

        Ok(LocatedFeature { feature, ranked_ids })
    }

    async fn locate_file(&self, input: &Path) -> Result<LocatedFeature> {
        let is_media = input
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| MEDIA_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(e)));
        if !is_media {
            return Err(Error::structure(input, "not a disc tree or a supported media file"));
        }

        let descriptor = self.prober.probe(input).await?;
        let id = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".into());
        let segment = Segment {
            clip_id: id.clone(),
            path: input.to_path_buf(),
            duration: descriptor.duration.unwrap_or_default(),
        };

        Ok(LocatedFeature {
            ranked_ids: vec![id.clone()],
            feature: FeatureCandidate::new(id, None, vec![segment], descriptor),
        })
    }

    /// Probe every clip concurrently; each probe owns its result slot.
    async fn probe_all(
        &self,
        clips: BTreeMap<String, PathBuf>,
    ) -> HashMap<String, std::result::Result<MediaDescriptor, String>> {
        let futures = clips.into_iter().map(|(clip_id, path)| async move {
            let outcome = match tokio::time::timeout(self.probe_timeout, self.prober.probe(&path)).await {
                Ok(Ok(descriptor)) => Ok(descriptor),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "probe of {} timed out after {:?}",
                    path.display(),
                    self.probe_timeout
                )),
            };
            if let Err(reason) = &outcome {
                tracing::debug!("Clip {clip_id}: {reason}");
            }
            (clip_id, outcome)
        });

        join_all(futures).await.into_iter().collect()
    }
}

fn resolve_clips(layout: &DiscLayout, playlist: &Playlist) -> std::result::Result<Vec<PathBuf>, String> {
    playlist
        .items
        .iter()
        .map(|item| layout.clip_path(&item.clip_id).ok_or_else(|| item.clip_id.clone()))
        .collect()
}

fn build_candidate(
    playlist: &Playlist,
    paths: &[PathBuf],
    probes: &HashMap<String, std::result::Result<MediaDescriptor, String>>,
    title: Option<String>,
) -> std::result::Result<FeatureCandidate, String> {
    let mut segments = Vec::with_capacity(playlist.items.len());
    let mut first_descriptor = None;

    for (item, path) in playlist.items.iter().zip(paths) {
        let descriptor = match probes.get(&item.clip_id) {
            Some(Ok(d)) => d,
            Some(Err(reason)) => return Err(format!("clip {}: {reason}", item.clip_id)),
            None => return Err(format!("clip {} was not probed", item.clip_id)),
        };
        let span = item.duration();
        let duration = if span > Duration::ZERO {
            span
        } else {
            descriptor.duration.unwrap_or_default()
        };
        segments.push(Segment {
            clip_id: item.clip_id.clone(),
            path: path.clone(),
            duration,
        });
        first_descriptor.get_or_insert_with(|| descriptor.clone());
    }

    let descriptor = first_descriptor.ok_or_else(|| "playlist has no segments".to_string())?;
    Ok(FeatureCandidate::new(playlist.id.clone(), title, segments, descriptor))
}
