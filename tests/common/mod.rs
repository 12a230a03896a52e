//! Shared fixtures for integration tests: MPLS playlists, disc trees and a
//! scripted prober.

#![allow(dead_code)]

use async_trait::async_trait;
use bf_core::{Error, Result};
use bf_probe::{MediaDescriptor, Prober, StreamInfo};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// MPLS time base.
pub const TICKS_PER_SEC: u32 = 45_000;
pub const MINUTE: u32 = 60 * TICKS_PER_SEC;

/// Encode a minimal MPLS file holding `items` as `(clip_id, in, out)`.
pub fn mpls_bytes(items: &[(&str, u32, u32)]) -> Vec<u8> {
    let playlist_start: u32 = 58;
    let mut out = Vec::new();
    out.extend_from_slice(b"MPLS0200");
    out.extend_from_slice(&playlist_start.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.resize(playlist_start as usize, 0);

    let mut body = Vec::new();
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&(items.len() as u16).to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    for (clip, in_time, out_time) in items {
        let mut item = Vec::new();
        item.extend_from_slice(clip.as_bytes());
        item.extend_from_slice(b"M2TS");
        item.extend_from_slice(&[0x00, 0x01]);
        item.push(0);
        item.extend_from_slice(&in_time.to_be_bytes());
        item.extend_from_slice(&out_time.to_be_bytes());
        item.extend_from_slice(&[0u8; 12]);
        body.extend_from_slice(&(item.len() as u16).to_be_bytes());
        body.extend_from_slice(&item);
    }
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// A disc tree inside a temp dir, removed on drop.
pub struct Disc {
    _tmp: TempDir,
    pub root: PathBuf,
}

/// Build `<tmp>/<name>/BDMV/{PLAYLIST,STREAM}` with one `.mpls` per entry
/// and an empty `.m2ts` for every referenced clip. Clip durations are in
/// MPLS ticks.
pub fn disc(name: &str, playlists: &[(&str, Vec<(&str, u32)>)]) -> Disc {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join(name);
    let playlist_dir = root.join("BDMV/PLAYLIST");
    let stream_dir = root.join("BDMV/STREAM");
    std::fs::create_dir_all(&playlist_dir).unwrap();
    std::fs::create_dir_all(&stream_dir).unwrap();

    for (id, items) in playlists {
        let entries: Vec<(&str, u32, u32)> = items.iter().map(|(c, d)| (*c, 0, *d)).collect();
        std::fs::write(playlist_dir.join(format!("{id}.mpls")), mpls_bytes(&entries)).unwrap();
        for (clip, _) in items {
            std::fs::write(stream_dir.join(format!("{clip}.m2ts")), b"").unwrap();
        }
    }
    Disc { _tmp: tmp, root }
}

/// Prober answering from a table keyed by file stem.
pub struct FakeProber {
    by_stem: HashMap<String, Vec<StreamInfo>>,
    default: Vec<StreamInfo>,
    pub calls: AtomicUsize,
}

impl FakeProber {
    /// Every file reports `default` unless overridden with [`FakeProber::with`].
    pub fn new(default: Vec<StreamInfo>) -> Self {
        Self {
            by_stem: HashMap::new(),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, stem: &str, streams: Vec<StreamInfo>) -> Self {
        self.by_stem.insert(stem.to_string(), streams);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, path: &Path) -> Result<MediaDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| Error::probe(path, "no file name"))?;
        let streams = self.by_stem.get(&stem).unwrap_or(&self.default).clone();
        Ok(MediaDescriptor::new(path, Some(Duration::from_secs(1)), streams))
    }
}

/// 4K 10-bit HEVC plus one English AC-3 track.
pub fn basic_streams() -> Vec<StreamInfo> {
    vec![
        StreamInfo::video(0, "hevc", 3840, 2160, 10),
        StreamInfo::audio(1, "ac3", Some("eng"), 6),
    ]
}

/// Video plus `n` audio tracks cycling through a few languages.
pub fn streams_with_audio(n: usize) -> Vec<StreamInfo> {
    let langs = ["eng", "fra", "deu", "spa", "ita", "jpn"];
    let mut streams = vec![StreamInfo::video(0, "hevc", 3840, 2160, 10)];
    for i in 0..n {
        streams.push(StreamInfo::audio(i as u32 + 1, "ac3", Some(langs[i % langs.len()]), 6));
    }
    streams
}

/// Write an executable shell script standing in for ffmpeg. `$last` holds
/// the output path.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    let script = format!("#!/bin/sh\nfor last; do :; done\n{body}\n");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
