//! Blu-ray (BDMV) directory layout.
//!
//! A disc tree looks like:
//!
//! ```text
//! The.Movie.2019/
//!   BDMV/
//!     PLAYLIST/00800.mpls ...
//!     STREAM/00800.m2ts ...
//! ```
//!
//! [`DiscLayout::detect`] accepts either the disc root or the `BDMV` directory
//! itself and fails with [`bf_core::Error::Structure`] when the playlist and
//! stream directories are not both present.

pub mod mpls;

use std::path::{Path, PathBuf};
use std::time::Duration;

use bf_core::{Error, Result};

pub use mpls::{MplsError, PlayItem};

/// A parsed playlist file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    /// File stem, e.g. "00800".
    pub id: String,
    pub path: PathBuf,
    pub items: Vec<PlayItem>,
}

impl Playlist {
    /// Sum of the PlayItem spans as declared by the playlist.
    pub fn declared_duration(&self) -> Duration {
        self.items.iter().map(PlayItem::duration).sum()
    }

    /// Numeric sort key; non-numeric ids sort last.
    pub fn sort_key(&self) -> (u32, &str) {
        (self.id.parse().unwrap_or(u32::MAX), self.id.as_str())
    }
}

/// A recognized disc tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscLayout {
    /// Directory containing `BDMV`.
    pub root: PathBuf,
    pub bdmv: PathBuf,
}

impl DiscLayout {
    /// Recognize a disc tree at `input` (the disc root or its `BDMV` dir).
    pub fn detect(input: &Path) -> Result<Self> {
        if !input.is_dir() {
            return Err(Error::structure(input, "not a directory"));
        }

        let is_bdmv_dir = input
            .file_name()
            .is_some_and(|n| n.eq_ignore_ascii_case("BDMV"));

        let (root, bdmv) = if is_bdmv_dir {
            let root = input.parent().unwrap_or(input).to_path_buf();
            (root, input.to_path_buf())
        } else {
            (input.to_path_buf(), input.join("BDMV"))
        };

        if !bdmv.is_dir() {
            return Err(Error::structure(input, "no BDMV directory"));
        }
        let layout = Self { root, bdmv };
        if !layout.playlist_dir().is_dir() {
            return Err(Error::structure(input, "missing BDMV/PLAYLIST"));
        }
        if !layout.stream_dir().is_dir() {
            return Err(Error::structure(input, "missing BDMV/STREAM"));
        }
        Ok(layout)
    }

    pub fn playlist_dir(&self) -> PathBuf {
        self.bdmv.join("PLAYLIST")
    }

    pub fn stream_dir(&self) -> PathBuf {
        self.bdmv.join("STREAM")
    }

    /// Path of a clip's transport stream, if it exists.
    pub fn clip_path(&self, clip_id: &str) -> Option<PathBuf> {
        let dir = self.stream_dir();
        [format!("{clip_id}.m2ts"), format!("{clip_id}.M2TS")]
            .into_iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    }

    /// Human title from the disc folder name: dots and underscores become
    /// spaces. `None` when the folder name is empty or unusable.
    pub fn title(&self) -> Option<String> {
        let name = self.root.file_name()?.to_string_lossy();
        let title = name
            .replace(['.', '_'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (!title.is_empty()).then_some(title)
    }

    /// Read and parse every playlist, sorted by id.
    ///
    /// Unreadable or malformed playlists are skipped and reported in the
    /// returned warnings.
    pub fn read_playlists(&self) -> Result<(Vec<Playlist>, Vec<String>)> {
        let dir = self.playlist_dir();
        let entries = std::fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?;

        let mut playlists = Vec::new();
        let mut warnings = Vec::new();

        for entry in entries {
            let path = entry.map_err(|e| Error::io(&dir, e))?.path();
            let is_mpls = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("mpls"));
            if !is_mpls {
                continue;
            }
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();

            let parsed = std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| mpls::parse(&bytes).map_err(|e| e.to_string()));

            match parsed {
                Ok(items) => playlists.push(Playlist { id, path, items }),
                Err(reason) => {
                    tracing::debug!("Skipping playlist {}: {reason}", path.display());
                    warnings.push(format!("playlist {id} skipped: {reason}"));
                }
            }
        }

        playlists.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok((playlists, warnings))
    }
}
