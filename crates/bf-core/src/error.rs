//! Unified error type for the bdforge pipeline.
//!
//! All library crates funnel their failures into [`Error`]. Each variant knows
//! which pipeline [`Stage`] normally produces it, so operators can tell a bad
//! source apart from a bad configuration or a failing encoder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// The pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configure,
    Probe,
    Locate,
    Compile,
    Preflight,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configure => write!(f, "configure"),
            Self::Probe => write!(f, "probe"),
            Self::Locate => write!(f, "locate"),
            Self::Compile => write!(f, "compile"),
            Self::Preflight => write!(f, "preflight"),
            Self::Encode => write!(f, "encode"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Unified error type covering all failure modes in bdforge.
///
/// There is deliberately no variant for unsupported HDR metadata: the HDR
/// resolver degrades to a safer profile and records a warning instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input is neither a recognizable disc tree nor a media file.
    #[error("Unrecognized disc structure at {}: {reason}", path.display())]
    Structure {
        /// The directory that was inspected.
        path: PathBuf,
        /// What was missing.
        reason: String,
    },

    /// No playlist survived probing and duration filtering.
    #[error("No main feature found in {} ({examined} playlist(s) examined)", path.display())]
    NoFeatureFound {
        /// The disc root.
        path: PathBuf,
        /// Number of playlists considered before filtering.
        examined: usize,
    },

    /// Configuration contradicts the encoder capability table.
    #[error("Plan conflict [{field}]: {message}")]
    PlanConflict {
        /// The configuration field at fault.
        field: String,
        /// Human-readable description of the contradiction.
        message: String,
    },

    /// The resolved output path already exists and overwrite is off.
    #[error("Output already exists: {}", path.display())]
    OutputCollision {
        /// The colliding output path.
        path: PathBuf,
    },

    /// Preflight estimated more output than the filesystem can hold.
    #[error(
        "Insufficient space at {}: need ~{} MiB, {} MiB available",
        path.display(),
        required / (1024 * 1024),
        available / (1024 * 1024)
    )]
    InsufficientSpace {
        /// The output directory that was checked.
        path: PathBuf,
        /// Estimated bytes required.
        required: u64,
        /// Bytes available to unprivileged users.
        available: u64,
    },

    /// The encoder process exited unsuccessfully.
    #[error("Encoder exited with {status}:\n{tail}")]
    Encoder {
        /// Exit status description.
        status: String,
        /// Last lines of the encoder's diagnostic output.
        tail: String,
    },

    /// An I/O operation on a specific path failed.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled by the user.
    #[error("Encode aborted by user")]
    Aborted,

    /// Media probing failed for one file.
    #[error("Probe error [{}]: {message}", path.display())]
    Probe {
        /// The file being probed.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool (ffmpeg, ffprobe) could not be run or failed.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Configuration could not be parsed or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The stage this error is attributed to, when the variant alone decides it.
    ///
    /// `Io` and `Tool` can occur in several stages; callers that know where
    /// they are record the stage themselves.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Config(_) => Some(Stage::Configure),
            Error::Probe { .. } => Some(Stage::Probe),
            Error::Structure { .. } | Error::NoFeatureFound { .. } => Some(Stage::Locate),
            Error::PlanConflict { .. } | Error::OutputCollision { .. } => Some(Stage::Compile),
            Error::InsufficientSpace { .. } => Some(Stage::Preflight),
            Error::Encoder { .. } | Error::Aborted => Some(Stage::Encode),
            Error::Io { .. } | Error::Tool { .. } => None,
        }
    }

    /// The file or directory implicated by this error, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Structure { path, .. }
            | Error::NoFeatureFound { path, .. }
            | Error::OutputCollision { path }
            | Error::InsufficientSpace { path, .. }
            | Error::Io { path, .. }
            | Error::Probe { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Convenience constructor for [`Error::Structure`].
    pub fn structure(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Structure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::PlanConflict`].
    pub fn conflict(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::PlanConflict {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Convenience constructor for [`Error::Probe`].
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
