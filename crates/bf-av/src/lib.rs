//! # bf-av
//!
//! External tool plumbing for the bdforge pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find ffmpeg and ffprobe from
//!   configured paths or `PATH`.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support, plus a streaming spawn used for long-running encodes.
//! - **Probe backend** ([`probe::FfprobeProber`]) -- implements
//!   [`bf_probe::Prober`] by shelling out to ffprobe.
//! - **Disk space** ([`disk::available_space`]) -- free bytes on the
//!   filesystem holding a path.

pub mod command;
pub mod disk;
pub mod probe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use probe::FfprobeProber;
pub use tools::{ToolInfo, ToolRegistry};
