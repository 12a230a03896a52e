//! # bf-pipeline
//!
//! Turns an [`EncodePlan`](bf_plan::EncodePlan) into an encoded file.
//!
//! - **[`args`]** renders the plan as a flat ffmpeg argument list.
//! - **[`progress`]** parses ffmpeg's `-progress` key/value stream.
//! - **[`preflight`]** checks the output directory and estimates free space.
//! - **[`Supervisor`]** runs ffmpeg with cancellation, progress events and a
//!   diagnostic tail.
//! - **[`Pipeline`]** chains locate → resolve → compile → preflight → encode
//!   and reports an [`EncodeResult`].

pub mod args;
pub mod preflight;
pub mod progress;
pub mod runner;
pub mod supervisor;

pub use args::ffmpeg_args;
pub use progress::{ProgressParser, ProgressUpdate};
pub use runner::{EncodeResult, Failure, Pipeline, PlanError};
pub use supervisor::Supervisor;
