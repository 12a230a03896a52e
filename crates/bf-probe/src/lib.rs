//! bf-probe: the normalized media descriptor and the probing interface.
//!
//! This crate defines what the analysis stages know about a media file
//! ([`MediaDescriptor`]) and the [`Prober`] trait that produces it. The
//! ffprobe-backed implementation lives in `bf-av`; tests substitute their own.

pub mod prober;
pub mod types;

pub use prober::Prober;
pub use types::*;
