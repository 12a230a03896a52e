//! bf-plan: the media analysis and encode plan engine.
//!
//! Stages, leaf first:
//!
//! - [`bdmv`] parses the Blu-ray directory layout and its MPLS playlists.
//! - [`locator`] probes playlist segments and picks the main feature.
//! - [`hdr`] classifies HDR metadata and resolves the target HDR mode.
//! - [`tracks`] ranks audio and subtitle streams by language preference.
//! - [`compiler`] merges everything with configuration into an [`EncodePlan`].
//!
//! Every stage returns a fresh value; nothing here mutates another stage's
//! output or runs the encoder.

pub mod bdmv;
pub mod capabilities;
pub mod compiler;
pub mod hdr;
pub mod locator;
pub mod plan;
pub mod tracks;

pub use capabilities::EncoderCapabilities;
pub use compiler::compile;
pub use hdr::{HdrProfile, HdrResolution, StaticMetadata};
pub use locator::{FeatureCandidate, FeatureLocator, LocatedFeature, Segment};
pub use plan::{AudioMode, EncodePlan, InputSource, VideoParams};
pub use tracks::{MatchRule, SelectedTrack, TrackSelection};
