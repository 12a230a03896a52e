//! bf-core: shared error type, configuration, media enums and the event bus.
//!
//! Every other bf-* crate depends on this one. It owns the vocabulary the
//! analysis stages and the execution supervisor share, but no behaviour
//! beyond parsing and validating configuration.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result, Stage};
pub use ids::*;
pub use media::*;
