//! The [`Prober`] trait defining the interface for media file probing.

use std::path::Path;

use async_trait::async_trait;

use crate::types::MediaDescriptor;

/// A media file prober.
///
/// Implementations must be safe to share across tasks: the feature locator
/// probes many clip segments concurrently through one prober.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Probe a media file and describe its streams.
    ///
    /// Missing optional metadata is not an error; only an unreadable file or
    /// unparseable tool output is.
    async fn probe(&self, path: &Path) -> bf_core::Result<MediaDescriptor>;
}
