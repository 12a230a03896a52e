//! Free-space queries for preflight checks.

use std::path::Path;

/// Bytes available to unprivileged users on the filesystem holding `path`.
///
/// Returns `Ok(None)` on platforms without `statvfs`, where the caller is
/// expected to skip the space check.
#[cfg(unix)]
pub fn available_space(path: &Path) -> bf_core::Result<Option<u64>> {
    let stat = nix::sys::statvfs::statvfs(path)
        .map_err(|e| bf_core::Error::io(path, std::io::Error::from(e)))?;
    #[allow(clippy::unnecessary_cast)]
    let bytes = stat.blocks_available() as u64 * stat.fragment_size() as u64;
    Ok(Some(bytes))
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> bf_core::Result<Option<u64>> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn reports_space_for_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let space = available_space(dir.path()).unwrap();
        assert!(space.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn missing_path_is_io_error() {
        let err = available_space(Path::new("/nonexistent/bdforge/xyz")).unwrap_err();
        assert!(matches!(err, bf_core::Error::Io { .. }));
    }
}
