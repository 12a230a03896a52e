//! Configuration file discovery and loading.

use anyhow::{Context, Result};
use bf_core::config::EncodingConfig;
use std::path::{Path, PathBuf};

/// Searched in order when no `--config` is given.
pub const DEFAULT_PATHS: &[&str] = &["./bdforge.toml", "~/.config/bdforge/config.toml"];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<EncodingConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = EncodingConfig::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

/// The first default location that exists.
pub fn find_config() -> Option<PathBuf> {
    DEFAULT_PATHS.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Load config from `custom_path`, the default locations, or built-in defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<EncodingConfig> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_config() {
        Some(path) => {
            tracing::debug!("Using config file {}", path.display());
            load_config(&path)
        }
        None => Ok(EncodingConfig::default()),
    }
}

/// Write the default configuration to `path`.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to replace it)", path);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let content = EncodingConfig::default().to_toml()?;
    std::fs::write(path, content).with_context(|| format!("Failed to write config file: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::config::Setting;

    #[test]
    fn written_defaults_load_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("conf/bdforge.toml");
        write_default_config(&path, false).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config, EncodingConfig::default());
    }

    #[test]
    fn refuses_to_replace_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bdforge.toml");
        std::fs::write(&path, "video_crf = 18\n").unwrap();

        assert!(write_default_config(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "video_crf = 18\n");

        write_default_config(&path, true).unwrap();
        assert_eq!(load_config(&path).unwrap().video_crf, Setting::Auto);
    }

    #[test]
    fn invalid_values_are_rejected_with_the_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "video_crf = 180\n").unwrap();

        let err = load_config(&path).unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("bad.toml"), "{chain}");
        assert!(chain.contains("0..=100"), "{chain}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("typo.toml");
        std::fs::write(&path, "video_codex = \"libx265\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config_or_default(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }
}
