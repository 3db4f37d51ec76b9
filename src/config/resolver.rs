//! Precedence resolution for the config file location and the storage root.
//!
//! ## Config file (highest to lowest)
//!
//! 1. `--config` flag
//! 2. `CMIRROR_CONFIG` environment variable
//! 3. `~/.config/connected-mirror/connections.kdl`
//!
//! ## Storage root (highest to lowest)
//!
//! 1. `--data-dir` flag
//! 2. `CMIRROR_DATA_DIR` environment variable
//! 3. `storage-root` in the config file
//! 4. `~/.local/share/connected-mirror`

use kdl::KdlDocument;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::schema::{ConnectionConfig, MirrorConfig};
use crate::api::http::DEFAULT_TIMEOUT;
use crate::storage::default_storage_root;
use crate::{Error, Result};

/// Environment variable overriding the storage root.
pub const DATA_DIR_ENV: &str = "CMIRROR_DATA_DIR";
/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "CMIRROR_CONFIG";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    CliFlag,
    EnvVar(String),
    ConfigFile,
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

/// Everything a command needs to locate and reach connections.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub config_path: Resolved<PathBuf>,
    pub storage_root: Resolved<PathBuf>,
    pub config: MirrorConfig,
}

impl ResolvedSettings {
    /// The declared connection with this id.
    pub fn connection(&self, id: &str) -> Result<&ConnectionConfig> {
        self.config.connection(id).ok_or_else(|| {
            Error::Config(format!(
                "Unknown connection '{}' (not declared in {})",
                id,
                self.config_path.value.display()
            ))
        })
    }

    pub fn http_timeout(&self) -> Duration {
        self.config
            .http_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Locate the config file.
pub fn resolve_config_path(overrides: &ConfigOverrides) -> Result<Resolved<PathBuf>> {
    if let Some(ref path) = overrides.config_path {
        return Ok(Resolved::new(path.clone(), ValueSource::CliFlag));
    }
    if let Some(path) = env_path(CONFIG_ENV) {
        return Ok(Resolved::new(path, ValueSource::EnvVar(CONFIG_ENV.to_string())));
    }
    let config_dir =
        dirs::config_dir().ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    Ok(Resolved::new(
        config_dir.join("connected-mirror").join("connections.kdl"),
        ValueSource::Default,
    ))
}

/// Read and validate a config file. A missing file is an empty config.
pub fn load_config(path: &Path) -> Result<MirrorConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MirrorConfig::default()),
        Err(e) => return Err(e.into()),
    };
    let doc: KdlDocument = content
        .parse()
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    let config = MirrorConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))?;
    Ok(config)
}

/// Locate the storage root.
pub fn resolve_storage_root(overrides: &ConfigOverrides, config: &MirrorConfig) -> Result<Resolved<PathBuf>> {
    if let Some(ref dir) = overrides.data_dir {
        return Ok(Resolved::new(dir.clone(), ValueSource::CliFlag));
    }
    if let Some(dir) = env_path(DATA_DIR_ENV) {
        return Ok(Resolved::new(dir, ValueSource::EnvVar(DATA_DIR_ENV.to_string())));
    }
    if let Some(ref dir) = config.storage_root {
        return Ok(Resolved::new(dir.clone(), ValueSource::ConfigFile));
    }
    Ok(Resolved::new(default_storage_root()?, ValueSource::Default))
}

/// Resolve the config file, its content and the storage root.
pub fn resolve(overrides: &ConfigOverrides) -> Result<ResolvedSettings> {
    let config_path = resolve_config_path(overrides)?;
    let config = load_config(&config_path.value)?;
    let storage_root = resolve_storage_root(overrides, &config)?;
    Ok(ResolvedSettings {
        config_path,
        storage_root,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("connections.kdl");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_config_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.kdl")).unwrap();
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_invalid_kdl_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "connection \"x\" {");
        assert!(matches!(load_config(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_values_are_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "connection \"x\" { url \"ftp://nope\" }");
        match load_config(&path) {
            Err(Error::Config(msg)) => assert!(msg.contains("http(s) url")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_storage_root_precedence() {
        let config = MirrorConfig {
            storage_root: Some(PathBuf::from("/from/config")),
            ..Default::default()
        };
        // SAFETY: env access is serialized by #[serial]
        unsafe { std::env::remove_var(DATA_DIR_ENV) };

        let resolved = resolve_storage_root(&ConfigOverrides::default(), &config).unwrap();
        assert_eq!(resolved, Resolved::new(PathBuf::from("/from/config"), ValueSource::ConfigFile));

        unsafe { std::env::set_var(DATA_DIR_ENV, "/from/env") };
        let resolved = resolve_storage_root(&ConfigOverrides::default(), &config).unwrap();
        assert_eq!(resolved.source, ValueSource::EnvVar(DATA_DIR_ENV.to_string()));
        assert_eq!(resolved.value, PathBuf::from("/from/env"));

        let overrides = ConfigOverrides {
            data_dir: Some(PathBuf::from("/from/flag")),
            ..Default::default()
        };
        let resolved = resolve_storage_root(&overrides, &config).unwrap();
        assert_eq!(resolved, Resolved::new(PathBuf::from("/from/flag"), ValueSource::CliFlag));

        unsafe { std::env::remove_var(DATA_DIR_ENV) };
    }

    #[test]
    #[serial]
    fn test_config_path_from_env() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "connection \"local\" { url \"http://localhost:9000\" }");
        unsafe { std::env::set_var(CONFIG_ENV, &path) };

        let settings = resolve(&ConfigOverrides {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(settings.config_path.source, ValueSource::EnvVar(CONFIG_ENV.to_string()));
        assert_eq!(settings.connection("local").unwrap().url, "http://localhost:9000");
        assert!(matches!(settings.connection("other"), Err(Error::Config(_))));
        assert_eq!(settings.http_timeout(), DEFAULT_TIMEOUT);

        unsafe { std::env::remove_var(CONFIG_ENV) };
    }
}
