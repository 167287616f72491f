//! Typed configuration of a backup run.
//!
//! ```yaml
//! mysql:
//!   host: localhost        # default
//!   port: 3306             # default
//!   username: backup
//!   password: secret
//!   compress: true         # default
//!   databases: [shop, wiki]
//! backup:
//!   root_path: /srv/backups
//! file_backups:
//!   sources: [/etc/important-configs]
//! tools:                   # optional
//!   timeout_secs: 3600
//! ```
//!
//! Files ending in `.toml` are read as TOML with the same structure.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use derive_more::{Display, Error, From};
use regex::Regex;
use serde::{Deserialize, Deserializer};

/// Database names end up in file names, so only a safe subset is accepted.
static DATABASE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w$-]+$").expect("database name pattern should be valid"));

/// Configuration of a backup run, validated on [load](BackupConfig::load).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BackupConfig {
    /// Databases to dump. Absent means no database backups.
    #[serde(default)]
    pub mysql: Option<MysqlConfig>,

    pub backup: BackupSection,

    #[serde(default)]
    pub file_backups: FileBackups,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MysqlConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    /// Handed to the dump tool through its environment, never on the command line.
    #[serde(default)]
    pub password: Option<String>,

    /// Gzip the dumps.
    #[serde(default = "default_compress")]
    pub compress: bool,

    /// Dumped in this order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub databases: Vec<String>,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            compress: default_compress(),
            databases: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_compress() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BackupSection {
    /// Absolute directory all backups are written below.
    pub root_path: PathBuf,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct FileBackups {
    /// Absolute paths archived in this order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<PathBuf>,
}

/// External executables and how long they may run.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_mysqldump")]
    pub mysqldump: String,

    #[serde(default = "default_tar")]
    pub tar: String,

    /// Kill a tool running longer than this. Absent waits forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mysqldump: default_mysqldump(),
            tar: default_tar(),
            timeout_secs: None,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_mysqldump() -> String {
    "mysqldump".to_string()
}

fn default_tar() -> String {
    "tar".to_string()
}

/// `key:` without a value reads as the default instead of failing.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Display, Error, From)]
/// The configuration can't be used. Fatal for the whole run.
pub enum ConfigError {
    #[display("Configuration file {} can't be read: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[display("Configuration file is empty: {}", _0.display())]
    Empty(#[error(ignore)] PathBuf),

    #[display("Malformed YAML configuration: {_0}")]
    #[from]
    Yaml(serde_yaml::Error),

    #[display("Malformed TOML configuration: {_0}")]
    #[from]
    Toml(toml::de::Error),

    #[display("backup.root_path must be an absolute path, got {:?}", _0.display().to_string())]
    RootPath(#[error(ignore)] PathBuf),

    #[display("Invalid database name: {_0:?}")]
    DatabaseName(#[error(ignore)] String),

    #[display("file_backups.sources must be absolute paths, got {:?}", _0.display().to_string())]
    RelativeSource(#[error(ignore)] PathBuf),
}

impl BackupConfig {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!(target: "config", "Reading configuration from {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Err(ConfigError::Empty(path.to_path_buf()));
        }

        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let root = &self.backup.root_path;
        if root.as_os_str().is_empty() || root.is_relative() {
            return Err(ConfigError::RootPath(root.clone()));
        }

        if let Some(name) = self
            .databases()
            .iter()
            .find(|name| !DATABASE_NAME.is_match(name))
        {
            return Err(ConfigError::DatabaseName(name.clone()));
        }

        if let Some(source) = self.file_sources().iter().find(|s| s.is_relative()) {
            return Err(ConfigError::RelativeSource(source.clone()));
        }

        if self.databases().is_empty() && self.file_sources().is_empty() {
            log::warn!(target: "config", "Neither databases nor file sources configured, nothing to back up");
        }

        Ok(())
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup.root_path
    }

    /// Configured databases, empty if there is no `mysql` section.
    pub fn databases(&self) -> &[String] {
        self.mysql
            .as_ref()
            .map(|mysql| mysql.databases.as_slice())
            .unwrap_or_default()
    }

    pub fn file_sources(&self) -> &[PathBuf] {
        &self.file_backups.sources
    }
}
