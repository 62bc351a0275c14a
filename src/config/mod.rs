//! Configuration management for countysync
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream repository configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Tracked file ids (file names without the `.csv` extension)
    #[serde(default = "default_files")]
    pub files: Vec<String>,

    /// Query defaults
    #[serde(default)]
    pub query: QueryConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Upstream repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the commit-history API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL raw files are downloaded from
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    /// Repository owner
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Repository name
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Branch raw files are read from
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Directory inside the repository holding the CSV files
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Region used when none is given
    #[serde(default = "default_region")]
    pub default_region: String,

    /// Parent region used when none is given
    #[serde(default = "default_parent_region")]
    pub default_parent_region: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for countysync data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            files: default_files(),
            query: QueryConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            raw_base_url: default_raw_base_url(),
            owner: default_owner(),
            repository: default_repository(),
            branch: default_branch(),
            directory: default_directory(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_region: default_region(),
            default_parent_region: default_parent_region(),
        }
    }
}

impl UpstreamConfig {
    /// Repository-relative path of a tracked file
    pub fn file_path(&self, file_id: &str) -> String {
        let dir = self.directory.trim_matches('/');
        if dir.is_empty() {
            format!("{}.csv", file_id)
        } else {
            format!("{}/{}.csv", dir, file_id)
        }
    }
}

impl Config {
    /// Get the default base directory for countysync (~/.countysync)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".countysync")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("replica.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("replica.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Override the database location
    pub fn with_db_file(mut self, db_file: PathBuf) -> Self {
        self.paths.db_file = db_file;
        self
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if countysync is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(Error::Config(
                "files must list at least one tracked file".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for file in &self.files {
            if file.trim().is_empty() {
                return Err(Error::Config("files must not contain empty ids".to_string()));
            }
            if !seen.insert(file.as_str()) {
                return Err(Error::Config(format!("duplicate tracked file: {}", file)));
            }
        }

        if self.upstream.owner.is_empty() || self.upstream.repository.is_empty() {
            return Err(Error::Config(
                "upstream.owner and upstream.repository must be set".to_string(),
            ));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(Error::Config(
                "upstream.timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
