//! Bootstrap configuration and root folder resolution
//!
//! Configuration is split in two:
//! 1. **Root folder**: where the database and the bootstrap TOML live
//! 2. **TOML bootstrap**: port, logging, classifier endpoint, tokens
//!
//! # Root folder priority
//!
//! 1. Command-line argument (highest priority)
//! 2. `AYU_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the user-level TOML file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup: a warning is logged
//! and compiled defaults are used instead.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "AYU_ROOT_FOLDER";

/// File name of the bootstrap TOML file
pub const CONFIG_FILE_NAME: &str = "ayusethu.toml";

/// File name of the SQLite database inside the root folder
pub const DATABASE_FILE_NAME: &str = "ayusethu.db";

/// Compiled-in defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            log_file: None,
            host: "127.0.0.1".to_string(),
            port: 5741,
        }
    }
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/ayusethu (or /var/lib/ayusethu for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("ayusethu"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ayusethu"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("ayusethu"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ayusethu"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("ayusethu"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ayusethu"))
    } else {
        PathBuf::from("./ayusethu_data")
    }
}

/// User-level TOML file consulted for `root_folder` (priority 3)
fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("ayusethu").join(CONFIG_FILE_NAME))
        .filter(|p| p.exists())
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Supply the `--root-folder` command-line value, if any
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("{}: root folder from command line: {}", self.module_name, path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                info!("{}: root folder from {}: {}", self.module_name, ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(config_path) = user_config_file() {
            match TomlConfig::load(&config_path) {
                Ok(config) => {
                    if let Some(root) = config.root_folder {
                        info!(
                            "{}: root folder from {}: {}",
                            self.module_name,
                            config_path.display(),
                            root.display()
                        );
                        return root;
                    }
                }
                Err(e) => warn!("{}: ignoring unreadable config file: {}", self.module_name, e),
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and names the files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root_folder.join(CONFIG_FILE_NAME)
    }
}

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional in the file; accessors fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Upper bound for submission/approval requests (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Content hash algorithm used for photo integrity binding
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,

    /// Broadcast capacity of the event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Bearer tokens provisioned at startup
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Species classification (leaf verification) service settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Full URL of the classification endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token presented to the classification service
    #[serde(default)]
    pub bearer_token: Option<String>,

    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bearer_token: None,
            timeout_secs: default_classifier_timeout_secs(),
        }
    }
}

/// One provisioned API token
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub user_id: String,
    pub role: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_classifier_timeout_secs() -> u64 {
    20
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_hash_algorithm() -> String {
    "sha256".to_string()
}

fn default_event_capacity() -> usize {
    100
}

impl TomlConfig {
    /// Parse a TOML file; errors if the file is missing or malformed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the file, or warn and fall back to defaults
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            warn!("Config file not found at {}, using defaults", path.display());
            return Self::default_values();
        }
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded config file: {}", path.display());
                config
            }
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default_values()
            }
        }
    }

    /// Defaults as they would be after deserializing an empty file
    pub fn default_values() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            hash_algorithm: default_hash_algorithm(),
            event_capacity: default_event_capacity(),
            ..Self::default()
        }
    }

    pub fn host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().host)
    }

    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().port)
    }
}
