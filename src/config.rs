//! Configuration system for ghprune.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Conservative defaults built into the binary
//! 2. **User config file** - `~/.config/ghprune/config.toml`
//! 3. **Environment variables** - `GHPRUNE_*` prefix, plus `GITHUB_TOKEN`
//!    and `GITHUB_USERNAME`
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [github]
//! username = "octocat"
//! per_page = 100
//!
//! [batch]
//! max_unfollows_per_run = 50
//! request_delay_ms = 1000
//!
//! [output]
//! format = "text"
//! colors = true
//! ```
//!
//! The API token is accepted from the file or the environment but is never
//! written back out, so `config --show` and `config --init` cannot leak it.

use crate::error::{PruneError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Main configuration structure for ghprune.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub API access configuration.
    pub github: GithubConfig,
    /// Batch execution policy knobs.
    pub batch: BatchConfig,
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// GitHub API access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Personal access token. Environment variables: `GITHUB_TOKEN`,
    /// `GHPRUNE_TOKEN`. Read but never serialized.
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Acting username whose graph is pruned.
    /// Environment variables: `GITHUB_USERNAME`, `GHPRUNE_USERNAME`.
    pub username: Option<String>,

    /// API base URL (override for GitHub Enterprise).
    pub api_base: String,

    /// Page size for list endpoints. 100 is the API maximum.
    pub per_page: u32,
}

/// Batch execution policy knobs. These parameterize candidate selection
/// and execution only; they have no bearing on stored data invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Hard cap on unfollow actions in a single run.
    /// Environment variable: `GHPRUNE_MAX_UNFOLLOWS`
    pub max_unfollows_per_run: usize,

    /// Delay between consecutive API actions, in milliseconds.
    /// Environment variable: `GHPRUNE_DELAY_MS`
    pub request_delay_ms: u64,

    /// Re-check reciprocity before each unfollow. Defends against a stale
    /// snapshot causing an erroneous action.
    pub verify_before_unfollow: bool,

    /// Stop selecting candidates once the remaining API quota would drop
    /// below this reserve.
    pub rate_limit_floor: u32,
}

/// Path configuration for the local state store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `GHPRUNE_DB`
    pub db: Option<PathBuf>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output.
    pub quiet: bool,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            username: None,
            api_base: "https://api.github.com".to_string(),
            per_page: 100,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_unfollows_per_run: 50,
            request_delay_ms: 1000,
            verify_before_unfollow: true,
            rate_limit_floor: 100,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/ghprune/config.toml)
    /// 3. Compiled defaults
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config.redacted());
        config
    }

    /// Load configuration from a specific file.
    #[must_use]
    pub fn load_from_file(path: &PathBuf) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load the user configuration file from the standard location.
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ghprune").join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Credentials. GHPRUNE_* wins over the generic GITHUB_* names.
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Ok(token) = std::env::var("GHPRUNE_TOKEN") {
            self.github.token = Some(token);
        }
        if let Ok(username) = std::env::var("GITHUB_USERNAME") {
            self.github.username = Some(username);
        }
        if let Ok(username) = std::env::var("GHPRUNE_USERNAME") {
            self.github.username = Some(username);
        }

        // Paths
        if let Ok(db) = std::env::var("GHPRUNE_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }

        // Batch policy
        if let Ok(max) = std::env::var("GHPRUNE_MAX_UNFOLLOWS") {
            if let Ok(n) = max.parse() {
                self.batch.max_unfollows_per_run = n;
            }
        }
        if let Ok(delay) = std::env::var("GHPRUNE_DELAY_MS") {
            if let Ok(n) = delay.parse() {
                self.batch.request_delay_ms = n;
            }
        }

        // Output
        if let Ok(format) = std::env::var("GHPRUNE_FORMAT") {
            self.output.format = format;
        }
        if std::env::var("GHPRUNE_NO_COLOR").is_ok() || std::env::var("NO_COLOR").is_ok() {
            self.output.colors = false;
        }
        if std::env::var("GHPRUNE_QUIET").is_ok() {
            self.output.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        // Credentials and API access
        if other.github.token.is_some() {
            self.github.token = other.github.token;
        }
        if other.github.username.is_some() {
            self.github.username = other.github.username;
        }
        self.github.api_base = other.github.api_base;
        self.github.per_page = other.github.per_page;

        // Batch policy (always override if present in other)
        self.batch.max_unfollows_per_run = other.batch.max_unfollows_per_run;
        self.batch.request_delay_ms = other.batch.request_delay_ms;
        self.batch.verify_before_unfollow = other.batch.verify_before_unfollow;
        self.batch.rate_limit_floor = other.batch.rate_limit_floor;

        // Paths
        if other.paths.db.is_some() {
            self.paths.db = other.paths.db;
        }

        // Output
        self.output.format = other.output.format;
        self.output.colors = other.output.colors;
        self.output.quiet = other.output.quiet;
    }

    /// The configured token, or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`PruneError::MissingToken`] when no layer supplied one.
    pub fn token(&self) -> Result<&str> {
        self.github
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(PruneError::MissingToken)
    }

    /// The configured acting username, or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`PruneError::MissingUsername`] when no layer supplied one.
    pub fn username(&self) -> Result<&str> {
        self.github
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(PruneError::MissingUsername)
    }

    /// Get the database path, using defaults if not configured.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(crate::default_db_path)
    }

    /// A copy safe to log or display: the token is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.github.token.is_some() {
            copy.github.token = Some("********".to_string());
        }
        copy
    }

    /// Save the current configuration to the user config file.
    ///
    /// The token is never written (see [`GithubConfig::token`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            PruneError::config("<unknown>", "could not determine config directory")
        })?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PruneError::config(&config_path, e.to_string()))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(config_path)
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_api_limits() {
        let config = Config::default();
        assert_eq!(config.github.per_page, 100);
        assert_eq!(config.batch.max_unfollows_per_run, 50);
        assert_eq!(config.batch.request_delay_ms, 1000);
        assert!(config.batch.verify_before_unfollow);
        assert!(config.output.colors);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(
            config.batch.max_unfollows_per_run,
            parsed.batch.max_unfollows_per_run
        );
        assert_eq!(config.github.api_base, parsed.github.api_base);
    }

    #[test]
    fn token_is_never_serialized() {
        let mut config = Config::default();
        config.github.token = Some("ghp_supersecret".to_string());
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(!toml.contains("supersecret"));
        assert!(!toml.contains("token"));
    }

    #[test]
    fn token_is_still_deserialized() {
        let parsed: Config = toml::from_str("[github]\ntoken = \"ghp_abc\"\n").unwrap();
        assert_eq!(parsed.github.token.as_deref(), Some("ghp_abc"));
    }

    #[test]
    fn config_merge_prefers_other() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.batch.max_unfollows_per_run = 5;
        other.paths.db = Some(PathBuf::from("/custom/path.db"));
        other.github.username = Some("octocat".to_string());

        base.merge(other);

        assert_eq!(base.batch.max_unfollows_per_run, 5);
        assert_eq!(base.paths.db, Some(PathBuf::from("/custom/path.db")));
        assert_eq!(base.github.username.as_deref(), Some("octocat"));
    }

    #[test]
    fn missing_credentials_are_typed_errors() {
        let config = Config::default();
        assert!(matches!(config.token(), Err(PruneError::MissingToken)));
        assert!(matches!(
            config.username(),
            Err(PruneError::MissingUsername)
        ));

        let mut config = Config::default();
        config.github.token = Some(String::new());
        assert!(matches!(config.token(), Err(PruneError::MissingToken)));
    }

    #[test]
    fn redacted_masks_the_token() {
        let mut config = Config::default();
        config.github.token = Some("ghp_abc".to_string());
        let shown = format!("{:?}", config.redacted());
        assert!(!shown.contains("ghp_abc"));
    }

    #[test]
    fn default_config_content_has_sections() {
        let content = Config::default_config_content();
        assert!(content.contains("[github]"));
        assert!(content.contains("[batch]"));
        assert!(content.contains("[output]"));
    }
}
