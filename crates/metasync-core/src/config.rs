//! Configuration schema (metasync.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the configured profile
pub const PROFILE_ENV: &str = "METASYNC_PROFILE";

/// Environment variable supplying the database URL when the file has none
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Deployment profile
///
/// Destructive operations are only available in development-like profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Development,
    Local,
    Test,
    Production,
}

impl Default for Profile {
    fn default() -> Self {
        Self::Production
    }
}

impl Profile {
    /// Parse a profile name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "local" => Some(Self::Local),
            "test" => Some(Self::Test),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Local => "local",
            Self::Test => "test",
            Self::Production => "production",
        }
    }

    /// Whether drop-all is permitted
    pub fn is_development(&self) -> bool {
        !matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string; falls back to `DATABASE_URL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Schema that is introspected and reconciled
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Connect over TLS
    #[serde(default)]
    pub tls: bool,

    /// Per-statement timeout applied to the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_timeout_ms: Option<u64>,
}

fn default_schema() -> String {
    "public".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            schema: default_schema(),
            tls: false,
            statement_timeout_ms: None,
        }
    }
}

impl DatabaseConfig {
    /// Resolve the connection string, preferring the configured value
    pub fn resolve_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        std::env::var(DATABASE_URL_ENV).map_err(|_| ConfigError::MissingDatabaseUrl)
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub profile: Profile,

    /// Path to the JSON model file, relative to the project root
    #[serde(default = "default_model_path")]
    pub model: PathBuf,

    /// Report a declared VARCHAR shorter than the live column as a risky
    /// truncation instead of accepting the wider column
    #[serde(default)]
    pub flag_varchar_narrowing: bool,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("metasync-model.json")
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            model: default_model_path(),
            flag_varchar_narrowing: false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            reconcile: ReconcileConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = std::env::current_dir().unwrap_or_default();
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Apply `METASYNC_PROFILE` if set
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(name) = std::env::var(PROFILE_ENV) {
            self.reconcile.profile = Profile::parse(&name).ok_or(ConfigError::UnknownProfile(name))?;
        }
        Ok(())
    }

    /// Model file path resolved against the project root
    pub fn model_path(&self) -> PathBuf {
        if self.reconcile.model.is_absolute() {
            self.reconcile.model.clone()
        } else {
            self.project_root.join(&self.reconcile.model)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("No database URL configured (set [database].url or DATABASE_URL)")]
    MissingDatabaseUrl,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.database.schema, "public");
        assert_eq!(config.reconcile.profile, Profile::Production);
        assert_eq!(config.reconcile.model, PathBuf::from("metasync-model.json"));
        assert!(!config.reconcile.flag_varchar_narrowing);
    }

    #[test]
    fn parses_sections() {
        let config = Config::from_toml(
            r#"
            [database]
            url = "postgres://localhost/app"
            schema = "app"
            statement_timeout_ms = 5000

            [reconcile]
            profile = "development"
            model = "model/entities.json"
            flag_varchar_narrowing = true
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.database.schema, "app");
        assert_eq!(config.database.statement_timeout_ms, Some(5000));
        assert_eq!(config.reconcile.profile, Profile::Development);
        assert!(config.model_path().ends_with("model/entities.json"));
        assert!(config.reconcile.flag_varchar_narrowing);
    }

    #[test]
    fn configured_url_wins() {
        let database = DatabaseConfig {
            url: Some("postgres://configured/db".into()),
            ..DatabaseConfig::default()
        };
        assert_eq!(database.resolve_url().unwrap(), "postgres://configured/db");
    }

    #[test]
    fn only_production_blocks_drop() {
        assert!(Profile::Development.is_development());
        assert!(Profile::Local.is_development());
        assert!(Profile::Test.is_development());
        assert!(!Profile::Production.is_development());
    }

    #[test]
    fn profile_names() {
        assert_eq!(Profile::parse("DEV"), Some(Profile::Development));
        assert_eq!(Profile::parse("prod"), Some(Profile::Production));
        assert_eq!(Profile::parse("staging"), None);
    }

    #[test]
    fn rejects_unknown_profile_in_file() {
        let result = Config::from_toml("[reconcile]\nprofile = \"staging\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.database, parsed.database);
        assert_eq!(config.reconcile, parsed.reconcile);
    }
}
