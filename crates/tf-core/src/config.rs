use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.teamforge/config.toml`.
///
/// **Security**: API keys are never stored here. The oracle section only
/// names the environment variable to read; [`CredentialProvider`] resolves it
/// at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl Config {
    /// Load config from `~/.teamforge/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not expressible via types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.store.validate()?;
        self.oracle.validate()?;
        Ok(())
    }

    /// `~/.teamforge`, home of the config file and the default database.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".teamforge")
    }

    pub fn default_path() -> PathBuf {
        Self::default_dir().join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format must be \"pretty\" or \"json\", got {other:?}"
            ))),
        }
    }
}

fn default_project_name() -> String {
    "teamforge".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `"sqlite"` (persistent) or `"memory"` (lost when the process exits).
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Defaults to `~/.teamforge/teamforge.db`.
    #[serde(default)]
    pub sqlite_path: Option<String>,
    /// Load the stock teams, users, and memberships into an empty store.
    #[serde(default)]
    pub seed_demo_data: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            sqlite_path: None,
            seed_demo_data: false,
        }
    }
}

impl StoreConfig {
    /// Database file for the sqlite backend.
    pub fn resolved_sqlite_path(&self) -> PathBuf {
        match self.sqlite_path.as_deref() {
            Some(path) => PathBuf::from(path),
            None => Config::default_dir().join("teamforge.db"),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.backend.as_str() {
            "memory" => Ok(()),
            "sqlite" if self.sqlite_path.as_deref().is_some_and(|p| p.trim().is_empty()) => {
                Err(ConfigError::Validation(
                    "store.sqlite_path must not be blank".into(),
                ))
            }
            "sqlite" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "store.backend must be \"memory\" or \"sqlite\", got {other:?}"
            ))),
        }
    }
}

fn default_store_backend() -> String {
    "sqlite".into()
}

/// Which advisor backs the classification and health oracles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// `"none"`, `"anthropic"`, `"openai"`, or `"gemini"`.
    #[serde(default = "default_oracle_provider")]
    pub provider: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    /// Name of the env var holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Upper bound on a single oracle call; elapsed calls count as unavailable.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_oracle_provider(),
            model: default_oracle_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

pub const ORACLE_PROVIDERS: &[&str] = &["none", "anthropic", "openai", "gemini"];

impl OracleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !ORACLE_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(ConfigError::Validation(format!(
                "oracle.provider must be one of {ORACLE_PROVIDERS:?}, got {:?}",
                self.provider
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "oracle.timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_oracle_provider() -> String {
    "none".into()
}
fn default_oracle_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_api_key_env() -> String {
    "TEAMFORGE_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthConfig {
    /// Stop a health-check scan after this many tasks (0 = no limit).
    #[serde(default)]
    pub max_scan_tasks: usize,
}

// ---------------------------------------------------------------------------
// CredentialProvider
// ---------------------------------------------------------------------------

/// Reads credentials from environment variables at runtime.
///
/// Config stores env var *names*; this provider resolves them to values on
/// demand.
pub struct CredentialProvider;

impl CredentialProvider {
    /// Resolve the oracle API key. Empty values count as unset.
    pub fn oracle_api_key(cfg: &OracleConfig) -> Option<String> {
        Self::from_env(&cfg.api_key_env)
    }

    pub fn from_env(var: &str) -> Option<String> {
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }
}
