use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use tracing::{debug, info};

use crate::error::{HrError, Result};
use crate::ingest::{MalformedPolicy, WriteMode};

/// Load environment variables from .env files
///
/// Priority order (highest to lowest):
/// 1. Variables already set in the environment
/// 2. Current directory .env
/// 3. ~/.hrdash/.env
///
/// dotenvy never overwrites variables that are already set.
pub fn load_dotenv() {
    let mut loaded_from = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        loaded_from.push(path.display().to_string());
    }

    if let Some(env_file) = config_dir().map(|dir| dir.join(".env")) {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => loaded_from.push(env_file.display().to_string()),
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }

    if loaded_from.is_empty() {
        debug!("No .env files found (current dir or ~/.hrdash)");
    } else {
        info!("Loaded environment from: {}", loaded_from.join(", "));
    }
}

/// Get the hrdash config directory path (~/.hrdash)
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".hrdash"))
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HrConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub name: String,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long `acquire()` waits for a free connection before giving up
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Server-side statement_timeout applied to every pooled connection
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            statement_timeout_secs: default_statement_timeout_secs(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .finish()
    }
}

impl DatabaseConfig {
    /// Build driver connect options. Credentials are passed as discrete
    /// fields, so passwords with URL metacharacters need no escaping.
    pub fn connect_options(&self) -> PgConnectOptions {
        let timeout_ms = (self.statement_timeout_secs * 1000).to_string();
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .application_name("hrdash")
            .options([("statement_timeout", timeout_ms.as_str())]);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        options
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// `host:port/name` for log lines (never includes credentials)
    pub fn display_target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.name)
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(HrError::config("database.max_connections must be at least 1"));
        }
        if self.min_connections > self.max_connections {
            return Err(HrError::config(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,

    /// Row cap for assistant and ad-hoc query results
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_api_timeout_secs(),
            max_rows: default_max_rows(),
        }
    }
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

impl AssistantConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub mode: WriteMode,

    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            mode: WriteMode::default(),
            on_malformed: MalformedPolicy::default(),
        }
    }
}

// Default value functions for serde
fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "employee_management_db".to_string()
}

fn default_db_user() -> String {
    "hr_admin".to_string()
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_statement_timeout_secs() -> u64 {
    60
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_timeout_secs() -> u64 {
    30
}

fn default_max_rows() -> usize {
    1000
}

fn default_batch_size() -> usize {
    500
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "********"
    }
}

impl HrConfig {
    /// Load configuration
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables (DB_HOST, DB_PORT, ..., GEMINI_API_KEY)
    /// 2. Explicit `--config` path, else ./hrdash.toml, else ~/.hrdash/config.toml
    /// 3. Built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate(explicit)? {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.database.validate()?;
        Ok(config)
    }

    fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(HrError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = PathBuf::from("hrdash.toml");
        if local.exists() {
            return Ok(Some(local));
        }

        Ok(config_dir()
            .map(|dir| dir.join("config.toml"))
            .filter(|path| path.exists()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| HrError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HrError::config(format!("invalid TOML: {}", e)))
    }

    /// Apply environment overrides through a lookup function so tests don't
    /// have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(host) = lookup("DB_HOST") {
            db.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            db.port = parse_env("DB_PORT", &port)?;
        }
        if let Some(name) = lookup("DB_NAME") {
            db.name = name;
        }
        if let Some(user) = lookup("DB_USER") {
            db.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            db.password = password;
        }
        if let Some(min) = lookup("DB_MIN_CONNECTIONS") {
            db.min_connections = parse_env("DB_MIN_CONNECTIONS", &min)?;
        }
        if let Some(max) = lookup("DB_MAX_CONNECTIONS") {
            db.max_connections = parse_env("DB_MAX_CONNECTIONS", &max)?;
        }

        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.assistant.api_key = Some(key);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.assistant.model = model;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HrError::config(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_legacy_deployment() {
        let config = HrConfig::default();
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.name, "employee_management_db");
        assert_eq!(config.database.user, "hr_admin");
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.ingest.mode, WriteMode::Append);
        assert_eq!(config.ingest.on_malformed, MalformedPolicy::Skip);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = HrConfig::from_toml_str(
            r#"
            [database]
            host = "db.internal"
            max_connections = 4

            [ingest]
            mode = "upsert"
            on_malformed = "fail"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.ingest.mode, WriteMode::Upsert);
        assert_eq!(config.ingest.on_malformed, MalformedPolicy::FailFast);
        assert_eq!(config.assistant.max_rows, 1000);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("DB_HOST", "pg.example"),
            ("DB_PORT", "6543"),
            ("DB_PASSWORD", "p@ss/word"),
            ("GEMINI_API_KEY", "secret-key"),
        ]
        .into_iter()
        .collect();

        let mut config = HrConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.host, "pg.example");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.password, "p@ss/word");
        assert_eq!(config.assistant.api_key.as_deref(), Some("secret-key"));
    }

    #[test]
    fn bad_port_is_config_error() {
        let mut config = HrConfig::default();
        let err = config
            .apply_env(|k| (k == "DB_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, HrError::Config { .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = HrConfig::default();
        config.database.password = "hunter2".into();
        config.assistant.api_key = Some("AIza-secret".into());

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("AIza-secret"));
        assert!(rendered.contains("********"));
    }

    #[test]
    fn min_above_max_is_rejected() {
        let mut db = DatabaseConfig::default();
        db.min_connections = 5;
        db.max_connections = 2;
        assert!(db.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(HrConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hrdash.toml");
        std::fs::write(&path, "[assistant]\nmodel = \"gemini-pro\"\n").unwrap();

        let config = HrConfig::from_file(&path).unwrap();
        assert_eq!(config.assistant.model, "gemini-pro");
    }
}
