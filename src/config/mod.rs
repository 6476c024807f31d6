//! Runtime configuration.
//!
//! `Settings` is built once at process start and handed to the resolver and
//! server by reference. Nothing in the search path reads the environment.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Default number of results for plain and hybrid search.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Smallest accepted result limit.
pub const MIN_SEARCH_LIMIT: usize = 1;
/// Largest accepted result limit.
pub const MAX_SEARCH_LIMIT: usize = 100;
/// Default relevance floor for threshold-filtered semantic search.
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.7;
/// Longest accepted query, in characters.
pub const MAX_QUERY_LENGTH: usize = 500;
/// Candidate cap for searches without a tight result limit.
pub const SEMANTIC_CANDIDATE_CAP: usize = 50;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set to something that does not parse
    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection settings for the semantic index (MindsDB).
#[derive(Debug, Clone)]
pub struct SemanticBackendSettings {
    /// Host name, or a full `http(s)://` base URL
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Empty means the server does not require a login
    pub password: String,
    /// Project/database the knowledge base lives in
    pub database: String,
    /// Knowledge base to query
    pub kb_name: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl SemanticBackendSettings {
    /// Base URL of the HTTP API.
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Login credentials, when a password is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.password.is_empty() {
            None
        } else {
            Some((self.user.as_str(), self.password.as_str()))
        }
    }
}

impl Default for SemanticBackendSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 47334,
            user: "mindsdb".to_string(),
            password: String::new(),
            database: "mindsdb".to_string(),
            kb_name: "academic_kb".to_string(),
            timeout_secs: 30,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Bounds applied to incoming queries.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub default_limit: usize,
    pub min_limit: usize,
    pub max_limit: usize,
    pub max_query_length: usize,
    /// Fetch size for threshold search, and the minimum fetch for hybrid search
    pub candidate_cap: usize,
    pub default_threshold: f32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
            min_limit: MIN_SEARCH_LIMIT,
            max_limit: MAX_SEARCH_LIMIT,
            max_query_length: MAX_QUERY_LENGTH,
            candidate_cap: SEMANTIC_CANDIDATE_CAP,
            default_threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub semantic: SemanticBackendSettings,

    /// Path of the local SQLite paper store
    pub store_path: PathBuf,

    pub api: ApiSettings,

    pub limits: SearchLimits,

    /// Whether the synthetic tier answers when every real backend is down.
    /// When disabled, an exhausted cascade is reported as a failure.
    pub synthetic_fallback: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            semantic: SemanticBackendSettings::default(),
            store_path: PathBuf::from("data/academic_papers.db"),
            api: ApiSettings::default(),
            limits: SearchLimits::default(),
            synthetic_fallback: true,
        }
    }
}

impl Settings {
    /// Read settings from the process environment, falling back to defaults.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    ///
    /// Recognized keys: `MINDSDB_HOST`, `MINDSDB_PORT`, `MINDSDB_USER`,
    /// `MINDSDB_PASSWORD`, `MINDSDB_DATABASE`, `KB_NAME`,
    /// `MINDSDB_TIMEOUT_SECS`, `PAPER_DB_PATH`, `API_HOST`, `API_PORT`,
    /// `SYNTHETIC_FALLBACK`.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let semantic = &mut settings.semantic;

        if let Some(host) = lookup("MINDSDB_HOST") {
            semantic.host = host;
        }
        if let Some(port) = parse_var(&lookup, "MINDSDB_PORT")? {
            semantic.port = port;
        }
        if let Some(user) = lookup("MINDSDB_USER") {
            semantic.user = user;
        }
        if let Some(password) = lookup("MINDSDB_PASSWORD") {
            semantic.password = password;
        }
        if let Some(database) = lookup("MINDSDB_DATABASE") {
            semantic.database = database;
        }
        if let Some(kb_name) = lookup("KB_NAME") {
            semantic.kb_name = kb_name;
        }
        if let Some(timeout) = parse_var(&lookup, "MINDSDB_TIMEOUT_SECS")? {
            semantic.timeout_secs = timeout;
        }

        if let Some(path) = lookup("PAPER_DB_PATH") {
            settings.store_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("API_HOST") {
            settings.api.host = host;
        }
        if let Some(port) = parse_var(&lookup, "API_PORT")? {
            settings.api.port = port;
        }
        if let Some(raw) = lookup("SYNTHETIC_FALLBACK") {
            settings.synthetic_fallback = parse_bool("SYNTHETIC_FALLBACK", &raw)?;
        }

        Ok(settings)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(key: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
