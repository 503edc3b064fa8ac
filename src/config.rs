//! Runtime configuration loaded from the environment and an optional `.env` file.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Default Gemini model used for SQL generation.
pub const DEFAULT_MODEL: &str = "models/gemini-pro-latest";

/// Default base URL of the Generative Language REST API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default address the HTTP server binds to.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Errors raised while assembling an [`AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent or blank.
    #[error("{0} not found in environment or .env file")]
    MissingVar(&'static str),

    /// A variable is present but cannot be parsed.
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Parses a `DATABASE_URL` value.
    ///
    /// Accepts `sqlite://path`, `sqlite:path`, a bare path, or `:memory:`.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let trimmed = url.trim();
        let path = trimmed
            .strip_prefix("sqlite://")
            .or_else(|| trimmed.strip_prefix("sqlite:"))
            .unwrap_or(trimmed);

        if path.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "DATABASE_URL",
                message: format!("no database path in '{url}'"),
            });
        }

        if path == ":memory:" {
            return Ok(Self::Memory);
        }

        if path.contains("://") {
            return Err(ConfigError::InvalidValue {
                name: "DATABASE_URL",
                message: format!("unsupported database scheme in '{url}'"),
            });
        }

        Ok(Self::File(PathBuf::from(path)))
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub api_base_url: String,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::MissingVar("DATABASE_URL"))?;
        // Fail early on a URL we cannot open
        DatabaseLocation::parse(&database_url)?;

        let bind = get("NLSQL_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                name: "NLSQL_BIND",
                message: format!("{bind}: {e}"),
            })?;

        Ok(Self {
            database_url,
            api_key: get("GOOGLE_API_KEY"),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            bind_addr,
        })
    }

    /// Resolves `database_url` to a concrete location.
    pub fn database_location(&self) -> Result<DatabaseLocation, ConfigError> {
        DatabaseLocation::parse(&self.database_url)
    }
}
