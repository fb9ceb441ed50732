use std::{env, path::PathBuf, time::Duration};

use stepwise_collab::Config;
use thiserror::Error;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;
pub const DEFAULT_UPLOADS_DIR: &str = "uploads/classification_images";
pub const DEFAULT_AI_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
#[error("{name} must be {expected}, got \"{value}\"")]
pub struct ConfigError {
    name: &'static str,
    expected: &'static str,
    value: String,
}

/// Everything the server needs to start, read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Postgres connection string. Without one, data is only kept in memory.
    pub database_url: Option<String>,
    /// Where uploaded classification images are stored
    pub uploads_dir: PathBuf,
    pub ai_api_url: String,
    /// Sent to the AI service with every request
    pub ai_api_key: String,
    pub collab: Config,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any source of variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("STEPWISE_SERVER_PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError {
                name: "STEPWISE_SERVER_PORT",
                expected: "a port number",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let mut collab = Config::default();

        if let Some(value) = var("STEPWISE_GENERATION_TIMEOUT_SECS") {
            collab.generation_timeout = parse_seconds("STEPWISE_GENERATION_TIMEOUT_SECS", value)?;
        }

        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            uploads_dir: var("STEPWISE_UPLOADS_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOADS_DIR.to_string())
                .into(),
            ai_api_url: var("AI_API_URL").unwrap_or_else(|| DEFAULT_AI_API_URL.to_string()),
            ai_api_key: var("AI_API_KEY_SECRET").unwrap_or_default(),
            collab,
        })
    }
}

fn parse_seconds(name: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError {
            name,
            expected: "a positive number of seconds",
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config(&[]).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database_url, None);
        assert_eq!(config.uploads_dir, PathBuf::from(DEFAULT_UPLOADS_DIR));
        assert_eq!(config.ai_api_url, DEFAULT_AI_API_URL);
        assert_eq!(config.collab.generation_timeout, Duration::from_secs(60));
    }

    #[test]
    fn variables_override_defaults() {
        let config = config(&[
            ("STEPWISE_SERVER_PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/stepwise"),
            ("AI_API_KEY_SECRET", "hush"),
            ("STEPWISE_GENERATION_TIMEOUT_SECS", "90"),
            ("STEPWISE_UPLOADS_DIR", ""),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/stepwise")
        );
        assert_eq!(config.ai_api_key, "hush");
        assert_eq!(config.collab.generation_timeout, Duration::from_secs(90));
        assert_eq!(config.uploads_dir, PathBuf::from(DEFAULT_UPLOADS_DIR));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(config(&[("STEPWISE_SERVER_PORT", "ninety")]).is_err());
        assert!(config(&[("STEPWISE_GENERATION_TIMEOUT_SECS", "0")]).is_err());
    }
}
