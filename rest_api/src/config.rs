// rest_api/src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_REST_API_PORT: u16 = 8082;

/// Looked for in the working directory when no explicit path is given.
const DEFAULT_CONFIG_FILE: &str = "rest_api_config.yaml";

/// Represents the configuration for the REST API server itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestApiConfig {
    pub host: String,
    pub port: u16,
    /// HMAC secret login tokens are signed with.
    pub jwt_secret: String,
    /// Hours a login token stays valid.
    pub token_ttl_hours: i64,
    /// Snapshot file the store persists to. `None` keeps everything in memory.
    pub data_path: Option<PathBuf>,
    /// Credentials seeded for the first administrator when the store has no
    /// accounts yet.
    pub admin_email: String,
    pub admin_password: String,
}

impl Default for RestApiConfig {
    fn default() -> Self {
        RestApiConfig {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_REST_API_PORT,
            jwt_secret: "care-dev-secret".to_string(),
            token_ttl_hours: 8,
            data_path: None,
            admin_email: "admin@hospital.local".to_string(),
            admin_password: "change-me-now".to_string(),
        }
    }
}

// Wrapper struct to match the 'rest_api:' key in the YAML config.
#[derive(Debug, Deserialize)]
struct RestApiConfigWrapper {
    rest_api: RestApiConfig,
}

/// Loads the REST API configuration: the YAML file when present, then
/// environment variables on top. A missing file is only an error when its
/// path was given explicitly.
pub fn load_rest_api_config(config_file_path: Option<PathBuf>) -> Result<RestApiConfig> {
    let explicit = config_file_path.is_some();
    let path = config_file_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = if path.exists() {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read REST API config file {}", path.display()))?;
        let wrapper: RestApiConfigWrapper = serde_yaml2::from_str(&content)
            .with_context(|| format!("Failed to parse REST API config file {}", path.display()))?;
        wrapper.rest_api
    } else if explicit {
        anyhow::bail!("REST API config file {} does not exist", path.display());
    } else {
        RestApiConfig::default()
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut RestApiConfig) -> Result<()> {
    if let Ok(host) = env::var("CARE_API_HOST") {
        config.host = host;
    }
    if let Ok(port) = env::var("CARE_API_PORT") {
        config.port = port
            .parse()
            .with_context(|| format!("CARE_API_PORT is not a valid port: '{}'", port))?;
    }
    if let Ok(secret) = env::var("CARE_API_JWT_SECRET") {
        config.jwt_secret = secret;
    }
    if let Ok(hours) = env::var("CARE_API_TOKEN_TTL_HOURS") {
        config.token_ttl_hours = hours
            .parse()
            .with_context(|| format!("CARE_API_TOKEN_TTL_HOURS is not a number: '{}'", hours))?;
    }
    if let Ok(path) = env::var("CARE_API_DATA_PATH") {
        config.data_path = Some(PathBuf::from(path));
    }
    if let Ok(email) = env::var("CARE_API_ADMIN_EMAIL") {
        config.admin_email = email;
    }
    if let Ok(password) = env::var("CARE_API_ADMIN_PASSWORD") {
        config.admin_password = password;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn should_fall_back_to_defaults_without_a_file() {
        let config = load_rest_api_config(None).unwrap();
        assert_eq!(config.port, DEFAULT_REST_API_PORT);
        assert_eq!(config.token_ttl_hours, 8);
        assert!(config.data_path.is_none());
    }

    #[test]
    fn should_parse_yaml_under_the_rest_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rest_api_config.yaml");
        fs::write(
            &path,
            "rest_api:\n  host: \"0.0.0.0\"\n  port: 9090\n  jwt_secret: \"topsecret\"\n",
        )
        .unwrap();

        let config = load_rest_api_config(Some(path)).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.jwt_secret, "topsecret");
        // Keys absent from the file keep their defaults.
        assert_eq!(config.token_ttl_hours, 8);
    }

    #[test]
    fn should_reject_an_explicit_path_that_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = load_rest_api_config(Some(missing)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
