//! Configuration types and loading
//!
//! Config path precedence: `--config` > `CONFIG_PATH` env > `school-admin.toml`.
//! The login password comes from `SCHOOL_ADMIN_PASSWORD` or `password_file`
//! and is never read from the TOML itself.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const PASSWORD_ENV: &str = "SCHOOL_ADMIN_PASSWORD";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Where the session lives and how to start one
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            email: None,
            password: None,
            password_file: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("school-admin-session.json")
}

impl Config {
    /// Load configuration from a TOML file, then resolve the password.
    ///
    /// Password resolution order:
    /// 1. SCHOOL_ADMIN_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.session.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.session.password_file {
            config.session.password = Secret::from_file(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("school-admin.toml")
    }
}
