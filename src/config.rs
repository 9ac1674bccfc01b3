//! CLI arguments, YAML configuration and server defaults.

use clap::Parser;
use serde::Deserialize;
use shadow_rs::formatcp;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::Path;
use tracing::warn;

use crate::build;
use crate::sanitize::{PathPolicy, is_valid_name};

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

/// In-memory budget for a parsed multipart form before file parts spill to disk.
pub const MAX_FORM_MEMORY: usize = 32 << 20;
pub const DIR_MODE: u32 = 0o755;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;
pub const DEFAULT_PORT: u16 = 8080;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "filedrop", version = VERSION_INFO, about = "Token-authenticated upload server")]
pub struct Args {
    #[arg(
        short = 'c',
        long = "cfg",
        env = "FILEDROP_CONFIG",
        help = "Path to the YAML configuration file"
    )]
    pub config: String,
    #[arg(
        short = 'b',
        long = "bind",
        env = "FILEDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "FILEDROP_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Listen port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "FILEDROP_PATH_POLICY",
        value_enum,
        default_value_t = PathPolicy::Contained,
        help = "Upload path confinement policy"
    )]
    pub path_policy: PathPolicy,
    #[arg(
        long,
        env = "FILEDROP_ACCESS_LOG",
        help = "Log every request and response at info level"
    )]
    pub access_log: bool,
    #[arg(long, env = "FILEDROP_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(long, env = "FILEDROP_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
}

/// Server configuration loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub users: Vec<User>,
    pub filedir: String,
}

/// A single upload account.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
    pub token: String,
}

#[derive(Debug)]
pub enum ConfigError {
    Read(io::Error),
    Parse(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(err) => write!(f, "error reading config file: {err}"),
            ConfigError::Parse(err) => write!(f, "error parsing config file: {err}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for io::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.filedir.trim().is_empty() {
            return Err(ConfigError::Invalid("filedir is required".into()));
        }

        let mut tokens = HashSet::new();
        for user in &self.users {
            // usernames become directory names directly under filedir
            if !is_valid_name(&user.username) || user.username.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "invalid username {:?}",
                    user.username
                )));
            }
            if user.token.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "empty token for user {}",
                    user.username
                )));
            }
            if !tokens.insert(user.token.as_str()) {
                warn!(
                    username = user.username,
                    "duplicate token, first matching user wins"
                );
            }
        }

        if self.users.is_empty() {
            warn!("no users configured, every upload will be rejected");
        }

        Ok(())
    }
}
