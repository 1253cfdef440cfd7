//! Configuration loading and validation.
//!
//! Sources, later overriding earlier:
//! 1. Built-in defaults
//! 2. TOML file (`nuvana.toml` in the working directory unless `--config` is given)
//! 3. Environment variables prefixed with `NUVANA_`, nested with `__`
//!    (e.g. `NUVANA_SERVER__PORT=9000`)

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "nuvana.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the JSON record tree.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Idle time after which a session is dropped.
    pub session_timeout_secs: u64,
    /// Failed logins before the account is locked.
    pub max_login_attempts: u32,
    pub lockout_minutes: i64,
    pub min_password_length: usize,
    pub otp_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminCredential {
    pub username: String,
    /// Salted hash as produced by `nuvana hash-password`.
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub credentials: Vec<AdminCredential>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 1800,
            max_login_attempts: 5,
            lockout_minutes: 30,
            min_password_length: 8,
            otp_length: 6,
        }
    }
}

impl SecurityConfig {
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    #[must_use]
    pub fn lockout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lockout_minutes)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

        let config: Config = Self::figment(config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("NUVANA_").split("__"))
    }

    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }
        if self.security.max_login_attempts == 0 {
            return Err(invalid("security.max_login_attempts must be greater than 0"));
        }
        if self.security.session_timeout_secs == 0 {
            return Err(invalid("security.session_timeout_secs must be greater than 0"));
        }
        if self.security.lockout_minutes < 0 {
            return Err(invalid("security.lockout_minutes cannot be negative"));
        }
        if !(4..=10).contains(&self.security.otp_length) {
            return Err(invalid(format!(
                "security.otp_length must be between 4 and 10 (got {})",
                self.security.otp_length
            )));
        }
        for credential in &self.admin.credentials {
            if credential.username.trim().is_empty() {
                return Err(invalid("admin credential with empty username"));
            }
            if !crate::auth::is_password_hash(&credential.password_hash) {
                return Err(invalid(format!(
                    "admin credential '{}' does not hold a salted hash; generate one with `nuvana hash-password`",
                    credential.username
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
