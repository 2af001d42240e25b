use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path the WebSocket handshake must target, e.g. `/websockets/eliza`.
    pub path: String,
    pub health_port: u16,
    pub workers: u32,
}

/// What to do with a frame that is not a text utterance.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    Ignore,
    Drop,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub outbound_buffer: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub transcript_limit: usize,
    pub malformed_policy: MalformedPolicy,
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub session: SessionConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Self::defaults()?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_SERVER__PORT=9000` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults every other source layers on top of.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8025)?
            .set_default("server.path", "/websockets/eliza")?
            .set_default("server.health_port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("session.outbound_buffer", 32)?
            .set_default("session.heartbeat_interval_secs", 30)?
            .set_default("session.heartbeat_timeout_secs", 40)?
            .set_default("session.transcript_limit", 256)?
            .set_default("session.malformed_policy", "ignore")
    }

    /// Settings from the built-in defaults only, ignoring config files and
    /// `APP_*` variables.
    pub fn from_defaults() -> Result<Self, ConfigError> {
        Self::defaults()?.build()?.try_deserialize()
    }

    #[cfg(test)]
    pub fn new_for_test() -> Result<Self, ConfigError> {
        Self::defaults()?
            .set_override("environment", "test")?
            .set_override("server.port", 0)?
            .set_override("server.health_port", 0)?
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.server.path.starts_with('/') {
            return Err(AppError::ValidationError(format!(
                "server.path must start with '/': {}",
                self.server.path
            )));
        }
        if self.session.outbound_buffer == 0 {
            return Err(AppError::ValidationError(
                "session.outbound_buffer must be greater than zero".to_string(),
            ));
        }
        if self.session.heartbeat_timeout_secs <= self.session.heartbeat_interval_secs {
            return Err(AppError::ValidationError(
                "session.heartbeat_timeout_secs must exceed session.heartbeat_interval_secs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn health_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.health_port)
    }
}
