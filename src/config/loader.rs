//! Configuration loading from disk and the process environment.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::ProviderConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Source of environment variables.
pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEnv;

impl Env for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Env for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Load and validate configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<ProviderConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProviderConfig = toml::from_str(&content)?;
    finish(config, &OsEnv)
}

/// Build a configuration from defaults plus the environment only.
pub fn from_env(env: &impl Env) -> Result<ProviderConfig, ConfigError> {
    finish(ProviderConfig::default(), env)
}

fn finish(mut config: ProviderConfig, env: &impl Env) -> Result<ProviderConfig, ConfigError> {
    apply_env_overrides(&mut config, env);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply the provider's conventional environment variables on top of `config`.
///
/// Unparseable values are ignored and the configured value is kept.
pub fn apply_env_overrides(config: &mut ProviderConfig, env: &impl Env) {
    if let Some(port) = env.var("port").and_then(|v| v.parse::<u16>().ok()) {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    if let Some(read) = env.var("read_timeout").and_then(|v| parse_duration(&v)) {
        config.timeouts.read_secs = read.as_secs();
    }

    if let Some(write) = env.var("write_timeout").and_then(|v| parse_duration(&v)) {
        config.timeouts.write_secs = write.as_secs();
    }

    if let Some(dnsrr) = env.var("dnsrr").and_then(|v| parse_bool(&v)) {
        config.resolver.dns_round_robin = dnsrr;
    }

    if let Some(host) = env.var("DOCKER_HOST").filter(|v| !v.is_empty()) {
        config.engine.host = host;
    }

    if let Some(version) = env.var("DOCKER_API_VERSION").filter(|v| !v.is_empty()) {
        config.engine.api_version = Some(version);
    }
}

/// Plain integers are seconds; anything else goes through `humantime` ("1m30s").
fn parse_duration(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).ok()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
