//! # Registry Configuration
//!
//! Declarative counterpart of the [`RegistryBuilder`](crate::registry::RegistryBuilder) options,
//! read from a JSON file:
//!
//! ```json
//! {
//!   "service-prefix": "/grpctest.",
//!   "defaults": { "address": "localhost:9090", "connect-timeout": "500ms" },
//!   "services": {
//!     "grpctest.ItemService": { "headers": { "locale": "en-US" } }
//!   }
//! }
//! ```
//!
//! Durations use the Go notation (`1s`, `500ms`, `1m30s`).
use crate::{grpc::dial::DialOption, registry::ServiceOption};
use serde::{Deserialize, Deserializer, de::Error as _};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid registry config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RegistryConfig {
    #[serde(default)]
    pub service_prefix: Option<String>,
    /// Applied to every service.
    #[serde(default)]
    pub defaults: ServiceConfig,
    /// Keyed by the service identifier (e.g. `grpctest.ItemService`), applied last.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ServiceConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "optional_duration")]
    pub connect_timeout: Option<Duration>,
    #[serde(default)]
    pub tcp_nodelay: Option<bool>,
    #[serde(default, deserialize_with = "optional_duration")]
    pub tcp_keepalive: Option<Duration>,
    #[serde(default, deserialize_with = "optional_duration")]
    pub keep_alive_interval: Option<Duration>,
    #[serde(default, deserialize_with = "optional_duration")]
    pub keep_alive_timeout: Option<Duration>,
    #[serde(default)]
    pub keep_alive_while_idle: Option<bool>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
}

impl RegistryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

impl ServiceConfig {
    /// Options equivalent to this block. Headers and dial options are appended.
    pub fn to_options(&self) -> Vec<ServiceOption> {
        let mut options = Vec::new();

        if let Some(address) = &self.address {
            options.push(ServiceOption::address(address.clone()));
        }

        for (key, value) in &self.headers {
            options.push(ServiceOption::header(key.clone(), value.clone()));
        }

        let dial_options = [
            self.connect_timeout.map(DialOption::ConnectTimeout),
            self.tcp_nodelay.map(DialOption::TcpNodelay),
            self.tcp_keepalive
                .map(|interval| DialOption::TcpKeepalive(Some(interval))),
            self.keep_alive_interval
                .map(DialOption::Http2KeepAliveInterval),
            self.keep_alive_timeout.map(DialOption::KeepAliveTimeout),
            self.keep_alive_while_idle
                .map(DialOption::KeepAliveWhileIdle),
            self.user_agent.clone().map(DialOption::UserAgent),
            self.concurrency_limit.map(DialOption::ConcurrencyLimit),
        ];

        options.extend(
            dial_options
                .into_iter()
                .flatten()
                .map(ServiceOption::dial_option),
        );

        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid duration '{0}', expected something like '1s', '500ms' or '1m30s'")]
pub struct InvalidDuration(pub String);

/// Parses a Go-style duration: a sequence of decimal numbers with a unit
/// (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`), e.g. `1.5s` or `1m30s`.
pub fn parse_duration(text: &str) -> Result<Duration, InvalidDuration> {
    let invalid = || InvalidDuration(text.to_string());
    let trimmed = text.trim();

    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = trimmed;
    let mut total = 0f64;

    if rest.is_empty() {
        return Err(invalid());
    }

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };

        total += value * nanos_per_unit;
        rest = tail;
    }

    Ok(Duration::from_nanos(total.round() as u64))
}

fn optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|text| parse_duration(&text).map_err(D::Error::custom))
        .transpose()
}
