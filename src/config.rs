//! Process configuration loaded from environment variables.
//!
//! Values are read from the process environment, optionally seeded from a `.env` file through
//! [`dotenvy`]. Every value is validated here so the monitor only ever sees a usable
//! [`EndpointPool`] and [`RetryPolicy`].
//!
//! | Variable                 | Meaning                                    |
//! |--------------------------|--------------------------------------------|
//! | `SERVICE_NAME`           | name attached to every log line            |
//! | `STAGE`                  | `development`, `staging` or `production`   |
//! | `NETWORK`                | `ETH`, `MATIC` or `BSC`                    |
//! | `WS_ENDPOINTS`           | comma separated WebSocket endpoints        |
//! | `HTTP_ENDPOINT`          | optional HTTP RPC endpoint                 |
//! | `RETRY_CONNECTION_COUNT` | dial attempts per endpoint (positive)      |
//! | `RECONNECT_INTERVAL`     | seconds between dial attempts              |
//! | `DIAL_TIMEOUT`           | seconds before a single dial is abandoned  |
//! | `CALL_TIMEOUT`           | seconds before a subscribe or fetch fails  |
//! | `LISTEN_ADDR`            | address of the HTTP status listener        |

use std::{fmt, net::SocketAddr, num::NonZeroUsize, str::FromStr, time::Duration};

use thiserror::Error;

use crate::types::{Endpoint, EndpointPool, RetryPolicy};

/// Default per-dial timeout, in seconds.
pub const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 10;
/// Default per-request timeout, in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
/// Default address of the HTTP status listener.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },

    #[error("no WebSocket endpoints configured")]
    EmptyEndpoints,

    #[error("RETRY_CONNECTION_COUNT must be greater than 0")]
    NonPositiveRetryCount,

    #[error("failed to load .env file: {0}")]
    DotEnv(String),
}

/// Chain the monitor observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Eth,
    Matic,
    Bsc,
}

impl FromStr for Network {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ETH" => Ok(Network::Eth),
            "MATIC" => Ok(Network::Matic),
            "BSC" => Ok(Network::Bsc),
            other => Err(format!("unsupported network {other}")),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Eth => "ETH",
            Network::Matic => "MATIC",
            Network::Bsc => "BSC",
        })
    }
}

/// Deployment stage, used to pick the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Development,
    Staging,
    Production,
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "development" => Ok(Stage::Development),
            "staging" => Ok(Stage::Staging),
            "production" => Ok(Stage::Production),
            other => Err(format!("unsupported stage {other}")),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Development => "development",
            Stage::Staging => "staging",
            Stage::Production => "production",
        })
    }
}

/// Validated service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub service_name: String,
    pub stage: Stage,
    pub network: Network,
    pub ws_endpoints: EndpointPool,
    pub http_endpoint: Option<String>,
    pub retry_policy: RetryPolicy,
    pub dial_timeout: Duration,
    pub call_timeout: Duration,
    pub listen_addr: SocketAddr,
}

impl Config {
    /// Loads `.env` (if present) and reads the settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv(dotenvy::dotenv().map(drop))?;
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Reads the settings through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required variable is missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name = required(&lookup, "SERVICE_NAME")?;
        let stage = parse(&lookup, "STAGE")?;
        let network = parse(&lookup, "NETWORK")?;

        let ws_endpoints = EndpointPool::new(
            required(&lookup, "WS_ENDPOINTS")?
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(Endpoint::new),
        )?;

        let http_endpoint = lookup("HTTP_ENDPOINT").filter(|value| !value.trim().is_empty());

        let retry_count: usize = parse(&lookup, "RETRY_CONNECTION_COUNT")?;
        let retry_count = NonZeroUsize::new(retry_count).ok_or(ConfigError::NonPositiveRetryCount)?;
        let reconnect_interval = Duration::from_secs(parse(&lookup, "RECONNECT_INTERVAL")?);

        let dial_timeout = Duration::from_secs(
            parse_or(&lookup, "DIAL_TIMEOUT", DEFAULT_DIAL_TIMEOUT_SECS)?,
        );
        let call_timeout = Duration::from_secs(
            parse_or(&lookup, "CALL_TIMEOUT", DEFAULT_CALL_TIMEOUT_SECS)?,
        );
        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(value) => parse_value("LISTEN_ADDR", value)?,
            None => parse_value("LISTEN_ADDR", DEFAULT_LISTEN_ADDR.to_owned())?,
        };

        Ok(Config {
            service_name,
            stage,
            network,
            ws_endpoints,
            http_endpoint,
            retry_policy: RetryPolicy::new(retry_count, reconnect_interval),
            dial_timeout,
            call_timeout,
            listen_addr,
        })
    }
}

/// A missing `.env` file means everything comes from the real environment; any other failure
/// would leave the environment half loaded.
fn load_dotenv(result: Result<(), dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::DotEnv(err.to_string())),
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_value(key, required(lookup, key)?)
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match required(lookup, key) {
        Ok(value) => parse_value(key, value),
        Err(ConfigError::Missing(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

fn parse_value<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid { key, value, reason: e.to_string() })
}
