//! Runtime configuration for the relay and the demo peer.
//!
//! Both are clap parsers; every option can also come from a `CALLHUB_*`
//! environment variable.

use std::io;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::signaling::DEFAULT_SIGNALING_PORT;

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_COMMAND_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid number: {0:?}")]
    NotANumber(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl From<ConfigError> for io::Error {
    fn from(e: ConfigError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, e)
    }
}

/// callhub signaling relay
#[derive(Debug, Clone, Parser)]
#[command(name = "callhub", version)]
pub struct RelayConfig {
    /// Address to listen on
    #[arg(long = "bind", env = "CALLHUB_BIND", default_value = "0.0.0.0:3479")]
    pub bind_addr: String,

    /// Seconds between keepalive pings
    #[arg(
        long = "ping-secs",
        env = "CALLHUB_PING_SECS",
        default_value = "30",
        value_parser = parse_secs
    )]
    pub ping_interval: Duration,

    /// Seconds to wait for a pong before dropping the channel
    #[arg(
        long = "pong-secs",
        env = "CALLHUB_PONG_SECS",
        default_value = "10",
        value_parser = parse_secs
    )]
    pub pong_timeout: Duration,

    /// Capacity of the hub actor's command queue
    #[arg(
        long,
        env = "CALLHUB_COMMAND_BUFFER",
        default_value = "1024",
        value_parser = parse_buffer
    )]
    pub command_buffer: usize,

    /// Decode payloads and drop malformed ones instead of relaying them
    #[arg(
        long = "strict",
        env = "CALLHUB_STRICT",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub validate_payloads: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_SIGNALING_PORT),
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            validate_payloads: false,
        }
    }
}

impl RelayConfig {
    /// Reject values the keepalive timers and the hub queue cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval.is_zero() {
            return Err(ConfigError::Zero("ping interval"));
        }
        if self.pong_timeout.is_zero() {
            return Err(ConfigError::Zero("pong timeout"));
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::Zero("command buffer"));
        }
        Ok(())
    }
}

/// callhub demo peer
#[derive(Debug, Clone, Parser)]
#[command(name = "callhub-peer", version)]
pub struct PeerConfig {
    /// Name shown in local stream and device labels
    #[arg(default_value = "peer")]
    pub name: String,

    /// WebSocket URL of the relay
    #[arg(long = "relay", env = "CALLHUB_RELAY_URL", default_value = "ws://127.0.0.1:3479")]
    pub relay_url: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: "peer".to_string(),
            relay_url: format!("ws://127.0.0.1:{}", DEFAULT_SIGNALING_PORT),
        }
    }
}

fn parse_secs(value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::NotANumber(value.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::Zero("interval"));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_buffer(value: &str) -> Result<usize, ConfigError> {
    let n: usize = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::NotANumber(value.to_string()))?;
    if n == 0 {
        return Err(ConfigError::Zero("command buffer"));
    }
    Ok(n)
}
