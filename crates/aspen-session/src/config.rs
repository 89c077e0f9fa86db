//! Session configuration

use std::time::Duration;

use aspen_protocol::{AUTO_UPDATE_WITH_RESPONSE, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Default interval between full status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default router address
pub const DEFAULT_HOST: &str = "192.168.0.100";

/// Connection settings for one router session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Router IP address or host name
    pub host: String,
    /// TCP port of the control interface
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interval between `**S!!` polls
    #[serde(default = "default_poll_interval", with = "duration_secs")]
    pub poll_interval: Duration,
    /// Mode sent with `**U<mode>!!` after connecting
    #[serde(default = "default_update_mode")]
    pub update_mode: u8,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_update_mode() -> u8 {
    AUTO_UPDATE_WITH_RESPONSE
}

impl SessionConfig {
    /// Create a config for a host and port with default polling
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            update_mode: AUTO_UPDATE_WITH_RESPONSE,
        }
    }
}

/// Serialize a `Duration` as fractional seconds
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
