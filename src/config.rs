//! Bridge configuration
//!
//! Loaded from a JSON file with camelCase keys. Every section and field is
//! optional and falls back to its `Default`. Durations are milliseconds.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use ship_bridge_shared::{limits, FieldFailurePolicy};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ship-net-bridge.conf";

/// MQTT broker session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MqttConfig {
    /// Broker URL, `scheme://host[:port]`
    pub broker: String,
    /// Time allowed for the first connection acknowledgement (ms)
    pub conn_timeout: u64,
    pub username: String,
    pub password: String,
    /// Ship identifier, also the MQTT client id
    pub ship_id: String,
    pub announce_topic: String,
    /// Time allowed for an announce to be delivered (ms)
    pub announce_timeout: u64,
    /// Time allowed for a clean disconnect on stop (ms)
    pub disconnect_timeout: u64,
    /// Verify the broker certificate on TLS connections
    pub cert_check: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "tcp://127.0.0.1:1883".into(),
            conn_timeout: 5000,
            username: String::new(),
            password: String::new(),
            ship_id: "ship-1".into(),
            announce_topic: "ships/announce".into(),
            announce_timeout: 3000,
            disconnect_timeout: 1000,
            cert_check: true,
        }
    }
}

impl MqttConfig {
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_timeout)
    }

    pub fn announce_timeout(&self) -> Duration {
        Duration::from_millis(self.announce_timeout)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout)
    }

    /// Credentials, only when a username is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }
}

/// Unix-socket peer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerConfig {
    /// Path of the peer's Unix socket
    pub socket_name: String,
    /// Capacity of the adapter's command queue
    pub queue_size: usize,
    /// Time allowed for the peer to reply to one item (ms)
    pub reply_timeout: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::with_socket("")
    }
}

impl PeerConfig {
    fn with_socket(socket_name: &str) -> Self {
        Self {
            socket_name: socket_name.into(),
            queue_size: limits::PEER_QUEUE_CAPACITY,
            reply_timeout: 1000,
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout)
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.socket_name.is_empty() {
            bail!("{}.socketName must not be empty", section);
        }
        if self.queue_size == 0 {
            bail!("{}.queueSize must be positive", section);
        }
        if self.reply_timeout == 0 {
            bail!("{}.replyTimeout must be positive", section);
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub mqtt: MqttConfig,
    pub ship_control: PeerConfig,
    pub ship_nav: PeerConfig,
    /// Liveness announce period (ms)
    pub announce_interval: u64,
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// What to do with a waypoint whose coordinate fails to parse
    pub waypoint_field_failure: FieldFailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            ship_control: PeerConfig::with_socket("/run/ship-control.sock"),
            ship_nav: PeerConfig::with_socket("/run/ship-nav.sock"),
            announce_interval: 3000,
            log_level: "info".into(),
            waypoint_field_failure: FieldFailurePolicy::default(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval)
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.broker.is_empty() {
            bail!("mqtt.broker must not be empty");
        }
        if self.mqtt.ship_id.is_empty() {
            bail!("mqtt.shipId must not be empty");
        }
        if self.mqtt.announce_topic.is_empty() {
            bail!("mqtt.announceTopic must not be empty");
        }
        if self.mqtt.conn_timeout == 0 {
            bail!("mqtt.connTimeout must be positive");
        }
        if self.mqtt.announce_timeout == 0 {
            bail!("mqtt.announceTimeout must be positive");
        }
        if self.announce_interval == 0 {
            bail!("announceInterval must be positive");
        }

        self.ship_control.validate("shipControl")?;
        self.ship_nav.validate("shipNav")?;
        Ok(())
    }
}
