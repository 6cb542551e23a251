//! Node configuration loaded from TOML, with environment overrides.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rendezvous_protocol::TransportConfig;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Overrides the discovery port.
pub const PORT_ENV: &str = "RENDEZVOUS_BCAST_PORT";
/// Overrides the broadcast destination address.
pub const HOST_ENV: &str = "RENDEZVOUS_BCAST_HOST";
/// Overrides the address advertised for the TCP data plane.
pub const IP_ENV: &str = "RENDEZVOUS_IP";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub node: NodeSettings,
}

/// Broadcast discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Broadcast destination. Computed from `ip` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Ipv4Addr>,
    /// Address the TCP data plane binds and advertises. First non-loopback
    /// interface address when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    #[serde(default = "default_repeat_period_ms")]
    pub repeat_period_ms: u64,
    #[serde(default)]
    pub include_ipv6: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: None,
            ip: None,
            repeat_period_ms: default_repeat_period_ms(),
            include_ipv6: false,
        }
    }
}

/// Data-plane settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_inproc_name")]
    pub inproc_name: String,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Consecutive failed connects before a publisher link is abandoned;
    /// `0` retries forever.
    #[serde(default = "default_max_connect_failures")]
    pub max_connect_failures: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            inproc_name: default_inproc_name(),
            queue_depth: default_queue_depth(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_connect_failures: default_max_connect_failures(),
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), NodeError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by the `*_ENV` names.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), NodeError> {
        if let Some(port) = lookup(PORT_ENV) {
            self.discovery.port = parse_override(PORT_ENV, &port)?;
        }
        if let Some(host) = lookup(HOST_ENV) {
            self.discovery.host = Some(parse_override(HOST_ENV, &host)?);
        }
        if let Some(ip) = lookup(IP_ENV) {
            self.discovery.ip = Some(parse_override(IP_ENV, &ip)?);
        }
        Ok(())
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.discovery.repeat_period_ms == 0 {
            return Err(NodeError::Config(
                "discovery.repeat_period_ms must be positive".to_string(),
            ));
        }
        if self.transport.queue_depth == 0 {
            return Err(NodeError::Config(
                "transport.queue_depth must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn repeat_period(&self) -> Duration {
        Duration::from_millis(self.discovery.repeat_period_ms)
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            queue_depth: self.transport.queue_depth,
            reconnect_interval: Duration::from_millis(self.transport.reconnect_interval_ms),
            max_connect_failures: self.transport.max_connect_failures,
        }
    }
}

fn parse_override<T>(key: &str, value: &str) -> Result<T, NodeError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| NodeError::Config(format!("invalid {key}={value:?}: {e}")))
}

fn default_port() -> u16 {
    11312
}

fn default_repeat_period_ms() -> u64 {
    1000
}

fn default_inproc_name() -> String {
    "topics".to_string()
}

fn default_queue_depth() -> usize {
    1024
}

fn default_reconnect_interval_ms() -> u64 {
    100
}

fn default_max_connect_failures() -> u32 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("port = 11312"));
        assert!(toml_str.contains("inproc_name = \"topics\""));
        assert!(!toml_str.contains("host"));
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[discovery]
port = 12000
host = "192.168.1.255"
ip = "192.168.1.10"
repeat_period_ms = 250

[transport]
inproc_name = "sensors"
max_connect_failures = 0

[node]
log_level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.discovery.port, 12000);
        assert_eq!(config.discovery.host, Some(Ipv4Addr::new(192, 168, 1, 255)));
        assert_eq!(config.discovery.ip, Some("192.168.1.10".parse().unwrap()));
        assert_eq!(config.repeat_period(), Duration::from_millis(250));
        assert_eq!(config.transport.inproc_name, "sensors");
        assert_eq!(config.transport.queue_depth, 1024);
        assert_eq!(config.transport.max_connect_failures, 0);
        assert_eq!(config.node.log_level, "debug");
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.discovery.port, 11312);
        assert_eq!(config.discovery.host, None);
        assert_eq!(config.repeat_period(), Duration::from_secs(1));
        assert_eq!(
            config.transport_config().reconnect_interval,
            Duration::from_millis(100)
        );
        assert_eq!(config.transport_config().max_connect_failures, 50);
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            (PORT_ENV, "11400"),
            (HOST_ENV, "10.0.0.255"),
            (IP_ENV, "10.0.0.7"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.discovery.port, 11400);
        assert_eq!(config.discovery.host, Some(Ipv4Addr::new(10, 0, 0, 255)));
        assert_eq!(config.discovery.ip, Some("10.0.0.7".parse().unwrap()));
    }

    #[test]
    fn unparseable_override_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == PORT_ENV).then(|| "eleven".to_string()))
            .unwrap_err();
        assert!(matches!(err, NodeError::Config(msg) if msg.contains(PORT_ENV)));
    }

    #[test]
    fn zero_repeat_period_is_rejected() {
        let mut config = Config::default();
        config.discovery.repeat_period_ms = 0;
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
        assert!(Config::default().validate().is_ok());
    }
}
