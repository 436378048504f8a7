// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery configuration.
//!
//! Built once at startup and handed to
//! [`DiscoveryDomain::builder`](crate::DiscoveryDomain::builder). Every field
//! has a default, so a YAML file only needs the values it changes:
//!
//! ```yaml
//! domain_id: 3
//! lease_duration_ms: 10000
//! relay: "10.0.0.1:7410"
//! security:
//!   enabled: true
//!   domain_key: "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY="
//! ```

use crate::error::{Error, Result};
use crate::transport::Locator;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default SPDP multicast group (239.255.0.1:7400).
pub const DEFAULT_MULTICAST_GROUP: Locator =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 0, 1)), 7400);

/// Complete discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub domain_id: u32,

    /// Lease announced to peers (ms)
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,

    /// Participant announcement period (ms)
    #[serde(default = "default_announce_period_ms")]
    pub announce_period_ms: u64,

    /// Scheduler tick interval (ms)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Group participant announcements are sent to (None = unicast only)
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Option<Locator>,

    /// Relay (discovery server) refreshed on a backoff schedule
    #[serde(default)]
    pub relay: Option<Locator>,

    /// Locators peers use to reach this participant
    #[serde(default)]
    pub unicast_locators: Vec<Locator>,

    /// Peers announced to directly, in addition to the multicast group
    #[serde(default)]
    pub initial_peers: Vec<Locator>,

    /// Largest encoded message sent unfragmented (bytes)
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    /// Inbound worker threads started by the runtime
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Capacity of the status channel
    #[serde(default = "default_status_queue_depth")]
    pub status_queue_depth: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub fragments: FragmentConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_lease_duration_ms() -> u64 {
    20_000
}

fn default_announce_period_ms() -> u64 {
    3_000
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_multicast_group() -> Option<Locator> {
    Some(DEFAULT_MULTICAST_GROUP)
}

fn default_max_datagram_size() -> usize {
    1400
}

fn default_worker_threads() -> usize {
    2
}

fn default_status_queue_depth() -> usize {
    256
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            domain_id: 0,
            lease_duration_ms: default_lease_duration_ms(),
            announce_period_ms: default_announce_period_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            multicast_group: default_multicast_group(),
            relay: None,
            unicast_locators: Vec::new(),
            initial_peers: Vec::new(),
            max_datagram_size: default_max_datagram_size(),
            worker_threads: default_worker_threads(),
            status_queue_depth: default_status_queue_depth(),
            retry: RetryConfig::default(),
            fragments: FragmentConfig::default(),
            directory: DirectoryConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Reliable metadata resend schedule (also drives relay refresh).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First resend interval (ms)
    pub initial_ms: u64,
    /// Backoff ceiling (ms)
    pub ceiling_ms: u64,
    /// Absolute deadline after which an unacknowledged message is abandoned (ms)
    pub deadline_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_ms: 100,
            ceiling_ms: 5_000,
            deadline_ms: 30_000,
        }
    }
}

/// Fragment reassembly limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentConfig {
    /// Incomplete messages held at once
    pub max_pending: usize,
    /// Idle time before an incomplete message is dropped (ms)
    pub timeout_ms: u64,
    /// Delivered messages remembered to drop late duplicates
    pub completed_history: usize,
    /// Payload bytes per outgoing fragment
    pub fragment_payload: usize,
    /// Largest message accepted for reassembly (bytes)
    pub max_message_size: u64,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            max_pending: 256,
            timeout_ms: 2_000,
            completed_history: 1_024,
            fragment_payload: 1_024,
            max_message_size: 1 << 20,
        }
    }
}

/// Directory limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub max_participants: usize,
    /// Removed participants remembered as `Expired`
    pub expired_history: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_participants: 1_024,
            expired_history: 256,
        }
    }
}

/// Security handshake gate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enabled: bool,
    /// Ignore participants that announce no security
    pub require_authentication: bool,
    /// Absolute handshake deadline (ms)
    pub handshake_deadline_ms: u64,
    pub resend_initial_ms: u64,
    pub resend_ceiling_ms: u64,
    /// Base64 pre-shared domain key for the built-in HMAC authenticator
    pub domain_key: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            require_authentication: true,
            handshake_deadline_ms: 10_000,
            resend_initial_ms: 200,
            resend_ceiling_ms: 2_000,
            domain_key: None,
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("enabled", &self.enabled)
            .field("require_authentication", &self.require_authentication)
            .field("handshake_deadline_ms", &self.handshake_deadline_ms)
            .field("resend_initial_ms", &self.resend_initial_ms)
            .field("resend_ceiling_ms", &self.resend_ceiling_ms)
            .field("domain_key", &self.domain_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DiscoveryConfig {
    pub fn builder() -> DiscoveryConfigBuilder {
        DiscoveryConfigBuilder::default()
    }

    /// Parse and validate a YAML document.
    #[cfg(feature = "yaml-config")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    #[cfg(feature = "yaml-config")]
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn announce_period(&self) -> Duration {
        Duration::from_millis(self.announce_period_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: &str) -> Result<()> {
            Err(Error::InvalidConfig(msg.to_string()))
        }

        if self.lease_duration_ms == 0 {
            return invalid("lease_duration_ms cannot be 0");
        }
        if self.announce_period_ms == 0 {
            return invalid("announce_period_ms cannot be 0");
        }
        if self.announce_period_ms >= self.lease_duration_ms {
            return invalid("announce_period_ms must be shorter than lease_duration_ms");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms cannot be 0");
        }
        if self.max_datagram_size < 64 {
            return invalid("max_datagram_size must be at least 64 bytes");
        }
        if self.worker_threads == 0 {
            return invalid("worker_threads cannot be 0");
        }
        if self.status_queue_depth == 0 {
            return invalid("status_queue_depth cannot be 0");
        }
        if self.retry.initial_ms == 0 || self.retry.ceiling_ms < self.retry.initial_ms {
            return invalid("retry.ceiling_ms must be >= retry.initial_ms > 0");
        }
        if self.retry.deadline_ms == 0 {
            return invalid("retry.deadline_ms cannot be 0");
        }
        if self.fragments.max_pending == 0 {
            return invalid("fragments.max_pending cannot be 0");
        }
        if self.fragments.fragment_payload == 0
            || self.fragments.fragment_payload > self.max_datagram_size
        {
            return invalid("fragments.fragment_payload must be in 1..=max_datagram_size");
        }
        if self.fragments.max_message_size == 0 {
            return invalid("fragments.max_message_size cannot be 0");
        }
        if self.directory.max_participants == 0 {
            return invalid("directory.max_participants cannot be 0");
        }
        if self.security.enabled {
            let s = &self.security;
            if s.handshake_deadline_ms == 0 {
                return invalid("security.handshake_deadline_ms cannot be 0");
            }
            if s.resend_initial_ms == 0 || s.resend_ceiling_ms < s.resend_initial_ms {
                return invalid("security.resend_ceiling_ms must be >= resend_initial_ms > 0");
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`DiscoveryConfig`].
///
/// ```
/// use hdds_discovery_core::DiscoveryConfig;
/// use std::time::Duration;
///
/// let config = DiscoveryConfig::builder()
///     .domain_id(7)
///     .lease_duration(Duration::from_secs(10))
///     .announce_period(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// assert_eq!(config.domain_id, 7);
/// ```
#[derive(Debug, Default)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryConfigBuilder {
    pub fn domain_id(mut self, domain_id: u32) -> Self {
        self.config.domain_id = domain_id;
        self
    }

    pub fn lease_duration(mut self, lease: Duration) -> Self {
        self.config.lease_duration_ms = lease.as_millis() as u64;
        self
    }

    pub fn announce_period(mut self, period: Duration) -> Self {
        self.config.announce_period_ms = period.as_millis() as u64;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn multicast_group(mut self, group: Option<Locator>) -> Self {
        self.config.multicast_group = group;
        self
    }

    pub fn relay(mut self, relay: Locator) -> Self {
        self.config.relay = Some(relay);
        self
    }

    pub fn unicast_locator(mut self, locator: Locator) -> Self {
        self.config.unicast_locators.push(locator);
        self
    }

    pub fn initial_peer(mut self, peer: Locator) -> Self {
        self.config.initial_peers.push(peer);
        self
    }

    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.config.max_datagram_size = size;
        self
    }

    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    pub fn status_queue_depth(mut self, depth: usize) -> Self {
        self.config.status_queue_depth = depth;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn fragments(mut self, fragments: FragmentConfig) -> Self {
        self.config.fragments = fragments;
        self
    }

    pub fn directory(mut self, directory: DirectoryConfig) -> Self {
        self.config.directory = directory;
        self
    }

    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.config.security = security;
        self
    }

    pub fn build(self) -> Result<DiscoveryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DiscoveryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.multicast_group, Some(DEFAULT_MULTICAST_GROUP));
        assert!(!config.security.enabled);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = DiscoveryConfig::default();
        config.announce_period_ms = config.lease_duration_ms;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = DiscoveryConfig::builder().worker_threads(0).build();
        assert!(config.is_err());

        let mut config = DiscoveryConfig::default();
        config.fragments.fragment_payload = config.max_datagram_size + 1;
        assert!(config.validate().is_err());

        let mut config = DiscoveryConfig::default();
        config.fragments.max_message_size = 0;
        assert!(config.validate().is_err());

        let mut config = DiscoveryConfig::default();
        config.security.enabled = true;
        config.security.resend_ceiling_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_security_debug_redacts_key() {
        let security = SecurityConfig {
            domain_key: Some("c2VjcmV0".to_string()),
            ..SecurityConfig::default()
        };
        let shown = format!("{:?}", security);
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("c2VjcmV0"));
    }

    #[cfg(feature = "yaml-config")]
    #[test]
    fn test_yaml_partial_document() {
        let yaml = r#"
domain_id: 3
lease_duration_ms: 10000
relay: "10.0.0.1:7410"
initial_peers: ["192.168.1.20:7410"]
retry:
  ceiling_ms: 8000
security:
  enabled: true
"#;
        let config = DiscoveryConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.domain_id, 3);
        assert_eq!(config.lease_duration(), Duration::from_secs(10));
        assert_eq!(config.relay, Some("10.0.0.1:7410".parse().unwrap()));
        assert_eq!(config.initial_peers.len(), 1);
        assert_eq!(config.retry.ceiling_ms, 8000);
        assert_eq!(config.retry.initial_ms, RetryConfig::default().initial_ms);
        assert!(config.security.enabled);
        assert!(config.security.require_authentication);
        assert_eq!(config.multicast_group, Some(DEFAULT_MULTICAST_GROUP));
    }

    #[cfg(feature = "yaml-config")]
    #[test]
    fn test_yaml_file_and_errors() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "domain_id: 9\nworker_threads: 4").unwrap();
        let config = DiscoveryConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.domain_id, 9);
        assert_eq!(config.worker_threads, 4);

        assert!(matches!(
            DiscoveryConfig::from_yaml_str("domain_id: [not, a, number]"),
            Err(Error::Yaml(_))
        ));
        assert!(matches!(
            DiscoveryConfig::from_yaml_str("lease_duration_ms: 0"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            DiscoveryConfig::from_yaml_file("/nonexistent/discovery.yaml"),
            Err(Error::Io(_))
        ));
    }
}
