//! Configuration for authcheck-rs
//!
//! Every section is optional in the TOML file; missing keys fall back to the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{AuthCheckError, Result};

/// DKIM selector labels probed when the operator does not supply a catalog.
///
/// DNS offers no way to enumerate selectors, so this list covers the labels
/// used by the common hosted mail providers.
pub const DEFAULT_DKIM_SELECTORS: &[&str] = &[
    "default",
    "google",
    "selector1",      // Microsoft 365
    "selector2",      // Microsoft 365
    "k1",             // Mailchimp
    "k2",
    "mail",
    "dkim",
    "s1",
    "s2",
    "smtp",
    "mx",
    "everlytickey1",
    "everlytickey2",
    "mandrill",
    "mxvault",
];

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub dkim: DkimConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Resolver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsConfig {
    /// Per-query timeout in seconds
    #[serde(default = "default_dns_timeout")]
    pub timeout_secs: u64,
    /// Attempts per query before the resolver gives up
    #[serde(default = "default_dns_attempts")]
    pub attempts: usize,
    /// Upstream nameservers; empty means the system configuration
    #[serde(default)]
    pub nameservers: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DkimConfig {
    /// Selector catalog, probed in order
    #[serde(default = "default_selectors")]
    pub selectors: Vec<String>,
}

/// SMTP relay probe configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Run live SMTP probes against the mail exchangers
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ports tried in order for each mail exchanger
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    /// Timeout in seconds for each connect, read and write
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
    /// Name announced in EHLO/HELO
    #[serde(default = "default_helo_name")]
    pub helo_name: String,
    /// Envelope sender used for the relay test
    #[serde(default = "default_probe_sender")]
    pub probe_sender: String,
    /// External recipient used for the relay test
    #[serde(default = "default_probe_recipient")]
    pub probe_recipient: String,
    /// Try to upgrade the session when STARTTLS is advertised
    #[serde(default = "default_true")]
    pub attempt_starttls: bool,
    /// Subdomains inspected for MX/A records in the relay summary
    #[serde(default = "default_subdomains")]
    pub subdomains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_dns_timeout() -> u64 {
    3
}

fn default_dns_attempts() -> usize {
    1
}

fn default_selectors() -> Vec<String> {
    DEFAULT_DKIM_SELECTORS.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_ports() -> Vec<u16> {
    vec![25, 587]
}

fn default_relay_timeout() -> u64 {
    5
}

fn default_helo_name() -> String {
    "authcheck.invalid".to_string()
}

fn default_probe_sender() -> String {
    "relay-probe@authcheck.invalid".to_string()
}

fn default_probe_recipient() -> String {
    "relay-test@example.org".to_string()
}

fn default_subdomains() -> Vec<String> {
    ["mail", "smtp", "relay", "mx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dns_timeout(),
            attempts: default_dns_attempts(),
            nameservers: Vec::new(),
        }
    }
}

impl DnsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DkimConfig {
    fn default() -> Self {
        Self {
            selectors: default_selectors(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ports: default_ports(),
            timeout_secs: default_relay_timeout(),
            helo_name: default_helo_name(),
            probe_sender: default_probe_sender(),
            probe_recipient: default_probe_recipient(),
            attempt_starttls: true,
            subdomains: default_subdomains(),
        }
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthCheckError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| AuthCheckError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every probe meaningless or unbounded
    pub fn validate(&self) -> Result<()> {
        if self.dns.timeout_secs == 0 {
            return Err(AuthCheckError::Config(
                "dns.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.dns.attempts == 0 {
            return Err(AuthCheckError::Config(
                "dns.attempts must be greater than zero".to_string(),
            ));
        }
        if self.relay.timeout_secs == 0 {
            return Err(AuthCheckError::Config(
                "relay.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.relay.enabled && self.relay.ports.is_empty() {
            return Err(AuthCheckError::Config(
                "relay.ports must list at least one port".to_string(),
            ));
        }
        if self.dkim.selectors.iter().any(|s| s.trim().is_empty()) {
            return Err(AuthCheckError::Config(
                "dkim.selectors must not contain empty labels".to_string(),
            ));
        }
        Ok(())
    }
}
