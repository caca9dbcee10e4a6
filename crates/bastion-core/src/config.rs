//! Configuration types for the bastion system
//!
//! [`Configuration`] is gathered once from the [`EnvFile`] store and is
//! immutable afterwards; every component receives it explicitly. Required
//! keys are checked together so the operator sees every gap in one run.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::env_file::EnvFile;
use crate::error::{Error, Result};

/// Store keys understood by the provisioner
pub mod keys {
    /// Bastion's WireGuard private key (generated and persisted when empty)
    pub const WG_PRIVATE_KEY: &str = "WG_PRIVATE_KEY";
    /// Public key of the single VPN peer
    pub const WG_PEER_PUBLIC_KEY: &str = "WG_PEER_PUBLIC_KEY";
    /// Bastion's address inside the VPN
    pub const WG_CLIENT_IP: &str = "WG_CLIENT_IP";
    /// Comma-separated subnets routed through the tunnel
    pub const WG_ALLOWED_IPS: &str = "WG_ALLOWED_IPS";
    /// Public domain served by the reverse proxy
    pub const DOMAIN: &str = "DOMAIN";
    /// Admin identity installed by the credential bootstrap
    pub const ADMIN_EMAIL: &str = "ADMIN_EMAIL";
    /// Admin password installed by the credential bootstrap
    pub const ADMIN_PASSWORD: &str = "ADMIN_PASSWORD";
    /// Database password shared by the proxy and its database
    pub const DB_PASSWORD: &str = "DB_PASSWORD";

    pub const WG_INTERFACE: &str = "WG_INTERFACE";
    pub const WG_LISTEN_PORT: &str = "WG_LISTEN_PORT";
    pub const WG_KEEPALIVE: &str = "WG_KEEPALIVE";
    pub const STACK_NETWORK: &str = "STACK_NETWORK";
    pub const STACK_SUBNET: &str = "STACK_SUBNET";
    pub const STACK_BRIDGE: &str = "STACK_BRIDGE";
    pub const PROXY_IMAGE: &str = "PROXY_IMAGE";
    pub const DB_IMAGE: &str = "DB_IMAGE";
    pub const ADMIN_NAME: &str = "ADMIN_NAME";
    pub const ADMIN_NICKNAME: &str = "ADMIN_NICKNAME";
    pub const ADMIN_API_URL: &str = "ADMIN_API_URL";
    pub const HANDSHAKE_MAX_ATTEMPTS: &str = "HANDSHAKE_MAX_ATTEMPTS";
    pub const HANDSHAKE_DELAY_SECS: &str = "HANDSHAKE_DELAY_SECS";
}

/// Keys that must be present and non-empty before anything is touched
pub const REQUIRED_KEYS: &[&str] = &[
    keys::WG_PEER_PUBLIC_KEY,
    keys::WG_CLIENT_IP,
    keys::WG_ALLOWED_IPS,
    keys::DOMAIN,
    keys::ADMIN_EMAIL,
    keys::ADMIN_PASSWORD,
    keys::DB_PASSWORD,
];

/// Factory-default admin identity of the reverse proxy
pub const DEFAULT_ADMIN_IDENTITY: &str = "admin@example.com";

/// Factory-default admin password of the reverse proxy
pub const DEFAULT_ADMIN_SECRET: &str = "changeme";

/// A value that must never reach logs
///
/// `Debug` is redacted; use [`Secret::expose`] at the single point where the
/// raw value is written into an artifact or a request.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret value
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

/// Main provisioning configuration
#[derive(Debug, Clone)]
pub struct Configuration {
    /// VPN interface settings
    pub wireguard: WireGuardSettings,

    /// Reverse proxy + database stack settings
    pub stack: StackSettings,

    /// Admin identity for the credential bootstrap
    pub admin: AdminSettings,

    /// Readiness polling policy
    pub handshake: HandshakeSettings,
}

/// WireGuard interface settings
#[derive(Debug, Clone)]
pub struct WireGuardSettings {
    /// Interface name (e.g. "wg0")
    pub interface: String,
    /// Private key; `None` until generated
    pub private_key: Option<Secret>,
    /// Public key of the peer
    pub peer_public_key: String,
    /// Bastion address inside the tunnel, with or without prefix
    pub client_ip: String,
    /// Subnets routed through the tunnel
    pub allowed_ips: Vec<String>,
    /// UDP listen port
    pub listen_port: u16,
    /// PersistentKeepalive interval in seconds
    pub keepalive_secs: u16,
}

impl WireGuardSettings {
    /// Interface address in CIDR notation
    ///
    /// A bare client IP borrows the prefix length of the first allowed
    /// subnet, so `10.0.0.2` with `10.0.0.0/24` becomes `10.0.0.2/24`.
    pub fn address(&self) -> String {
        if self.client_ip.contains('/') {
            return self.client_ip.clone();
        }

        let default_prefix = match self.client_ip.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => 128,
            _ => 32,
        };

        let prefix = self
            .allowed_ips
            .first()
            .and_then(|subnet| subnet.split_once('/'))
            .and_then(|(_, len)| len.trim().parse::<u8>().ok())
            .unwrap_or(default_prefix);

        format!("{}/{}", self.client_ip, prefix)
    }
}

/// Container stack settings
#[derive(Debug, Clone)]
pub struct StackSettings {
    /// Public domain served by the proxy
    pub domain: String,
    /// Database password
    pub db_password: Secret,
    /// Container network name
    pub network: String,
    /// Container network subnet
    pub subnet: String,
    /// Host bridge interface backing the container network
    pub bridge: String,
    /// Reverse proxy image
    pub proxy_image: String,
    /// Database image
    pub db_image: String,
}

/// Admin identity installed by the credential bootstrap
#[derive(Debug, Clone)]
pub struct AdminSettings {
    /// Base URL of the proxy's admin API
    pub api_url: String,
    /// New admin email
    pub email: String,
    /// New admin password
    pub password: Secret,
    /// Display name
    pub name: String,
    /// Nickname
    pub nickname: String,
    /// Identity used to authenticate the bootstrap write
    pub bootstrap_identity: String,
    /// Password used to authenticate the bootstrap write
    pub bootstrap_secret: Secret,
}

/// Readiness polling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeSettings {
    /// Maximum number of readiness probes
    pub max_attempts: u32,
    /// Delay between probes (in seconds)
    pub delay_secs: u64,
}

impl HandshakeSettings {
    /// Delay between probes
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    30
}

fn default_delay_secs() -> u64 {
    10
}

impl Configuration {
    /// Build the configuration from the store
    ///
    /// Fails with a precondition error listing every required key that is
    /// missing or empty, and with a configuration error for malformed
    /// optional values. Nothing is mutated either way.
    pub fn from_store(store: &EnvFile) -> Result<Self> {
        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| store.get_non_empty(key).is_none())
            .collect();

        if !missing.is_empty() {
            return Err(Error::precondition(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )));
        }

        let required = |key: &str| store.get_non_empty(key).unwrap_or_default().to_string();
        let optional = |key: &str, default: &str| {
            store.get_non_empty(key).unwrap_or(default).to_string()
        };

        let allowed_ips: Vec<String> = required(keys::WG_ALLOWED_IPS)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            wireguard: WireGuardSettings {
                interface: optional(keys::WG_INTERFACE, "wg0"),
                private_key: store.get_non_empty(keys::WG_PRIVATE_KEY).map(Secret::new),
                peer_public_key: required(keys::WG_PEER_PUBLIC_KEY),
                client_ip: required(keys::WG_CLIENT_IP),
                allowed_ips,
                listen_port: parse_number(store, keys::WG_LISTEN_PORT, 51820)?,
                keepalive_secs: parse_number(store, keys::WG_KEEPALIVE, 25)?,
            },
            stack: StackSettings {
                domain: required(keys::DOMAIN),
                db_password: Secret::new(required(keys::DB_PASSWORD)),
                network: optional(keys::STACK_NETWORK, "bastion_net"),
                subnet: optional(keys::STACK_SUBNET, "172.28.0.0/24"),
                bridge: optional(keys::STACK_BRIDGE, "bastion0"),
                proxy_image: optional(keys::PROXY_IMAGE, "jc21/nginx-proxy-manager:latest"),
                db_image: optional(keys::DB_IMAGE, "jc21/mariadb-aria:latest"),
            },
            admin: AdminSettings {
                api_url: optional(keys::ADMIN_API_URL, "http://127.0.0.1:81"),
                email: required(keys::ADMIN_EMAIL),
                password: Secret::new(required(keys::ADMIN_PASSWORD)),
                name: optional(keys::ADMIN_NAME, "Administrator"),
                nickname: optional(keys::ADMIN_NICKNAME, "Admin"),
                bootstrap_identity: DEFAULT_ADMIN_IDENTITY.to_string(),
                bootstrap_secret: Secret::new(DEFAULT_ADMIN_SECRET),
            },
            handshake: HandshakeSettings {
                max_attempts: parse_number(
                    store,
                    keys::HANDSHAKE_MAX_ATTEMPTS,
                    default_max_attempts(),
                )?,
                delay_secs: parse_number(store, keys::HANDSHAKE_DELAY_SECS, default_delay_secs())?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Return a copy carrying the resolved private key
    pub fn with_private_key(mut self, private_key: Secret) -> Self {
        self.wireguard.private_key = Some(private_key);
        self
    }

    /// The resolved private key
    pub fn private_key(&self) -> Result<&Secret> {
        self.wireguard
            .private_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::precondition("WireGuard private key has not been resolved"))
    }

    /// Validate value formats
    pub fn validate(&self) -> Result<()> {
        let wg = &self.wireguard;

        let bare_ip = wg.client_ip.split('/').next().unwrap_or_default();
        if bare_ip.parse::<IpAddr>().is_err() {
            return Err(Error::config(format!(
                "{} is not a valid IP address: {}",
                keys::WG_CLIENT_IP,
                wg.client_ip
            )));
        }

        if wg.allowed_ips.is_empty() {
            return Err(Error::config(format!(
                "{} must contain at least one subnet",
                keys::WG_ALLOWED_IPS
            )));
        }

        if wg.listen_port == 0 {
            return Err(Error::config(format!("{} must be > 0", keys::WG_LISTEN_PORT)));
        }

        if wg.interface.is_empty()
            || wg.interface.len() > 15
            || !wg
                .interface
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::config(format!(
                "{} is not a valid interface name: {}",
                keys::WG_INTERFACE,
                wg.interface
            )));
        }

        validate_domain_name(&self.stack.domain)?;

        if !self.admin.email.contains('@') {
            return Err(Error::config(format!(
                "{} does not look like an email address: {}",
                keys::ADMIN_EMAIL,
                self.admin.email
            )));
        }

        if !self.admin.api_url.starts_with("http://") && !self.admin.api_url.starts_with("https://")
        {
            return Err(Error::config(format!(
                "{} must use HTTP or HTTPS scheme. Got: {}",
                keys::ADMIN_API_URL,
                self.admin.api_url
            )));
        }

        if self.handshake.max_attempts == 0 {
            return Err(Error::config(format!(
                "{} must be at least 1",
                keys::HANDSHAKE_MAX_ATTEMPTS
            )));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(store: &EnvFile, key: &str, default: T) -> Result<T> {
    match store.get_non_empty(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{} must be a number. Got: {}", key, raw))),
        None => Ok(default),
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks: total length, label length, characters and hyphen
/// placement.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.len() > 253 {
        return Err(Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

/// Filesystem locations of every managed artifact
///
/// [`HostLayout::under`] prefixes all paths with a root directory, which is
/// how staging trees and tests avoid touching the real host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// WireGuard configuration directory
    pub wireguard_dir: PathBuf,
    /// sysctl drop-in directory
    pub sysctl_dir: PathBuf,
    /// Directory holding the stack definition
    pub stack_dir: PathBuf,
    /// systemd unit directory
    pub systemd_dir: PathBuf,
}

impl HostLayout {
    /// Layout rooted at `root` ("/" gives the real host paths)
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            wireguard_dir: root.join("etc/wireguard"),
            sysctl_dir: root.join("etc/sysctl.d"),
            stack_dir: root.join("opt/bastion"),
            systemd_dir: root.join("etc/systemd/system"),
        }
    }
}

impl Default for HostLayout {
    fn default() -> Self {
        Self::under("/")
    }
}
