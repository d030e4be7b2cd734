//! Process configuration
//!
//! Built once at startup from environment variables and passed by `Arc` into
//! the handlers and the synchronizer. Nothing below `main` reads the
//! environment.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::tenant::is_dns_label;

/// Default suffix appended to the tenant subdomain to form the host.
pub const DEFAULT_HOST_SUFFIX: &str = "approuter";
/// Default name of the Service that tenant traffic is routed to.
pub const DEFAULT_SERVICE_NAME: &str = "approuter";
/// Default port of the target Service.
pub const DEFAULT_SERVICE_PORT: u16 = 5000;
/// Default gateway referenced by every APIRule.
pub const DEFAULT_GATEWAY: &str = "kyma-system/kyma-gateway";
/// Default bound for each Kubernetes API call.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);
/// Default webhook listener address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
/// Default health/metrics listener address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Environment variable names
pub mod env {
    pub const CLUSTER_DOMAIN: &str = "CLUSTER_DOMAIN";
    pub const TARGET_NAMESPACE: &str = "TARGET_NAMESPACE";
    pub const POD_NAMESPACE: &str = "POD_NAMESPACE";
    pub const HOST_SUFFIX: &str = "HOST_SUFFIX";
    pub const SERVICE_NAME: &str = "SERVICE_NAME";
    pub const SERVICE_PORT: &str = "SERVICE_PORT";
    pub const GATEWAY: &str = "GATEWAY";
    pub const API_TIMEOUT_SECS: &str = "API_TIMEOUT_SECS";
    pub const BIND_ADDRESS: &str = "BIND_ADDRESS";
    pub const HEALTH_BIND_ADDRESS: &str = "HEALTH_BIND_ADDRESS";
    pub const DEPENDENCIES: &str = "DEPENDENCIES";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to parse {name} as a socket address: {source}")]
    Address {
        name: &'static str,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("Failed to parse DEPENDENCIES: {0}")]
    Dependencies(#[from] serde_json::Error),
}

/// An application this one depends on, reported to the subscription service.
///
/// Serialized either as `{"xsappname": ...}` or `{"appName": ..., "appId": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dependency {
    XsApp {
        xsappname: String,
    },
    App {
        #[serde(rename = "appName")]
        app_name: String,
        #[serde(rename = "appId")]
        app_id: String,
    },
}

#[derive(Clone, Debug)]
pub struct TenantRoutesConfig {
    /// Public domain of the cluster, used in tenant access URLs
    pub cluster_domain: String,
    /// Namespace the APIRules are created in
    pub namespace: String,
    /// Suffix appended to the subdomain to form the tenant host
    pub host_suffix: String,
    /// Target Service name
    pub service_name: String,
    /// Target Service port
    pub service_port: u16,
    /// Gateway referenced by the APIRules
    pub gateway: String,
    /// Bound applied to every Kubernetes API call
    pub api_timeout: Duration,
    /// Webhook listener
    pub bind_address: SocketAddr,
    /// Health and metrics listener
    pub health_bind_address: SocketAddr,
    /// Applications reported by the dependencies callback
    pub dependencies: Vec<Dependency>,
}

impl TenantRoutesConfig {
    /// Configuration with the given required values and every default applied.
    pub fn new(cluster_domain: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cluster_domain: cluster_domain.into(),
            namespace: namespace.into(),
            host_suffix: DEFAULT_HOST_SUFFIX.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_port: DEFAULT_SERVICE_PORT,
            gateway: DEFAULT_GATEWAY.to_string(),
            api_timeout: DEFAULT_API_TIMEOUT,
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            health_bind_address: SocketAddr::from(([0, 0, 0, 0], 8081)),
            dependencies: Vec::new(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `CLUSTER_DOMAIN`: public cluster domain (required)
    /// - `TARGET_NAMESPACE`: APIRule namespace (falls back to `POD_NAMESPACE`)
    /// - `HOST_SUFFIX`: host suffix (default: approuter)
    /// - `SERVICE_NAME` / `SERVICE_PORT`: routing target (default: approuter:5000)
    /// - `GATEWAY`: gateway reference (default: kyma-system/kyma-gateway)
    /// - `API_TIMEOUT_SECS`: per-call timeout (default: 10)
    /// - `BIND_ADDRESS` / `HEALTH_BIND_ADDRESS`: listeners
    /// - `DEPENDENCIES`: JSON array of dependencies (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cluster_domain = get(env::CLUSTER_DOMAIN).ok_or(ConfigError::Missing(env::CLUSTER_DOMAIN))?;
        let namespace = get(env::TARGET_NAMESPACE)
            .or_else(|| get(env::POD_NAMESPACE))
            .ok_or(ConfigError::Missing(env::TARGET_NAMESPACE))?;

        let mut config = Self::new(cluster_domain.trim(), namespace.trim());

        if let Some(v) = get(env::HOST_SUFFIX) {
            config.host_suffix = v;
        }
        if let Some(v) = get(env::SERVICE_NAME) {
            config.service_name = v;
        }
        if let Some(v) = get(env::GATEWAY) {
            config.gateway = v;
        }
        config.service_port = parse_or_default(env::SERVICE_PORT, get(env::SERVICE_PORT), DEFAULT_SERVICE_PORT);
        config.api_timeout = Duration::from_secs(parse_or_default(
            env::API_TIMEOUT_SECS,
            get(env::API_TIMEOUT_SECS),
            DEFAULT_API_TIMEOUT.as_secs(),
        ));
        config.bind_address = parse_addr(
            env::BIND_ADDRESS,
            get(env::BIND_ADDRESS).as_deref().unwrap_or(DEFAULT_BIND_ADDRESS),
        )?;
        config.health_bind_address = parse_addr(
            env::HEALTH_BIND_ADDRESS,
            get(env::HEALTH_BIND_ADDRESS)
                .as_deref()
                .unwrap_or(DEFAULT_HEALTH_BIND_ADDRESS),
        )?;
        if let Some(raw) = get(env::DEPENDENCIES) {
            config.dependencies = serde_json::from_str(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the rest of the service relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_domain.is_empty() {
            return Err(ConfigError::Missing(env::CLUSTER_DOMAIN));
        }
        if self.cluster_domain.contains("://") || self.cluster_domain.contains('/') {
            return Err(ConfigError::Invalid {
                name: env::CLUSTER_DOMAIN,
                reason: "must be a bare domain without scheme or path".to_string(),
            });
        }
        if !is_dns_label(&self.namespace) {
            return Err(ConfigError::Invalid {
                name: env::TARGET_NAMESPACE,
                reason: format!("'{}' is not a valid namespace name", self.namespace),
            });
        }
        if !is_dns_label(&self.host_suffix) {
            return Err(ConfigError::Invalid {
                name: env::HOST_SUFFIX,
                reason: format!("'{}' is not a DNS label", self.host_suffix),
            });
        }
        if self.service_name.is_empty() {
            return Err(ConfigError::Missing(env::SERVICE_NAME));
        }
        if self.service_port == 0 {
            return Err(ConfigError::Invalid {
                name: env::SERVICE_PORT,
                reason: "port cannot be 0".to_string(),
            });
        }
        if self.gateway.is_empty() {
            return Err(ConfigError::Missing(env::GATEWAY));
        }
        if self.api_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: env::API_TIMEOUT_SECS,
                reason: "timeout cannot be 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a numeric value, logging and falling back to the default on failure.
fn parse_or_default<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => match v.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    env_var = name,
                    value = %v,
                    error = %e,
                    default = %default,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        None => default,
    }
}

fn parse_addr(name: &'static str, raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|source| ConfigError::Address { name, source })
}
