//! Tenant subscription events and tenant identity derivation
//!
//! Every name this service produces for a tenant is derived here from the
//! subdomain, so the create and delete paths always agree on identity.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a DNS label (RFC 1035).
const MAX_LABEL_LEN: usize = 63;

/// Suffix of every APIRule name.
pub const RESOURCE_NAME_SUFFIX: &str = "resource";

// Lowercase RFC 1123 label: alphanumerics and hyphens, 1-63 chars, no leading/trailing hyphen
static LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex"));

/// Whether `value` is a lowercase RFC 1123 DNS label.
pub fn is_dns_label(value: &str) -> bool {
    LABEL_REGEX.is_match(value)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("subscribedSubdomain is missing or empty")]
    MissingSubdomain,

    #[error("subscribedSubdomain '{0}' is not a lowercase DNS label")]
    InvalidSubdomain(String),

    #[error("host '{host}' derived from subdomain exceeds {max} characters")]
    HostTooLong { host: String, max: usize },

    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

/// Body of the subscribe and unsubscribe callbacks.
///
/// Only `subscribed_subdomain` drives reconciliation; the other fields are
/// accepted so that callers can send the full payload and so they show up in logs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    #[serde(default)]
    pub subscription_app_id: Option<String>,
    #[serde(default)]
    pub subscription_app_name: Option<String>,
    #[serde(default)]
    pub subscribed_tenant_id: Option<String>,
    #[serde(default)]
    pub subscribed_subdomain: Option<String>,
    #[serde(default, rename = "globalAccountGUID")]
    pub global_account_guid: Option<String>,
    #[serde(default)]
    pub subscribed_license_type: Option<String>,
}

impl SubscriptionEvent {
    /// Validate the event and derive the tenant host.
    pub fn tenant_host(&self, suffix: &str) -> Result<TenantHost, InputError> {
        TenantHost::derive(self.subscribed_subdomain.as_deref().unwrap_or_default(), suffix)
    }
}

/// Host of a tenant, `<subdomain>-<suffix>`.
///
/// The only way to name a tenant's APIRule or build its access URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TenantHost {
    subdomain: String,
    host: String,
}

impl TenantHost {
    /// Derive the host for a subdomain.
    pub fn derive(subdomain: &str, suffix: &str) -> Result<Self, InputError> {
        if subdomain.is_empty() {
            return Err(InputError::MissingSubdomain);
        }
        if !is_dns_label(subdomain) {
            return Err(InputError::InvalidSubdomain(subdomain.to_string()));
        }

        let host = format!("{subdomain}-{suffix}");
        if host.len() > MAX_LABEL_LEN {
            return Err(InputError::HostTooLong {
                host,
                max: MAX_LABEL_LEN,
            });
        }

        Ok(Self {
            subdomain: subdomain.to_string(),
            host,
        })
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn as_str(&self) -> &str {
        &self.host
    }

    /// Name of the tenant's APIRule, `<subdomain>-<suffix>-resource`.
    pub fn resource_name(&self) -> String {
        format!("{}-{}", self.host, RESOURCE_NAME_SUFFIX)
    }

    /// Public URL of the tenant, `https://<subdomain>-<suffix>.<cluster-domain>`.
    pub fn access_url(&self, cluster_domain: &str) -> String {
        format!("https://{}.{}", self.host, cluster_domain)
    }
}

impl fmt::Display for TenantHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}
