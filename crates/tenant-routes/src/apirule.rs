//! Kyma APIRule resource and the per-tenant template
//!
//! `gateway.kyma-project.io/v1beta1` APIRules expose a Service host through
//! the cluster gateway. One APIRule is managed per tenant.

use std::collections::BTreeMap;

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::TenantRoutesConfig;
use crate::tenant::TenantHost;

/// HTTP methods every tenant rule allows.
pub const ALLOWED_METHODS: [&str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// Path pattern every tenant rule matches.
pub const RULE_PATH: &str = "/.*";

/// Access strategy handler that lets all requests through.
pub const ALLOW_HANDLER: &str = "allow";

/// Labels and annotations stamped on managed APIRules
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const MANAGED_BY_VALUE: &str = "tenant-routes";
    pub const SUBDOMAIN: &str = "tenant-routes.io/subdomain";
    pub const ACCESS_URL: &str = "tenant-routes.io/access-url";
}

/// Service the APIRule routes to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleService {
    pub name: String,
    pub port: u16,
}

/// Access strategy applied to a rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccessStrategy {
    /// Handler name (e.g., "allow", "jwt")
    pub handler: String,
}

/// Path rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub path: String,
    pub methods: Vec<String>,
    pub access_strategies: Vec<AccessStrategy>,
}

/// APIRule spec
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.kyma-project.io",
    version = "v1beta1",
    kind = "APIRule",
    plural = "apirules",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct APIRuleSpec {
    /// Gateway reference (`<namespace>/<name>`)
    pub gateway: String,
    /// Exposed host
    pub host: String,
    /// Target Service
    pub service: RuleService,
    /// Access rules
    pub rules: Vec<Rule>,
}

/// Fixed routing coordinates shared by every tenant's APIRule.
#[derive(Clone, Debug)]
pub struct RouteTemplate {
    pub service_name: String,
    pub service_port: u16,
    pub gateway: String,
    pub namespace: String,
    pub cluster_domain: String,
}

impl RouteTemplate {
    pub fn from_config(config: &TenantRoutesConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            service_port: config.service_port,
            gateway: config.gateway.clone(),
            namespace: config.namespace.clone(),
            cluster_domain: config.cluster_domain.clone(),
        }
    }

    /// Build the complete APIRule for a tenant host.
    pub fn build(&self, host: &TenantHost) -> APIRule {
        let mut label_map = BTreeMap::new();
        label_map.insert(
            labels::MANAGED_BY.to_string(),
            labels::MANAGED_BY_VALUE.to_string(),
        );
        label_map.insert(labels::SUBDOMAIN.to_string(), host.subdomain().to_string());

        let mut annotations = BTreeMap::new();
        annotations.insert(
            labels::ACCESS_URL.to_string(),
            host.access_url(&self.cluster_domain),
        );

        APIRule {
            metadata: ObjectMeta {
                name: Some(host.resource_name()),
                namespace: Some(self.namespace.clone()),
                labels: Some(label_map),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: APIRuleSpec {
                gateway: self.gateway.clone(),
                host: host.as_str().to_string(),
                service: RuleService {
                    name: self.service_name.clone(),
                    port: self.service_port,
                },
                rules: vec![Rule {
                    path: RULE_PATH.to_string(),
                    methods: ALLOWED_METHODS.iter().map(|m| m.to_string()).collect(),
                    access_strategies: vec![AccessStrategy {
                        handler: ALLOW_HANDLER.to_string(),
                    }],
                }],
            },
        }
    }
}
