//! Test utilities for tenant-routes tests.
//!
//! Provides an in-memory APIRule store with Kubernetes create/delete semantics
//! (409 on duplicate create, 404 on missing get/delete).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::apirule::APIRule;
use crate::client::{ClientError, RouteClientTrait};
use crate::config::TenantRoutesConfig;

/// Creates a default test configuration.
pub fn create_test_config() -> TenantRoutesConfig {
    TenantRoutesConfig::new("c-1a2b.kyma.ondemand.com", "saas")
}

#[derive(Default)]
pub struct InMemoryRouteClient {
    rules: Mutex<BTreeMap<String, APIRule>>,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    lookup_barrier: Option<Arc<Barrier>>,
}

impl InMemoryRouteClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lookup waits until `parties` lookups are in flight.
    pub fn with_lookup_barrier(parties: usize) -> Self {
        Self {
            lookup_barrier: Some(Arc::new(Barrier::new(parties))),
            ..Self::default()
        }
    }

    /// Names of stored APIRules, sorted.
    pub fn names(&self) -> Vec<String> {
        self.rules.lock().unwrap().keys().cloned().collect()
    }

    pub fn stored(&self, name: &str) -> Option<APIRule> {
        self.rules.lock().unwrap().get(name).cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteClientTrait for InMemoryRouteClient {
    async fn get_api_rule(&self, name: &str) -> Result<APIRule, ClientError> {
        let found = self.rules.lock().unwrap().get(name).cloned();
        if let Some(barrier) = &self.lookup_barrier {
            barrier.wait().await;
        }
        found.ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    async fn create_api_rule(&self, rule: &APIRule) -> Result<APIRule, ClientError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let name = rule.metadata.name.clone().unwrap_or_default();
        let mut rules = self.rules.lock().unwrap();
        if rules.contains_key(&name) {
            return Err(ClientError::Conflict(name));
        }
        rules.insert(name, rule.clone());
        Ok(rule.clone())
    }

    async fn delete_api_rule(&self, name: &str) -> Result<(), ClientError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.rules
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    async fn check_readiness(&self) -> Result<bool, ClientError> {
        Ok(true)
    }
}
