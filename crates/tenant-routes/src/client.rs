//! Kubernetes client for APIRule resources
//!
//! Provides the create/read/delete operations the synchronizer needs, with
//! every call bounded by the configured timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::apirule::APIRule;

/// Trait for APIRule operations
///
/// This trait allows for mocking in tests while keeping the concrete
/// implementation for production use.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouteClientTrait: Send + Sync {
    /// Fetch an APIRule by name
    async fn get_api_rule(&self, name: &str) -> Result<APIRule, ClientError>;

    /// Create an APIRule
    async fn create_api_rule(&self, rule: &APIRule) -> Result<APIRule, ClientError>;

    /// Delete an APIRule by name
    async fn delete_api_rule(&self, name: &str) -> Result<(), ClientError>;

    /// Check that the APIRule API is reachable
    ///
    /// Returns `Ok(true)` if the API answered, `Err` on transport/API failures.
    async fn check_readiness(&self) -> Result<bool, ClientError>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("APIRule {0} not found")]
    NotFound(String),
    #[error("APIRule {0} already exists")]
    Conflict(String),
    #[error("Kubernetes API call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl ClientError {
    /// Whether the failure may go away on its own (network, throttling, server-side errors).
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::NotFound(_) | ClientError::Conflict(_) => false,
            ClientError::Timeout(_) => true,
            ClientError::Kube(kube::Error::Api(ae)) => ae.code == 429 || ae.code >= 500,
            ClientError::Kube(_) => true,
        }
    }

    /// Map a kube error for a named APIRule, lifting 404 and 409.
    fn from_kube(name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound(name.to_string()),
            kube::Error::Api(ae) if ae.code == 409 => ClientError::Conflict(name.to_string()),
            other => ClientError::Kube(other),
        }
    }
}

/// APIRule client backed by the Kubernetes API
pub struct KubeRouteClient {
    api: Api<APIRule>,
    timeout: Duration,
}

impl KubeRouteClient {
    /// Create a client for APIRules in `namespace`.
    pub fn new(client: Client, namespace: &str, timeout: Duration) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            timeout,
        }
    }

    async fn bounded<T, F>(&self, name: &str, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| ClientError::from_kube(name, e)),
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl RouteClientTrait for KubeRouteClient {
    #[instrument(skip(self))]
    async fn get_api_rule(&self, name: &str) -> Result<APIRule, ClientError> {
        let rule = self.bounded(name, self.api.get(name)).await?;
        debug!(name = %name, "Found APIRule");
        Ok(rule)
    }

    #[instrument(skip(self, rule), fields(name = rule.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn create_api_rule(&self, rule: &APIRule) -> Result<APIRule, ClientError> {
        let name = rule.metadata.name.as_deref().unwrap_or("unknown");
        let created = self
            .bounded(name, self.api.create(&PostParams::default(), rule))
            .await?;
        debug!(name = %name, "Created APIRule");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn delete_api_rule(&self, name: &str) -> Result<(), ClientError> {
        self.bounded(name, self.api.delete(name, &DeleteParams::default()))
            .await?;
        debug!(name = %name, "Deleted APIRule");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn check_readiness(&self) -> Result<bool, ClientError> {
        self.bounded("*", self.api.list(&ListParams::default().limit(1)))
            .await?;
        Ok(true)
    }
}

/// Implement trait for Arc-wrapped clients to support shared ownership
#[async_trait]
impl<T: RouteClientTrait + ?Sized> RouteClientTrait for Arc<T> {
    async fn get_api_rule(&self, name: &str) -> Result<APIRule, ClientError> {
        (**self).get_api_rule(name).await
    }

    async fn create_api_rule(&self, rule: &APIRule) -> Result<APIRule, ClientError> {
        (**self).create_api_rule(rule).await
    }

    async fn delete_api_rule(&self, name: &str) -> Result<(), ClientError> {
        (**self).delete_api_rule(name).await
    }

    async fn check_readiness(&self) -> Result<bool, ClientError> {
        (**self).check_readiness().await
    }
}
