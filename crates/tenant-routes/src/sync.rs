//! APIRule synchronizer
//!
//! Reconciles a tenant's APIRule to present (`ensure`) or absent (`remove`).
//! No state is kept between calls; every call re-queries the API.
//!
//! ## Races
//!
//! `ensure` is probe-then-create without a check-and-set. Two concurrent
//! calls for one tenant can both see the rule absent and both create it; the
//! API rejects the second with 409, which counts as success here.
//!
//! ## Lookup failures
//!
//! A lookup that fails for any reason other than 404 still leads to a create
//! attempt. If the failure was real (auth, network), the create usually fails
//! the same way and surfaces as an error; the lookup failure itself is logged
//! and counted.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::apirule::RouteTemplate;
use crate::client::{ClientError, RouteClientTrait};
use crate::metrics;
use crate::prober::{probe, Probe};
use crate::tenant::TenantHost;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to create APIRule {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: ClientError,
    },
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Create { source, .. } => source.is_transient(),
        }
    }
}

/// Successful result of `ensure`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The APIRule existed; nothing was written
    AlreadyPresent,
    /// This call created the APIRule
    Created,
    /// A concurrent request created it between probe and create
    CreatedConcurrently,
}

impl EnsureOutcome {
    fn as_str(self) -> &'static str {
        match self {
            EnsureOutcome::AlreadyPresent => "already_present",
            EnsureOutcome::Created => "created",
            EnsureOutcome::CreatedConcurrently => "conflict",
        }
    }
}

/// Result of `remove`; never an error
#[derive(Debug)]
pub enum RemoveOutcome {
    Deleted,
    AlreadyAbsent,
    /// Delete failed; the APIRule may be orphaned
    Failed(ClientError),
}

impl RemoveOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RemoveOutcome::Deleted => "deleted",
            RemoveOutcome::AlreadyAbsent => "already_absent",
            RemoveOutcome::Failed(_) => "failed",
        }
    }
}

pub struct RouteSynchronizer<C: RouteClientTrait> {
    client: Arc<C>,
    template: RouteTemplate,
}

impl<C: RouteClientTrait> RouteSynchronizer<C> {
    pub fn new(client: Arc<C>, template: RouteTemplate) -> Self {
        Self { client, template }
    }

    /// Create the tenant's APIRule unless it already exists.
    ///
    /// At most one create call is made, and none after a successful lookup.
    #[instrument(skip(self, host), fields(host = %host))]
    pub async fn ensure(&self, host: &TenantHost) -> Result<EnsureOutcome, SyncError> {
        let name = host.resource_name();

        match probe(self.client.as_ref(), &name).await {
            Probe::Present => {
                info!(resource = %name, "APIRule already exists, nothing to do");
                metrics::record_ensure(EnsureOutcome::AlreadyPresent.as_str());
                return Ok(EnsureOutcome::AlreadyPresent);
            }
            Probe::Absent => {}
            Probe::TransientError(e) => {
                warn!(
                    resource = %name,
                    error = %e,
                    transient = e.is_transient(),
                    "APIRule lookup failed, attempting create"
                );
                metrics::record_probe_error();
            }
        }

        let rule = self.template.build(host);
        let outcome = match self.client.create_api_rule(&rule).await {
            Ok(_) => {
                info!(resource = %name, host = %host, "Created APIRule");
                EnsureOutcome::Created
            }
            Err(ClientError::Conflict(_)) => {
                info!(resource = %name, "APIRule created concurrently, treating as present");
                EnsureOutcome::CreatedConcurrently
            }
            Err(source) => {
                warn!(
                    resource = %name,
                    error = %source,
                    transient = source.is_transient(),
                    "Failed to create APIRule"
                );
                let err = SyncError::Create { name, source };
                metrics::record_ensure(if err.is_transient() {
                    "failed_transient"
                } else {
                    "failed_permanent"
                });
                return Err(err);
            }
        };

        metrics::record_ensure(outcome.as_str());
        Ok(outcome)
    }

    /// Delete the tenant's APIRule, best effort.
    ///
    /// Failures are logged and counted, never returned as errors.
    #[instrument(skip(self, host), fields(host = %host))]
    pub async fn remove(&self, host: &TenantHost) -> RemoveOutcome {
        let name = host.resource_name();

        let outcome = match self.client.delete_api_rule(&name).await {
            Ok(()) => {
                info!(resource = %name, "Deleted APIRule");
                RemoveOutcome::Deleted
            }
            Err(ClientError::NotFound(_)) => {
                info!(resource = %name, "APIRule already absent");
                RemoveOutcome::AlreadyAbsent
            }
            Err(e) => {
                warn!(
                    resource = %name,
                    subdomain = %host.subdomain(),
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to delete APIRule, it may be orphaned"
                );
                metrics::record_orphaned_route();
                RemoveOutcome::Failed(e)
            }
        };

        metrics::record_remove(outcome.as_str());
        outcome
    }
}
