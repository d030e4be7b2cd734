//! tenant-routes: subscription webhooks that provision per-tenant Kyma APIRules

pub mod apirule;
pub mod client;
pub mod config;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod prober;
pub mod sync;
pub mod tenant;

#[cfg(test)]
pub mod test_utils;

pub use apirule::APIRule;
pub use config::TenantRoutesConfig;
pub use sync::RouteSynchronizer;
