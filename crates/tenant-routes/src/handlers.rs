//! Subscription callback handlers
//!
//! - `PUT    /callback/v1.0/tenants/{*tenant}`: onboard, answers the tenant URL
//! - `DELETE /callback/v1.0/tenants/{*tenant}`: offboard, always confirmed
//! - `GET    /callback/v1.0/dependencies`: dependent applications

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::client::RouteClientTrait;
use crate::config::{Dependency, TenantRoutesConfig};
use crate::sync::{RemoveOutcome, RouteSynchronizer, SyncError};
use crate::tenant::{InputError, SubscriptionEvent, TenantHost};

pub const TENANTS_PATH: &str = "/callback/v1.0/tenants/{*tenant}";
pub const DEPENDENCIES_PATH: &str = "/callback/v1.0/dependencies";

/// State shared by the callback handlers
pub struct AppState<C: RouteClientTrait> {
    pub config: Arc<TenantRoutesConfig>,
    pub synchronizer: RouteSynchronizer<C>,
}

impl<C: RouteClientTrait> AppState<C> {
    pub fn new(config: Arc<TenantRoutesConfig>, synchronizer: RouteSynchronizer<C>) -> Self {
        Self {
            config,
            synchronizer,
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid subscription event: {0}")]
    Input(#[from] InputError),

    #[error("tenant provisioning failed: {0}")]
    Provisioning(#[from] SyncError),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            HandlerError::Input(_) => StatusCode::BAD_REQUEST,
            HandlerError::Provisioning(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Build the callback router.
pub fn router<C: RouteClientTrait + 'static>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route(TENANTS_PATH, put(subscribe::<C>).delete(unsubscribe::<C>))
        .route(DEPENDENCIES_PATH, get(dependencies::<C>))
        .with_state(state)
}

/// Validate the request body and derive the tenant host.
fn tenant_host(
    body: Result<Json<SubscriptionEvent>, JsonRejection>,
    suffix: &str,
) -> Result<TenantHost, HandlerError> {
    let Json(event) = body.map_err(|e| InputError::MalformedBody(e.body_text()))?;
    Ok(event.tenant_host(suffix)?)
}

/// Onboard a tenant: ensure its APIRule and answer its access URL.
#[instrument(skip(state, body))]
async fn subscribe<C: RouteClientTrait + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(tenant): Path<String>,
    body: Result<Json<SubscriptionEvent>, JsonRejection>,
) -> Result<String, HandlerError> {
    let host = tenant_host(body, &state.config.host_suffix).inspect_err(|e| {
        warn!(error = %e, "Rejected subscription");
    })?;
    let url = host.access_url(&state.config.cluster_domain);

    info!(subdomain = %host.subdomain(), url = %url, "Subscribing tenant");

    match state.synchronizer.ensure(&host).await {
        Ok(outcome) => {
            info!(subdomain = %host.subdomain(), outcome = ?outcome, "Tenant subscribed");
            Ok(url)
        }
        Err(e) => {
            error!(subdomain = %host.subdomain(), error = %e, "Tenant subscription failed");
            Err(e.into())
        }
    }
}

/// Offboard a tenant: delete its APIRule, best effort.
#[instrument(skip(state, body))]
async fn unsubscribe<C: RouteClientTrait + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(tenant): Path<String>,
    body: Result<Json<SubscriptionEvent>, JsonRejection>,
) -> Result<String, HandlerError> {
    // Without a valid subdomain there is no APIRule name to delete.
    let host = tenant_host(body, &state.config.host_suffix).inspect_err(|e| {
        warn!(error = %e, "Rejected unsubscription");
    })?;

    info!(subdomain = %host.subdomain(), "Unsubscribing tenant");

    match state.synchronizer.remove(&host).await {
        RemoveOutcome::Failed(e) => {
            warn!(
                subdomain = %host.subdomain(),
                error = %e,
                "Tenant unsubscribed, APIRule cleanup failed"
            );
        }
        outcome => {
            info!(subdomain = %host.subdomain(), outcome = ?outcome, "Tenant unsubscribed");
        }
    }

    Ok(format!("Tenant {} unsubscribed", host.subdomain()))
}

/// Applications this one depends on.
async fn dependencies<C: RouteClientTrait + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<Vec<Dependency>> {
    Json(state.config.dependencies.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apirule::RouteTemplate;
    use crate::client::{ClientError, MockRouteClientTrait};
    use crate::test_utils::{create_test_config, InMemoryRouteClient};
    use axum::body::Body;
    use axum::http::{header, Request};
    use kube::core::ErrorResponse;
    use tower::ServiceExt;

    const ACME_URL: &str = "https://acme-approuter.c-1a2b.kyma.ondemand.com";

    fn state_with<C: RouteClientTrait>(client: Arc<C>, config: TenantRoutesConfig) -> Arc<AppState<C>> {
        let template = RouteTemplate::from_config(&config);
        Arc::new(AppState::new(
            Arc::new(config),
            RouteSynchronizer::new(client, template),
        ))
    }

    fn tenant_request(method: &str, tenant_id: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(format!("/callback/v1.0/tenants/{tenant_id}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn event_body(subdomain: &str) -> String {
        serde_json::json!({
            "subscriptionAppId": "saas-app!t42",
            "subscriptionAppName": "saas-app",
            "subscribedTenantId": "7b20408e-3fe0-4ade-aa2e-ad97baac72e8",
            "subscribedSubdomain": subdomain,
            "globalAccountGUID": "2b7a5f4c-a12b-4e4b-9b7e-7a0f2c3d4e5f",
            "subscribedLicenseType": "PRODUCTIVE"
        })
        .to_string()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn server_error() -> ClientError {
        ClientError::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "etcdserver: request timed out".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        }))
    }

    mod subscribe_tests {
        use super::*;

        #[tokio::test]
        async fn test_subscribe_creates_rule_and_returns_url() {
            let client = Arc::new(InMemoryRouteClient::new());
            let app = router(state_with(client.clone(), create_test_config()));

            let (status, body) =
                send(app, tenant_request("PUT", "7b20408e", &event_body("acme"))).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, ACME_URL);
            assert_eq!(client.names(), vec!["acme-approuter-resource"]);

            let rule = client.stored("acme-approuter-resource").unwrap();
            assert_eq!(rule.spec.host, "acme-approuter");
            assert_eq!(rule.metadata.namespace.as_deref(), Some("saas"));
        }

        #[tokio::test]
        async fn test_subscribe_twice_returns_same_url_without_second_create() {
            let client = Arc::new(InMemoryRouteClient::new());
            let state = state_with(client.clone(), create_test_config());

            let (_, first) = send(
                router(state.clone()),
                tenant_request("PUT", "t1", &event_body("acme")),
            )
            .await;
            let (status, second) =
                send(router(state), tenant_request("PUT", "t1", &event_body("acme"))).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(first, second);
            assert_eq!(client.create_calls(), 1);
            assert_eq!(client.names().len(), 1);
        }

        #[tokio::test]
        async fn test_subscribe_empty_subdomain_never_reaches_api() {
            let mut client = MockRouteClientTrait::new();
            client.expect_get_api_rule().times(0);
            client.expect_create_api_rule().times(0);
            let app = router(state_with(Arc::new(client), create_test_config()));

            let (status, body) =
                send(app, tenant_request("PUT", "t1", &event_body(""))).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body.contains("subscribedSubdomain"));
        }

        #[tokio::test]
        async fn test_subscribe_missing_subdomain_field() {
            let mut client = MockRouteClientTrait::new();
            client.expect_get_api_rule().times(0);
            let app = router(state_with(Arc::new(client), create_test_config()));

            let (status, _) = send(
                app,
                tenant_request("PUT", "t1", r#"{"subscribedTenantId":"t1"}"#),
            )
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn test_subscribe_invalid_subdomain() {
            let mut client = MockRouteClientTrait::new();
            client.expect_get_api_rule().times(0);
            let app = router(state_with(Arc::new(client), create_test_config()));

            let (status, body) =
                send(app, tenant_request("PUT", "t1", &event_body("Acme_Corp"))).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body.contains("Acme_Corp"));
        }

        #[tokio::test]
        async fn test_subscribe_malformed_json() {
            let mut client = MockRouteClientTrait::new();
            client.expect_get_api_rule().times(0);
            let app = router(state_with(Arc::new(client), create_test_config()));

            let (status, body) = send(app, tenant_request("PUT", "t1", "{not json")).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body.contains("malformed request body"));
        }

        #[tokio::test]
        async fn test_subscribe_create_failure_returns_500_without_url() {
            let mut client = MockRouteClientTrait::new();
            client
                .expect_get_api_rule()
                .times(1)
                .returning(|name| Err(ClientError::NotFound(name.to_string())));
            client
                .expect_create_api_rule()
                .times(1)
                .returning(|_| Err(server_error()));
            let app = router(state_with(Arc::new(client), create_test_config()));

            let (status, body) =
                send(app, tenant_request("PUT", "t1", &event_body("acme"))).await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(body.contains("acme-approuter-resource"));
            assert!(!body.contains(ACME_URL));
        }

        #[tokio::test]
        async fn test_subscribe_conflict_returns_url() {
            let mut client = MockRouteClientTrait::new();
            client
                .expect_get_api_rule()
                .times(1)
                .returning(|name| Err(ClientError::NotFound(name.to_string())));
            client
                .expect_create_api_rule()
                .times(1)
                .returning(|_| Err(ClientError::Conflict("acme-approuter-resource".to_string())));
            let app = router(state_with(Arc::new(client), create_test_config()));

            let (status, body) =
                send(app, tenant_request("PUT", "t1", &event_body("acme"))).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, ACME_URL);
        }

        #[tokio::test]
        async fn test_concurrent_duplicate_subscriptions_both_succeed() {
            let client = Arc::new(InMemoryRouteClient::with_lookup_barrier(2));
            let state = state_with(client.clone(), create_test_config());

            let (first, second) = tokio::join!(
                send(
                    router(state.clone()),
                    tenant_request("PUT", "t1", &event_body("acme"))
                ),
                send(
                    router(state.clone()),
                    tenant_request("PUT", "t1", &event_body("acme"))
                ),
            );

            assert_eq!(first, (StatusCode::OK, ACME_URL.to_string()));
            assert_eq!(second, (StatusCode::OK, ACME_URL.to_string()));
            assert_eq!(client.names(), vec!["acme-approuter-resource"]);
        }

        #[tokio::test]
        async fn test_subscribe_uses_configured_suffix_and_domain() {
            let client = Arc::new(InMemoryRouteClient::new());
            let mut config = create_test_config();
            config.host_suffix = "web".to_string();
            config.cluster_domain = "apps.example.com".to_string();
            let app = router(state_with(client.clone(), config));

            let (status, body) =
                send(app, tenant_request("PUT", "t1", &event_body("acme"))).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "https://acme-web.apps.example.com");
            assert_eq!(client.names(), vec!["acme-web-resource"]);
        }
    }

    mod unsubscribe_tests {
        use super::*;

        #[tokio::test]
        async fn test_unsubscribe_deletes_rule() {
            let client = Arc::new(InMemoryRouteClient::new());
            let state = state_with(client.clone(), create_test_config());

            send(
                router(state.clone()),
                tenant_request("PUT", "t1", &event_body("acme")),
            )
            .await;
            let (status, body) = send(
                router(state),
                tenant_request("DELETE", "t1", &event_body("acme")),
            )
            .await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "Tenant acme unsubscribed");
            assert!(client.names().is_empty());
        }

        #[tokio::test]
        async fn test_unsubscribe_twice_always_ok() {
            let client = Arc::new(InMemoryRouteClient::new());
            let state = state_with(client.clone(), create_test_config());

            for _ in 0..2 {
                let (status, _) = send(
                    router(state.clone()),
                    tenant_request("DELETE", "t1", &event_body("acme")),
                )
                .await;
                assert_eq!(status, StatusCode::OK);
            }
            assert_eq!(client.delete_calls(), 2);
        }

        #[tokio::test]
        async fn test_unsubscribe_delete_failure_still_ok() {
            let mut client = MockRouteClientTrait::new();
            client.expect_get_api_rule().times(0);
            client
                .expect_delete_api_rule()
                .with(mockall::predicate::eq("acme-approuter-resource"))
                .times(1)
                .returning(|_| Err(server_error()));
            let app = router(state_with(Arc::new(client), create_test_config()));

            let (status, body) =
                send(app, tenant_request("DELETE", "t1", &event_body("acme"))).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "Tenant acme unsubscribed");
        }

        #[tokio::test]
        async fn test_unsubscribe_empty_subdomain_rejected() {
            let mut client = MockRouteClientTrait::new();
            client.expect_delete_api_rule().times(0);
            let app = router(state_with(Arc::new(client), create_test_config()));

            let (status, _) = send(app, tenant_request("DELETE", "t1", &event_body(""))).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn test_remove_then_subscribe_recreates_once() {
            let client = Arc::new(InMemoryRouteClient::new());
            let state = state_with(client.clone(), create_test_config());

            for method in ["PUT", "DELETE", "PUT"] {
                let (status, _) = send(
                    router(state.clone()),
                    tenant_request(method, "t1", &event_body("acme")),
                )
                .await;
                assert_eq!(status, StatusCode::OK);
            }

            assert_eq!(client.names(), vec!["acme-approuter-resource"]);
            assert_eq!(client.create_calls(), 2);
        }

        #[tokio::test]
        async fn test_unsubscribe_leaves_other_tenants() {
            let client = Arc::new(InMemoryRouteClient::new());
            let state = state_with(client.clone(), create_test_config());

            for subdomain in ["a", "b"] {
                send(
                    router(state.clone()),
                    tenant_request("PUT", subdomain, &event_body(subdomain)),
                )
                .await;
            }
            send(
                router(state),
                tenant_request("DELETE", "a", &event_body("a")),
            )
            .await;

            assert_eq!(client.names(), vec!["b-approuter-resource"]);
        }
    }

    mod dependencies_tests {
        use super::*;

        #[tokio::test]
        async fn test_dependencies_empty_by_default() {
            let app = router(state_with(
                Arc::new(MockRouteClientTrait::new()),
                create_test_config(),
            ));

            let request = Request::builder()
                .method("GET")
                .uri(DEPENDENCIES_PATH)
                .body(Body::empty())
                .unwrap();
            let (status, body) = send(app, request).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "[]");
        }

        #[tokio::test]
        async fn test_dependencies_lists_configured_apps() {
            let mut config = create_test_config();
            config.dependencies = vec![
                Dependency::XsApp {
                    xsappname: "destination-xsapp".to_string(),
                },
                Dependency::App {
                    app_name: "audit".to_string(),
                    app_id: "audit!b12".to_string(),
                },
            ];
            let app = router(state_with(Arc::new(MockRouteClientTrait::new()), config));

            let request = Request::builder()
                .method("GET")
                .uri(DEPENDENCIES_PATH)
                .body(Body::empty())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers().get(header::CONTENT_TYPE).unwrap(),
                "application/json"
            );

            let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
                .await
                .unwrap();
            let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(
                value,
                serde_json::json!([
                    {"xsappname": "destination-xsapp"},
                    {"appName": "audit", "appId": "audit!b12"}
                ])
            );
        }
    }
}
