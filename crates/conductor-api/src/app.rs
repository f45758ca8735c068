use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use conductor_agent::AgentProtocol;
use conductor_core::Conductor;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

/// Builds the full router: the operator-facing `/nodes` and `/drivers`
/// surface behind bearer-token auth, and the agent-facing `/lookup` +
/// `/heartbeat` endpoints outside it (spec.md §4.6 — `lookup` is
/// unauthenticated by design, `heartbeat` is authenticated by node UUID via
/// the reservation `AgentProtocol::heartbeat` itself takes).
pub fn build_app(conductor: Arc<Conductor>, agent: Arc<AgentProtocol>, auth_token: Arc<String>) -> Router {
    let state = AppState { conductor, agent, auth_token };

    let operator = Router::new()
        .route("/nodes", get(handlers::list_nodes).post(handlers::create_node))
        .route(
            "/nodes/:uuid",
            get(handlers::get_node)
                .patch(handlers::patch_node)
                .delete(handlers::delete_node),
        )
        .route("/nodes/:uuid/states", get(handlers::get_node_states))
        .route("/nodes/:uuid/states/power", post(handlers::put_node_power_state))
        .route("/nodes/:uuid/states/provision", post(handlers::put_node_provision_state))
        .route(
            "/nodes/:uuid/states/console",
            get(handlers::get_node_console).post(handlers::put_node_console_state),
        )
        .route("/nodes/:uuid/vendor_passthru/:method", post(handlers::post_node_vendor_passthru))
        .route("/drivers/:driver/vendor_passthru/:method", post(handlers::post_driver_vendor_passthru))
        .route("/nodes/:uuid/validate", get(handlers::get_node_validate))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token));

    let agent_routes = Router::new()
        .route("/lookup", post(handlers::post_lookup))
        .route("/heartbeat/:uuid", post(handlers::post_heartbeat));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(operator)
        .merge(agent_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use conductor_agent::NoopNetworkProvisioner;
    use conductor_config::{ConductorConfig, RawConfig};
    use conductor_driver::{DriverCatalog, FakeDriver};
    use conductor_store::InMemoryStore;
    use std::collections::HashMap;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token";

    fn test_app() -> Router {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(Arc::new(FakeDriver::new()));
        let catalog = Arc::new(catalog);
        let config = Arc::new(ConductorConfig::from_raw(&RawConfig::from_map(HashMap::new())).unwrap());

        let conductor = Arc::new(Conductor::new(
            store.clone(),
            catalog.clone(),
            config.clone(),
            Arc::new(NoopNetworkProvisioner),
            "conductor-a",
            vec![String::new()],
        ));
        let agent = Arc::new(AgentProtocol::new(
            store,
            catalog,
            Arc::new(NoopNetworkProvisioner),
            config,
            "conductor-a",
        ));
        build_app(conductor, agent, Arc::new(TEST_TOKEN.to_string()))
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_TOKEN))
    }

    #[tokio::test]
    async fn health_is_unauthenticated() {
        let app = test_app();
        let resp = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unauthenticated_node_list_returns_401() {
        let app = test_app();
        let resp = app.oneshot(Request::builder().uri("/nodes").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authed_node_list_returns_200_with_empty_store() {
        let app = test_app();
        let resp = app
            .oneshot(authed(Request::builder().uri("/nodes")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_then_get_node_round_trips() {
        let app = test_app();
        let body = serde_json::json!({ "driver": "fake", "name": "rack-1" });
        let resp = app
            .clone()
            .oneshot(
                authed(
                    Request::builder()
                        .method("POST")
                        .uri("/nodes")
                        .header("content-type", "application/json"),
                )
                .body(Body::from(body.to_string()))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn create_node_with_unknown_driver_is_400() {
        let app = test_app();
        let body = serde_json::json!({ "driver": "does-not-exist" });
        let resp = app
            .oneshot(
                authed(
                    Request::builder()
                        .method("POST")
                        .uri("/nodes")
                        .header("content-type", "application/json"),
                )
                .body(Body::from(body.to_string()))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_missing_node_is_404() {
        let app = test_app();
        let resp = app
            .oneshot(
                authed(Request::builder().uri(format!("/nodes/{}", uuid::Uuid::new_v4())))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lookup_is_unauthenticated_but_not_found_without_matching_port() {
        let app = test_app();
        let body = serde_json::json!({ "interfaces": [{ "mac_address": "aa:bb:cc:dd:ee:ff" }] });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/lookup")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
