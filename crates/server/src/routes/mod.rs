use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{config::ServerConfig, error::reveal_internal_errors, state::AppState};

mod clients;
mod health;
mod history;

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);

    let roster = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Client roster
        .route("/clients", get(clients::list_clients).post(clients::create_client))
        .route("/clients/:id", axum::routing::put(clients::update_client).delete(clients::delete_client))
        .route("/clients/:id/details", get(clients::get_client_details))
        // Pull history
        .route("/clients/:id/history", get(history::list_history).post(history::add_history));

    let mut app = Router::new().merge(roster.clone()).nest("/api", roster);

    if state.config.server.expose_internal_errors {
        tracing::warn!("Internal error details will be sent to clients");
        app = app.layer(middleware::map_response(reveal_internal_errors));
    }

    app
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = if config.allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        db::Database,
        store::{ClientChanges, ClientStore, NewClient, PullHistoryStore, RosterStore, StoreError, StoreResult},
    };
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use shared::{Client, PullEntryRequest, PullHistoryEntry};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        app_with(Config::default()).await
    }

    async fn app_with(config: Config) -> Router {
        let db = Database::in_memory().await.unwrap();
        create_router(AppState::new(Arc::new(db), config))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn acme() -> Value {
        json!({
            "client_name": "Acme",
            "domain_url": "https://acme.example",
            "client_id": "ACME-01",
            "password": "s3cret",
            "latest_pull_date": "",
            "latest_pull_by": "",
            "gsos_version": "4.2"
        })
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let app = test_app().await;

        let created = send(&app, "POST", "/clients", Some(acme())).await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = json_body(created).await;
        assert_eq!(created["message"], "Client added successfully");
        assert!(created["id"].as_i64().unwrap() > 0);

        let listed = send(&app, "GET", "/clients", None).await;
        assert_eq!(listed.status(), StatusCode::OK);
        let listed = json_body(listed).await;
        let rows = listed.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["client_name"], "Acme");
        assert_eq!(rows[0]["original_password"], "s3cret");
        assert!(rows[0]["latest_pull_date"].is_null());
        assert!(rows[0]["latest_pull_by"].is_null());
        assert!(rows[0].get("password").is_none());
    }

    #[tokio::test]
    async fn test_api_prefix_serves_same_routes() {
        let app = test_app().await;
        send(&app, "POST", "/api/clients", Some(acme())).await;

        let listed = json_body(send(&app, "GET", "/clients", None).await).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let health = send(&app, "GET", "/api/health", None).await;
        assert_eq!(health.status(), StatusCode::OK);
        let health = json_body(health).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["backend"], "sqlite");
    }

    #[tokio::test]
    async fn test_create_validation() {
        let app = test_app().await;

        let mut blank = acme();
        blank["client_name"] = json!("   ");
        let response = send(&app, "POST", "/clients", Some(blank)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "client_name is required");

        let mut missing = acme();
        missing.as_object_mut().unwrap().remove("password");
        let response = send(&app, "POST", "/clients", Some(missing)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let mut bad_date = acme();
        bad_date["latest_pull_date"] = json!("yesterday-ish");
        let response = send(&app, "POST", "/clients", Some(bad_date)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let listed = json_body(send(&app, "GET", "/clients", None).await).await;
        assert!(listed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_password_when_blank() {
        let app = test_app().await;
        let id = json_body(send(&app, "POST", "/clients", Some(acme())).await).await["id"]
            .as_i64()
            .unwrap();

        let response = send(
            &app,
            "PUT",
            &format!("/clients/{}", id),
            Some(json!({"client_name": "Acme Corp", "password": ""})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "Client updated successfully");

        let details = json_body(send(&app, "GET", &format!("/clients/{}/details", id), None).await).await;
        assert_eq!(details["client_name"], "Acme Corp");
        assert_eq!(details["original_password"], "s3cret");
        assert_eq!(details["gsos_version"], "4.2");
    }

    #[tokio::test]
    async fn test_missing_ids_are_404() {
        let app = test_app().await;

        for (method, uri, body) in [
            ("PUT", "/clients/999", Some(json!({"client_name": "x"}))),
            ("DELETE", "/clients/999", None),
            ("GET", "/clients/999/details", None),
            (
                "POST",
                "/clients/999/history",
                Some(json!({"pull_date": "2024-06-01", "pull_by": "dana"})),
            ),
        ] {
            let response = send(&app, method, uri, body).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
            assert_eq!(json_body(response).await["error"], "Client not found");
        }

        let history = send(&app, "GET", "/clients/999/history", None).await;
        assert_eq!(history.status(), StatusCode::OK);
        assert_eq!(json_body(history).await, json!([]));
    }

    #[tokio::test]
    async fn test_non_numeric_ids_are_json_400() {
        let app = test_app().await;

        for (method, uri, body) in [
            ("PUT", "/clients/abc", Some(json!({"client_name": "x"}))),
            ("DELETE", "/api/clients/abc", None),
            ("GET", "/clients/abc/details", None),
            ("GET", "/clients/abc/history", None),
            (
                "POST",
                "/clients/abc/history",
                Some(json!({"pull_date": "2024-06-01", "pull_by": "dana"})),
            ),
        ] {
            let response = send(&app, method, uri, body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", method, uri);
            let body = json_body(response).await;
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()), "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_history_flow_updates_summary_and_cascades() {
        let app = test_app().await;
        let id = json_body(send(&app, "POST", "/clients", Some(acme())).await).await["id"]
            .as_i64()
            .unwrap();
        let history_uri = format!("/clients/{}/history", id);

        let first = send(
            &app,
            "POST",
            &history_uri,
            Some(json!({"pull_date": "2024-06-01T09:30:00Z", "pull_by": "dana", "version": "4.3"})),
        )
        .await;
        assert_eq!(first.status(), StatusCode::CREATED);
        assert_eq!(json_body(first).await["message"], "Pull history added successfully");

        send(
            &app,
            "POST",
            &history_uri,
            Some(json!({"pull_date": "2024-07-01", "pull_by": "lee", "version": ""})),
        )
        .await;

        let entries = json_body(send(&app, "GET", &history_uri, None).await).await;
        let entries = entries.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["pull_by"], "lee");
        assert!(entries[0]["version"].is_null());
        assert_eq!(entries[1]["pull_by"], "dana");

        let details = json_body(send(&app, "GET", &format!("/clients/{}/details", id), None).await).await;
        assert_eq!(details["latest_pull_by"], "lee");
        assert!(details["gsos_version"].is_null());

        let deleted = send(&app, "DELETE", &format!("/clients/{}", id), None).await;
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(json_body(deleted).await["message"], "Client deleted successfully");

        let entries = json_body(send(&app, "GET", &history_uri, None).await).await;
        assert!(entries.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preflight_is_answered() {
        let app = test_app().await;
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/clients")
            .header("origin", "https://dash.example")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_configured_origins_are_enforced() {
        let mut config = Config::default();
        config.server.allowed_origins = vec!["https://dash.example".to_string()];
        let app = app_with(config).await;

        let allowed = Request::builder()
            .uri("/clients")
            .header("origin", "https://dash.example")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(allowed).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://dash.example"
        );

        let other = Request::builder()
            .uri("/clients")
            .header("origin", "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(other).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    struct BrokenStore;

    fn broken() -> StoreError {
        StoreError::Upstream {
            status: 503,
            message: "upstream unavailable".to_string(),
        }
    }

    #[async_trait]
    impl ClientStore for BrokenStore {
        async fn list_all(&self) -> StoreResult<Vec<Client>> {
            Err(broken())
        }
        async fn get_by_id(&self, _id: i64) -> StoreResult<Option<Client>> {
            Err(broken())
        }
        async fn insert(&self, _client: NewClient) -> StoreResult<i64> {
            Err(broken())
        }
        async fn update(&self, _id: i64, _changes: ClientChanges) -> StoreResult<()> {
            Err(broken())
        }
        async fn delete(&self, _id: i64) -> StoreResult<()> {
            Err(broken())
        }
    }

    #[async_trait]
    impl PullHistoryStore for BrokenStore {
        async fn list_for_client(&self, _client_id: i64) -> StoreResult<Vec<PullHistoryEntry>> {
            Err(broken())
        }
        async fn append(&self, _client_id: i64, _entry: PullEntryRequest) -> StoreResult<PullHistoryEntry> {
            Err(broken())
        }
    }

    impl RosterStore for BrokenStore {
        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_redacted_by_default() {
        let app = create_router(AppState::new(Arc::new(BrokenStore), Config::default()));
        let response = send(&app, "GET", "/clients", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_store_failure_revealed_when_enabled() {
        let mut config = Config::default();
        config.server.expose_internal_errors = true;
        let app = create_router(AppState::new(Arc::new(BrokenStore), config));

        let response = send(&app, "GET", "/api/clients", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error = json_body(response).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("upstream unavailable"));

        let health = send(&app, "GET", "/health", None).await;
        assert_eq!(health.status(), StatusCode::OK);
    }
}
