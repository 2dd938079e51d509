use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request},
    middleware, Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use cafeteria_api::{
    auth::{roles, AuthConfig, AuthService},
    config::AppConfig,
    db::{self, DbConfig},
    events::{self, EventSender},
    handlers::AppServices,
    services::catalog::{CreateMenuItemRequest, MenuItemResponse},
    AppState,
};

pub const TEST_JWT_SECRET: &str =
    "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// A user minted for a test, with a token the router will accept.
pub struct TestUser {
    #[allow(dead_code)]
    pub id: Uuid,
    pub token: String,
}

/// Test harness backed by a private in-memory SQLite database.
///
/// Each `TestApp` owns its own database: the pool is capped at a single
/// connection so the in-memory database stays alive for the lifetime of the
/// pool and concurrent transactions serialize instead of fighting over
/// SQLite's single writer.
pub struct TestApp {
    router: Router,
    #[allow(dead_code)]
    pub state: AppState,
    auth_service: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let auth_cfg = AuthConfig::new(
            cfg.jwt_secret.clone(),
            cfg.auth_issuer.clone(),
            cfg.auth_audience.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
        );
        let auth_service = Arc::new(AuthService::new(auth_cfg));

        let services = AppServices::new(db_arc.clone(), Some(event_sender.clone()));

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender: Some(event_sender),
            services,
        };

        let auth_service_for_layer = auth_service.clone();
        let api_router = cafeteria_api::api_v1_routes().layer(middleware::from_fn_with_state(
            auth_service_for_layer,
            |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
             mut req: Request<Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ));

        let router = Router::new()
            .nest("/api/v1", api_router)
            .layer(middleware::from_fn(
                cafeteria_api::request_logging_middleware,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            auth_service,
            _event_task: event_task,
        }
    }

    /// Mint a token for an arbitrary role.
    pub fn user_with_role(&self, name: &str, role: &str) -> TestUser {
        let id = Uuid::new_v4();
        let email = format!("{}@campus.edu", name.to_lowercase().replace(' ', "."));
        let token = self
            .auth_service
            .issue_token(id, name, Some(&email), role)
            .expect("issue token for test user");
        TestUser { id, token }
    }

    #[allow(dead_code)]
    pub fn student(&self, name: &str) -> TestUser {
        self.user_with_role(name, roles::STUDENT)
    }

    pub fn staff(&self, name: &str) -> TestUser {
        self.user_with_role(name, roles::STAFF)
    }

    #[allow(dead_code)]
    pub fn admin(&self, name: &str) -> TestUser {
        self.user_with_role(name, roles::ADMIN)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seed one menu item straight through the catalog service.
    #[allow(dead_code)]
    pub async fn seed_menu_item(&self, name: &str, price: Decimal, stock: i32) -> MenuItemResponse {
        self.state
            .services
            .catalog
            .create_item(CreateMenuItemRequest {
                name: name.to_string(),
                description: None,
                category: "Mains".to_string(),
                price,
                stock: Some(stock),
                is_available: Some(true),
                image_url: None,
            })
            .await
            .expect("seed menu item for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Read a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body is not valid json")
}
