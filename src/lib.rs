//! Campus Cafeteria API Library
//!
//! This crate provides the ordering and invoicing backend for the campus
//! cafeteria: menu catalog, order lifecycle, and invoice generation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod openapi;
pub mod request_id;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::db::DbPool;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<events::EventSender>>,
    pub services: handlers::AppServices,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub status: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::request_id::current_request_id()
                .map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    /// Success without a payload, just a human-readable confirmation
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response = crate::request_id::scope_request_id(
            crate::request_id::RequestId::new("meta-123"),
            async { ApiResponse::success("ok") },
        )
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn message_response_includes_request_metadata() {
        let response = crate::request_id::scope_request_id(
            crate::request_id::RequestId::new("meta-msg"),
            async { ApiResponse::<()>::message("done") },
        )
        .await;

        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("done"));
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-msg"));
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response = crate::request_id::scope_request_id(
            crate::request_id::RequestId::new("meta-err"),
            async { ApiResponse::<()>::error("oops".into()) },
        )
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Builds the /api/v1 router with per-group permission gating
pub fn api_v1_routes() -> Router<AppState> {
    // Public menu browsing, no token required
    let menu_public = Router::new()
        .route("/menu", get(handlers::menu::list_menu_items))
        .route("/menu/:id", get(handlers::menu::get_menu_item));

    let menu_write = Router::new()
        .route(
            "/menu",
            axum::routing::post(handlers::menu::create_menu_item),
        )
        .route(
            "/menu/:id",
            axum::routing::patch(handlers::menu::update_menu_item),
        )
        .with_permission(perm::MENU_WRITE);

    let menu_delete = Router::new()
        .route(
            "/menu/:id",
            axum::routing::delete(handlers::menu::delete_menu_item),
        )
        .with_permission(perm::MENU_DELETE);

    // Orders routes with permission gating
    let orders_create = Router::new()
        .route(
            "/orders",
            axum::routing::post(handlers::orders::create_order),
        )
        .with_permission(perm::ORDERS_CREATE);

    let orders_read = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .with_permission(perm::ORDERS_READ);

    let orders_manage = Router::new()
        .route(
            "/orders/:id/status",
            axum::routing::post(handlers::orders::update_order_status),
        )
        .with_permission(perm::ORDERS_MANAGE);

    // Cancellation is open to any authenticated caller; the service decides
    // whether this caller may cancel this order
    let orders_cancel = Router::new()
        .route(
            "/orders/:id/cancel",
            axum::routing::post(handlers::orders::cancel_order),
        )
        .with_auth();

    // Invoices routes with permission gating
    let invoices_issue = Router::new()
        .route(
            "/invoices",
            axum::routing::post(handlers::invoices::create_invoice),
        )
        .with_permission(perm::INVOICES_ISSUE);

    let invoices_read = Router::new()
        .route("/invoices", get(handlers::invoices::list_invoices))
        .route("/invoices/:id", get(handlers::invoices::get_invoice))
        .route(
            "/orders/:id/invoice",
            get(handlers::invoices::get_order_invoice),
        )
        .with_permission(perm::INVOICES_READ);

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Menu API (public reads, gated writes)
        .merge(menu_public)
        .merge(menu_write)
        .merge(menu_delete)
        // Orders API (auth + permissions)
        .merge(orders_create)
        .merge(orders_read)
        .merge(orders_manage)
        .merge(orders_cancel)
        // Invoices API (auth + permissions)
        .merge(invoices_issue)
        .merge(invoices_read)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "service": "cafeteria-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    // Check database connectivity
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

/// Request logging middleware. Every request runs inside a request-id scope
/// so log lines and error payloads can be correlated, and the id is echoed
/// back in the X-Request-Id response header.
pub async fn request_logging_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();
    let request_id = request_id::RequestId::default();

    request_id::scope_request_id(request_id.clone(), async move {
        tracing::info!(request_id = %request_id, method = %method, uri = %uri, "Incoming request");

        let mut response = next.run(request).await;

        let duration = start.elapsed();
        let status = response.status();

        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            elapsed_ms = duration.as_millis() as u64,
            "Request completed"
        );

        if let Ok(value) = axum::http::HeaderValue::from_str(request_id.as_str()) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    })
    .await
}

pub mod prelude {
    pub use crate::db::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::openapi::*;
    pub use crate::request_id::*;
    pub use crate::services::*;
}
