use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::orders::{CreateOrderRequest, OrderResponse},
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

/// Body for the status update endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

/// Place an order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place an order",
    description = "Place an order for one or more menu items. Stock is reserved as part of the request.",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed successfully", body = ApiResponse<OrderResponse>,
            headers(
                ("X-Request-Id" = String, description = "Unique request id"),
            )
        ),
        (status = 400, description = "Invalid order data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Menu item unavailable", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state.services.orders.create_order(&user, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// List orders with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Get a paginated list of orders, newest first. Students see their own orders; staff see all of them.",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20, max: 100)"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
    ),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<PaginatedResponse<OrderResponse>>,
            headers(
                ("X-Request-Id" = String, description = "Unique request id"),
            )
        ),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let result = state
        .services
        .orders
        .list_orders(&user, query.status, query.page, query.limit)
        .await?;

    let total_pages = (result.total + result.per_page - 1) / result.per_page;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: result.orders,
        total: result.total,
        page: result.page,
        limit: result.per_page,
        total_pages,
    })))
}

/// Get a single order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    description = "Fetch one order with its line items. Students can only fetch their own orders.",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
    ),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(id, &user).await?;

    Ok(Json(ApiResponse::success(order)))
}

/// Update order status
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    description = "Move an order along the kitchen flow. Reaching delivered issues the invoice.",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated successfully", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid status transition", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .order_status
        .update_status(id, request.status)
        .await?;

    Ok(Json(ApiResponse::success(order)))
}

/// Cancel an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Cancel an order. Students can cancel their own pending orders; staff can cancel any order that has not been delivered.",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
    ),
    responses(
        (status = 200, description = "Order cancelled successfully", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.order_status.cancel_order(id, &user).await?;

    Ok(Json(ApiResponse::success(order)))
}
