use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::catalog::{CreateMenuItemRequest, MenuItemResponse, UpdateMenuItemRequest},
    ApiResponse, AppState,
};

/// Query parameters accepted by the public menu listing
#[derive(Debug, Deserialize)]
pub struct MenuQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub available_only: bool,
}

/// List menu items
#[utoipa::path(
    get,
    path = "/api/v1/menu",
    summary = "List menu items",
    description = "Browse the menu, newest first. No token required.",
    params(
        ("category" = Option<String>, Query, description = "Only items in this category"),
        ("available_only" = Option<bool>, Query, description = "Only items currently marked available"),
    ),
    responses(
        (status = 200, description = "Menu retrieved successfully", body = ApiResponse<Vec<MenuItemResponse>>,
            headers(
                ("X-Request-Id" = String, description = "Unique request id"),
            )
        ),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_menu_items(
    State(state): State<AppState>,
    Query(query): Query<MenuQuery>,
) -> Result<Json<ApiResponse<Vec<MenuItemResponse>>>, ServiceError> {
    let items = state
        .services
        .catalog
        .list_items(query.category, query.available_only)
        .await?;

    Ok(Json(ApiResponse::success(items)))
}

/// Get a single menu item
#[utoipa::path(
    get,
    path = "/api/v1/menu/{id}",
    summary = "Get menu item",
    description = "Fetch one menu item by id. No token required.",
    params(
        ("id" = Uuid, Path, description = "Menu item ID"),
    ),
    responses(
        (status = 200, description = "Menu item retrieved successfully", body = ApiResponse<MenuItemResponse>),
        (status = 404, description = "Menu item not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MenuItemResponse>>, ServiceError> {
    let item = state.services.catalog.get_item(id).await?;

    Ok(Json(ApiResponse::success(item)))
}

/// Create a menu item
#[utoipa::path(
    post,
    path = "/api/v1/menu",
    summary = "Create menu item",
    description = "Add a new item to the menu",
    request_body = CreateMenuItemRequest,
    responses(
        (status = 201, description = "Menu item created successfully", body = ApiResponse<MenuItemResponse>,
            headers(
                ("X-Request-Id" = String, description = "Unique request id"),
            )
        ),
        (status = 400, description = "Invalid menu item data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_menu_item(
    State(state): State<AppState>,
    Json(request): Json<CreateMenuItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MenuItemResponse>>), ServiceError> {
    let item = state.services.catalog.create_item(request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(item))))
}

/// Update a menu item
#[utoipa::path(
    patch,
    path = "/api/v1/menu/{id}",
    summary = "Update menu item",
    description = "Apply a partial update to a menu item. Only the supplied fields change.",
    params(
        ("id" = Uuid, Path, description = "Menu item ID"),
    ),
    request_body = UpdateMenuItemRequest,
    responses(
        (status = 200, description = "Menu item updated successfully", body = ApiResponse<MenuItemResponse>),
        (status = 400, description = "Invalid menu item data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Menu item not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateMenuItemRequest>,
) -> Result<Json<ApiResponse<MenuItemResponse>>, ServiceError> {
    let item = state.services.catalog.update_item(id, request).await?;

    Ok(Json(ApiResponse::success(item)))
}

/// Delete a menu item
#[utoipa::path(
    delete,
    path = "/api/v1/menu/{id}",
    summary = "Delete menu item",
    description = "Remove an item from the menu. Existing orders keep their copied name and price.",
    params(
        ("id" = Uuid, Path, description = "Menu item ID"),
    ),
    responses(
        (status = 200, description = "Menu item deleted successfully", body = ApiResponse<serde_json::Value>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Menu item not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.catalog.delete_item(id).await?;

    Ok(Json(ApiResponse::message("Menu item deleted.")))
}
