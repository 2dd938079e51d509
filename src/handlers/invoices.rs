use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::invoicing::{CreateInvoiceRequest, InvoiceResponse},
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

/// Issue an invoice manually
#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    summary = "Issue invoice",
    description = "Issue an invoice for an order by hand, with optional tax and discount. Fails if the order already has one.",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Invoice issued successfully", body = ApiResponse<InvoiceResponse>,
            headers(
                ("X-Request-Id" = String, description = "Unique request id"),
            )
        ),
        (status = 400, description = "Invalid invoice data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice already exists", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceResponse>>), ServiceError> {
    let invoice = state.services.invoicing.create_invoice(request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(invoice))))
}

/// List invoices with pagination
#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    summary = "List invoices",
    description = "Get a paginated list of invoices, newest first. Students see their own invoices; staff see all of them.",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20, max: 100)"),
    ),
    responses(
        (status = 200, description = "Invoices retrieved successfully", body = ApiResponse<PaginatedResponse<InvoiceResponse>>,
            headers(
                ("X-Request-Id" = String, description = "Unique request id"),
            )
        ),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<InvoiceResponse>>>, ServiceError> {
    let result = state
        .services
        .invoicing
        .list_invoices(&user, query.page, query.limit)
        .await?;

    let total_pages = (result.total + result.per_page - 1) / result.per_page;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: result.invoices,
        total: result.total,
        page: result.page,
        limit: result.per_page,
        total_pages,
    })))
}

/// Get a single invoice
#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    summary = "Get invoice",
    description = "Fetch one invoice with its line items. Students can only fetch their own invoices.",
    params(
        ("id" = Uuid, Path, description = "Invoice ID"),
    ),
    responses(
        (status = 200, description = "Invoice retrieved successfully", body = ApiResponse<InvoiceResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, ServiceError> {
    let invoice = state.services.invoicing.get_invoice(id, &user).await?;

    Ok(Json(ApiResponse::success(invoice)))
}

/// Get the invoice for an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice",
    summary = "Get order invoice",
    description = "Fetch the invoice for a delivered order. If the delivery-time issuance was missed, the invoice is issued here.",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
    ),
    responses(
        (status = 200, description = "Invoice retrieved successfully", body = ApiResponse<InvoiceResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Order not delivered yet", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, ServiceError> {
    let invoice = state.services.invoicing.get_for_order(id, &user).await?;

    Ok(Json(ApiResponse::success(invoice)))
}
