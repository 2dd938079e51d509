use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campus Cafeteria API",
        version = "1.0.0",
        description = r#"
# Campus Cafeteria Ordering API

The ordering backend for the campus cafeteria: menu browsing, order placement and
tracking, and invoice generation.

## Features

- **Menu**: Browse the menu without an account; staff maintain items, prices, and stock
- **Orders**: Place orders against live stock and follow them through the kitchen flow
- **Invoices**: Numbered invoices issued automatically when an order is delivered
- **Access Control**: Students see their own records; cafeteria staff see everything

## Authentication

Menu browsing is public. Every other endpoint requires a JWT in the Authorization header:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

The API uses consistent error response formats with appropriate HTTP status codes:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: Paneer Wrap does not have enough stock.",
  "request_id": "7f1f9a52-3a93-4dd6-a2cf-2f1d9b1f3b6e",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints support pagination with the following query parameters:
- `page`: Page number (default: 1)
- `limit`: Items per page (default: 20, max: 100)
        "#,
        contact(
            name = "Campus Dining IT",
            email = "dining-systems@campus.edu"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "https://dining.campus.edu/api/v1", description = "Production server"),
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    tags(
        (name = "Menu", description = "Menu browsing and catalog maintenance"),
        (name = "Orders", description = "Order placement and lifecycle endpoints"),
        (name = "Invoices", description = "Invoice issuance and retrieval endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Menu
        crate::handlers::menu::list_menu_items,
        crate::handlers::menu::get_menu_item,
        crate::handlers::menu::create_menu_item,
        crate::handlers::menu::update_menu_item,
        crate::handlers::menu::delete_menu_item,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,

        // Invoices
        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::get_order_invoice,

        // Health and status intentionally omitted from OpenAPI paths for now
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::ListQuery,

            // Menu types
            crate::services::catalog::MenuItemResponse,
            crate::services::catalog::CreateMenuItemRequest,
            crate::services::catalog::UpdateMenuItemRequest,

            // Order types
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderItemRequest,
            crate::handlers::orders::UpdateOrderStatusRequest,

            // Invoice types
            crate::services::invoicing::InvoiceResponse,
            crate::services::invoicing::InvoiceItemResponse,
            crate::services::invoicing::CreateInvoiceRequest,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
