use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::menu_item::{self, Entity as MenuItemEntity, Model as MenuItemModel},
    entities::order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel},
    entities::order_item::{self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::order_status::VALID_STATUSES,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Payment methods accepted at the counter.
pub const VALID_PAYMENT_METHODS: [&str; 3] = ["cash", "card", "mobile"];

/// Request/Response types for the order service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must include at least one menu item"))]
    pub items: Vec<OrderItemRequest>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemRequest {
    pub menu_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub menu_item_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub status: String,
    pub payment_method: String,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderResponse {
    /// Assembles the API shape from an order row and its line rows.
    pub fn from_parts(order: OrderModel, items: Vec<OrderItemModel>) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            status: order.status,
            payment_method: order.payment_method,
            total_amount: order.total_amount,
            notes: order.notes,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    menu_item_id: item.menu_item_id,
                    name: item.name,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                })
                .collect(),
            version: order.version,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service for creating and reading customer orders
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a new order for the authenticated customer.
    ///
    /// Every line is checked against the live menu, and stock is taken with a
    /// conditional decrement so two orders racing for the last portion cannot
    /// both succeed. The menu item's name and price are copied onto each line
    /// at this point and never change afterwards.
    #[instrument(skip(self, customer, request), fields(customer_id = %customer.id))]
    pub async fn create_order(
        &self,
        customer: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        let payment_method = request.payment_method.unwrap_or_else(|| "cash".to_string());
        if !VALID_PAYMENT_METHODS.contains(&payment_method.as_str()) {
            return Err(ServiceError::ValidationError(
                "Invalid payment method.".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        // Start a database transaction
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        // Load every referenced menu item up front
        let menu_item_ids: Vec<Uuid> = request.items.iter().map(|line| line.menu_item_id).collect();
        let menu_items: HashMap<Uuid, MenuItemModel> = MenuItemEntity::find()
            .filter(menu_item::Column::Id.is_in(menu_item_ids))
            .all(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch menu items for order");
                ServiceError::DatabaseError(e)
            })?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let mut total_amount = Decimal::ZERO;
        let mut order_items = Vec::with_capacity(request.items.len());

        for line in &request.items {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "Each order item must include a valid menuItemId and quantity.".to_string(),
                ));
            }

            let item = menu_items.get(&line.menu_item_id).ok_or_else(|| {
                warn!(menu_item_id = %line.menu_item_id, "Order references unknown menu item");
                ServiceError::ValidationError(
                    "One or more menu items could not be found.".to_string(),
                )
            })?;

            if !item.is_available {
                return Err(ServiceError::ItemUnavailable(format!(
                    "{} is currently unavailable.",
                    item.name
                )));
            }

            if item.stock < line.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "{} does not have enough stock.",
                    item.name
                )));
            }

            // The check above reads a snapshot; a concurrent order can still
            // win the last portion. The guarded decrement matches zero rows
            // in that case and the whole order rolls back.
            let decremented = MenuItemEntity::update_many()
                .col_expr(
                    menu_item::Column::Stock,
                    Expr::col(menu_item::Column::Stock).sub(line.quantity),
                )
                .col_expr(menu_item::Column::UpdatedAt, Expr::value(now))
                .filter(menu_item::Column::Id.eq(line.menu_item_id))
                .filter(menu_item::Column::Stock.gte(line.quantity))
                .exec(&txn)
                .await
                .map_err(|e| {
                    error!(error = %e, menu_item_id = %line.menu_item_id, "Failed to decrement stock");
                    ServiceError::DatabaseError(e)
                })?;

            if decremented.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "{} does not have enough stock.",
                    item.name
                )));
            }

            total_amount += item.price * Decimal::from(line.quantity);

            order_items.push(OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                menu_item_id: Set(item.id),
                name: Set(item.name.clone()),
                unit_price: Set(item.price),
                quantity: Set(line.quantity),
                created_at: Set(now),
            });
        }

        let customer_name = customer
            .name
            .clone()
            .unwrap_or_else(|| "Guest".to_string());

        // Create the order active model
        let order_active_model = OrderActiveModel {
            id: Set(order_id),
            customer_id: Set(customer.id),
            customer_name: Set(customer_name),
            customer_email: Set(customer.email.clone()),
            status: Set("pending".to_string()),
            payment_method: Set(payment_method),
            total_amount: Set(total_amount),
            notes: Set(request.notes),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let order_model = order_active_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        OrderItemEntity::insert_many(order_items)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to create order items");
                ServiceError::DatabaseError(e)
            })?;

        // Commit the transaction
        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            customer_id = %customer.id,
            total_amount = %order_model.total_amount,
            "Order created successfully"
        );

        // Send event if event sender is available
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::OrderCreated {
                    order_id,
                    customer_id: customer.id,
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send order created event");
            }
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch created order items");
                ServiceError::DatabaseError(e)
            })?;

        Ok(OrderResponse::from_parts(order_model, items))
    }

    /// Retrieves an order by ID. Students can only read their own orders;
    /// back-office users can read any.
    #[instrument(skip(self, user), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        user: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order from database");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                info!(order_id = %order_id, "Order not found");
                ServiceError::NotFound(format!("Order {} not found", order_id))
            })?;

        if !user.is_back_office() && order.customer_id != user.id {
            warn!(order_id = %order_id, user_id = %user.id, "Blocked read of another customer's order");
            return Err(ServiceError::Forbidden(
                "You are not allowed to view this order.".to_string(),
            ));
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order items");
                ServiceError::DatabaseError(e)
            })?;

        Ok(OrderResponse::from_parts(order, items))
    }

    /// Lists orders with pagination, newest first. Results are scoped to the
    /// caller unless they are back-office; an optional status filter narrows
    /// them further.
    #[instrument(skip(self, user))]
    pub async fn list_orders(
        &self,
        user: &AuthUser,
        status: Option<String>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);

        if !user.is_back_office() {
            query = query.filter(order::Column::CustomerId.eq(user.id));
        }

        if let Some(status) = status {
            if !VALID_STATUSES.contains(&status.as_str()) {
                return Err(ServiceError::ValidationError(
                    "Invalid status value.".to_string(),
                ));
            }
            query = query.filter(order::Column::Status.eq(status));
        }

        // Get paginated orders
        let paginator = query.paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;

        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page = page, per_page = per_page, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        // One items query for the whole page instead of one per order
        let order_ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        if !order_ids.is_empty() {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.is_in(order_ids))
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to fetch order items for page");
                    ServiceError::DatabaseError(e)
                })?;

            for item in items {
                items_by_order.entry(item.order_id).or_default().push(item);
            }
        }

        let order_responses: Vec<OrderResponse> = orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderResponse::from_parts(order, items)
            })
            .collect();

        Ok(OrderListResponse {
            orders: order_responses,
            total,
            page,
            per_page,
        })
    }
}
