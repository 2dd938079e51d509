use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::order::{ActiveModel as OrderActiveModel, Entity as OrderEntity},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::invoicing::InvoicingService,
    services::orders::OrderResponse,
};

/// Every status an order can hold, in kitchen order.
pub const VALID_STATUSES: &[&str] = &["pending", "preparing", "ready", "delivered", "cancelled"];

/// Service for moving orders through the kitchen status flow
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    invoicing: InvoicingService,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        invoicing: InvoicingService,
    ) -> Self {
        Self {
            db,
            event_sender,
            invoicing,
        }
    }

    /// Updates the status of an order with transition validation.
    ///
    /// When an order first reaches `delivered`, an invoice is issued as a
    /// best-effort follow-up; an invoicing failure is logged but never fails
    /// the transition itself (the invoice can still be produced lazily the
    /// first time somebody asks for it).
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: String,
    ) -> Result<OrderResponse, ServiceError> {
        // Validate the new status
        if !VALID_STATUSES.contains(&new_status.as_str()) {
            error!("Invalid order status: {}", new_status);
            return Err(ServiceError::ValidationError(
                "Invalid status value.".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        // Fetch the current order
        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!("Failed to fetch order {}: {}", order_id, e);
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                error!("Order {} not found", order_id);
                ServiceError::NotFound(format!("Order {} not found", order_id))
            })?;

        let old_status = order.status.clone();

        // Validate status transition
        if !self.is_valid_transition(&old_status, &new_status) {
            error!(
                "Invalid status transition from {} to {}",
                old_status, new_status
            );
            return Err(ServiceError::ValidationError(format!(
                "Cannot transition from status '{}' to '{}'",
                old_status, new_status
            )));
        }

        // Update the order
        let mut active: OrderActiveModel = order.into();
        active.status = Set(new_status.clone());
        active.updated_at = Set(Some(Utc::now()));
        let current_version = active.version.as_ref();
        active.version = Set(current_version + 1);

        let updated = active.update(&txn).await.map_err(|e| {
            error!("Failed to update order {} status: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction for order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id, old_status, new_status
        );

        let customer_id = updated.customer_id;
        let changed = old_status != new_status;

        if changed {
            if let Some(event_sender) = &self.event_sender {
                if let Err(e) = event_sender
                    .send(Event::OrderStatusChanged {
                        order_id,
                        customer_id,
                        old_status: old_status.clone(),
                        new_status: new_status.clone(),
                    })
                    .await
                {
                    warn!("Failed to send status change event for order {}: {}", order_id, e);
                }
            }
        }

        // First arrival at delivered produces the invoice
        if changed && new_status == "delivered" {
            if let Err(e) = self.invoicing.issue_on_delivery(order_id).await {
                error!(
                    "Failed to issue invoice for delivered order {}: {}",
                    order_id, e
                );
            }
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await
            .map_err(|e| {
                error!("Failed to fetch items for order {}: {}", order_id, e);
                ServiceError::DatabaseError(e)
            })?;

        Ok(OrderResponse::from_parts(updated, items))
    }

    /// Cancels an order on behalf of its owner. Students may only cancel
    /// their own orders and only while still pending; back-office users may
    /// cancel any order that has not reached a terminal state.
    #[instrument(skip(self, user), fields(order_id = %order_id, user_id = %user.id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        user: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!("Failed to fetch order {}: {}", order_id, e);
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status.clone();

        if user.is_back_office() {
            if !self.is_valid_transition(&old_status, "cancelled") {
                return Err(ServiceError::ValidationError(format!(
                    "Cannot transition from status '{}' to 'cancelled'",
                    old_status
                )));
            }
        } else {
            if order.customer_id != user.id {
                warn!("User {} tried to cancel order {}", user.id, order_id);
                return Err(ServiceError::Forbidden(
                    "You are not allowed to cancel this order.".to_string(),
                ));
            }
            if old_status != "pending" {
                return Err(ServiceError::ValidationError(
                    "Only pending orders can be cancelled.".to_string(),
                ));
            }
        }

        // Cancelling does not restock; portions set aside stay written off
        let mut active: OrderActiveModel = order.into();
        active.status = Set("cancelled".to_string());
        active.updated_at = Set(Some(Utc::now()));
        let current_version = active.version.as_ref();
        active.version = Set(current_version + 1);

        let updated = active.update(&txn).await.map_err(|e| {
            error!("Failed to cancel order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction for order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!("Order {} cancelled from status '{}'", order_id, old_status);

        if old_status != "cancelled" {
            if let Some(event_sender) = &self.event_sender {
                if let Err(e) = event_sender
                    .send(Event::OrderStatusChanged {
                        order_id,
                        customer_id: updated.customer_id,
                        old_status,
                        new_status: "cancelled".to_string(),
                    })
                    .await
                {
                    warn!("Failed to send cancellation event for order {}: {}", order_id, e);
                }
            }
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await
            .map_err(|e| {
                error!("Failed to fetch items for order {}: {}", order_id, e);
                ServiceError::DatabaseError(e)
            })?;

        Ok(OrderResponse::from_parts(updated, items))
    }

    /// Validates if a status transition is allowed
    fn is_valid_transition(&self, from_status: &str, to_status: &str) -> bool {
        match (from_status, to_status) {
            // Forward kitchen flow
            ("pending", "preparing") => true,
            ("preparing", "ready") => true,
            ("ready", "delivered") => true,

            // Cancellation from any non-terminal state
            ("pending", "cancelled") => true,
            ("preparing", "cancelled") => true,
            ("ready", "cancelled") => true,

            // Writing the current status again is a no-op
            _ if from_status == to_status => true,

            // Everything else, including any exit from a terminal state
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> OrderStatusService {
        let db = Arc::new(DbPool::default());
        let invoicing = InvoicingService::new(db.clone(), None);
        OrderStatusService::new(db, None, invoicing)
    }

    #[test]
    fn forward_flow_is_allowed() {
        let service = service();
        assert!(service.is_valid_transition("pending", "preparing"));
        assert!(service.is_valid_transition("preparing", "ready"));
        assert!(service.is_valid_transition("ready", "delivered"));
    }

    #[test]
    fn skipping_ahead_is_rejected() {
        let service = service();
        assert!(!service.is_valid_transition("pending", "ready"));
        assert!(!service.is_valid_transition("pending", "delivered"));
        assert!(!service.is_valid_transition("preparing", "delivered"));
    }

    #[test]
    fn cancellation_only_from_non_terminal_states() {
        let service = service();
        assert!(service.is_valid_transition("pending", "cancelled"));
        assert!(service.is_valid_transition("preparing", "cancelled"));
        assert!(service.is_valid_transition("ready", "cancelled"));
        assert!(!service.is_valid_transition("delivered", "cancelled"));
    }

    #[test]
    fn terminal_states_admit_no_exit() {
        let service = service();
        assert!(!service.is_valid_transition("delivered", "pending"));
        assert!(!service.is_valid_transition("delivered", "preparing"));
        assert!(!service.is_valid_transition("cancelled", "ready"));
        assert!(!service.is_valid_transition("cancelled", "pending"));
    }

    #[test]
    fn rewriting_the_same_status_is_a_noop() {
        let service = service();
        for status in VALID_STATUSES {
            assert!(service.is_valid_transition(status, status));
        }
    }

    #[test]
    fn moving_backwards_is_rejected() {
        let service = service();
        assert!(!service.is_valid_transition("preparing", "pending"));
        assert!(!service.is_valid_transition("ready", "preparing"));
        assert!(!service.is_valid_transition("delivered", "ready"));
    }
}
