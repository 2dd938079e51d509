pub mod invoices;
pub mod menu;
pub mod orders;

use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<crate::services::catalog::CatalogService>,
    pub orders: Arc<crate::services::orders::OrderService>,
    pub order_status: Arc<crate::services::order_status::OrderStatusService>,
    pub invoicing: Arc<crate::services::invoicing::InvoicingService>,
}

impl AppServices {
    /// Wire up every service against the shared pool and event channel.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        let catalog = Arc::new(crate::services::catalog::CatalogService::new(
            db_pool.clone(),
        ));
        let orders = Arc::new(crate::services::orders::OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let invoicing =
            crate::services::invoicing::InvoicingService::new(db_pool.clone(), event_sender.clone());
        // Delivery transitions issue invoices, so the status service carries
        // its own handle to the invoicing service.
        let order_status = Arc::new(crate::services::order_status::OrderStatusService::new(
            db_pool,
            event_sender,
            invoicing.clone(),
        ));

        Self {
            catalog,
            orders,
            order_status,
            invoicing: Arc::new(invoicing),
        }
    }
}
