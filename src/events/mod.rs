use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Events emitted after a state change has committed. Consumers must treat
/// them as notifications only; the database is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        customer_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        customer_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InvoiceIssued {
        invoice_id: Uuid,
        order_id: Uuid,
        invoice_number: String,
    },
}

/// Customer-facing text for an order status, used for notification lines.
pub fn status_message(status: &str) -> &'static str {
    match status {
        "pending" => "Your order has been received",
        "preparing" => "Your order is being prepared",
        "ready" => "Your order is ready for pickup!",
        "delivered" => "Your order has been delivered",
        "cancelled" => "Your order has been cancelled",
        _ => "Your order has been updated",
    }
}

// Processes incoming events until every sender handle has been dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!("Received event: {:?}", event);

        match event {
            Event::OrderCreated {
                order_id,
                customer_id,
            } => {
                if let Err(e) = handle_order_created(order_id, customer_id).await {
                    error!(
                        "Failed to handle order created event: order_id={}, error={}",
                        order_id, e
                    );
                }
            }
            Event::OrderStatusChanged {
                order_id,
                customer_id,
                old_status,
                new_status,
            } => {
                if let Err(e) =
                    handle_order_status_changed(order_id, customer_id, &old_status, &new_status)
                        .await
                {
                    error!(
                        "Failed to handle order status change event: order_id={}, error={}",
                        order_id, e
                    );
                }
            }
            Event::InvoiceIssued {
                invoice_id,
                order_id,
                invoice_number,
            } => {
                if let Err(e) = handle_invoice_issued(invoice_id, order_id, &invoice_number).await {
                    error!(
                        "Failed to handle invoice issued event: invoice_id={}, error={}",
                        invoice_id, e
                    );
                }
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events
async fn handle_order_created(order_id: Uuid, customer_id: Uuid) -> Result<(), String> {
    info!(
        "Processing order created event for order {} (customer {})",
        order_id, customer_id
    );

    Ok(())
}

async fn handle_order_status_changed(
    order_id: Uuid,
    customer_id: Uuid,
    old_status: &str,
    new_status: &str,
) -> Result<(), String> {
    info!(
        "Order {} moved from {} to {}; notifying customer {}: {}",
        order_id,
        old_status,
        new_status,
        customer_id,
        status_message(new_status)
    );

    Ok(())
}

async fn handle_invoice_issued(
    invoice_id: Uuid,
    order_id: Uuid,
    invoice_number: &str,
) -> Result<(), String> {
    info!(
        "Invoice {} ({}) issued for order {}",
        invoice_number, invoice_id, order_id
    );

    Ok(())
}
