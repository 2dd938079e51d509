use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::invoice::{self, ActiveModel as InvoiceActiveModel, Entity as InvoiceEntity, Model as InvoiceModel},
    entities::invoice_counter::{self, ActiveModel as CounterActiveModel, Entity as InvoiceCounterEntity},
    entities::invoice_item::{self, ActiveModel as InvoiceItemActiveModel, Entity as InvoiceItemEntity, Model as InvoiceItemModel},
    entities::order::Entity as OrderEntity,
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Formats a drawn sequence into the printed invoice number, e.g.
/// `INV-2025-000042`. Sequences past six digits widen instead of truncating.
pub fn format_invoice_number(year: i32, sequence: i64) -> String {
    format!("INV-{}-{:06}", year, sequence)
}

fn validate_amount(amount: &Decimal) -> Result<(), validator::ValidationError> {
    if amount.is_sign_negative() {
        return Err(validator::ValidationError::new("amount_negative"));
    }
    Ok(())
}

/// Request/Response types for the invoicing service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    pub order_id: Uuid,
    #[validate(custom = "validate_amount")]
    pub tax: Option<Decimal>,
    #[validate(custom = "validate_amount")]
    pub discount: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceItemResponse {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub status: String,
    pub issued_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub items: Vec<InvoiceItemResponse>,
    pub created_at: DateTime<Utc>,
}

impl InvoiceResponse {
    /// Assembles the API shape from an invoice row and its line rows.
    pub fn from_parts(invoice: InvoiceModel, items: Vec<InvoiceItemModel>) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            order_id: invoice.order_id,
            customer_id: invoice.customer_id,
            customer_name: invoice.customer_name,
            customer_email: invoice.customer_email,
            subtotal: invoice.subtotal,
            tax: invoice.tax,
            discount: invoice.discount,
            total: invoice.total,
            payment_method: invoice.payment_method,
            status: invoice.status,
            issued_at: invoice.issued_at,
            notes: invoice.notes,
            items: items
                .into_iter()
                .map(|item| InvoiceItemResponse {
                    name: item.name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total: item.total,
                })
                .collect(),
            created_at: invoice.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service for issuing and reading invoices.
///
/// Numbers come from a per-year counter row that is incremented inside the
/// issuing transaction, so concurrent issuers serialize on the counter and
/// can never print the same number. A rolled-back issuance leaves a gap,
/// which is fine: numbers must be unique and increasing, not gapless.
#[derive(Clone)]
pub struct InvoicingService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InvoicingService {
    /// Creates a new invoicing service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Issues the invoice for an order that just reached `delivered`.
    ///
    /// Idempotent: if the order is already invoiced, that invoice is returned
    /// unchanged, including when a concurrent issuer wins the race between
    /// our existence check and insert.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn issue_on_delivery(&self, order_id: Uuid) -> Result<InvoiceResponse, ServiceError> {
        // Fast path: the order was already invoiced
        if let Some(existing) = self.find_by_order(order_id).await? {
            return Ok(existing);
        }

        match self
            .issue_invoice(order_id, Decimal::ZERO, Decimal::ZERO, None)
            .await
        {
            Ok(response) => Ok(response),
            Err(ServiceError::InvoiceAlreadyExists(_)) => {
                // Lost the race to a concurrent issuer; theirs is the invoice
                self.find_by_order(order_id).await?.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "Invoice for order {} vanished after duplicate insert",
                        order_id
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Issues an invoice manually with custom tax and discount. Unlike the
    /// delivery path this is not idempotent: invoicing an already invoiced
    /// order is a conflict the caller has to see.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_invoice(
        &self,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceResponse, ServiceError> {
        request.validate()?;

        let tax = request.tax.unwrap_or(Decimal::ZERO);
        let discount = request.discount.unwrap_or(Decimal::ZERO);

        self.issue_invoice(request.order_id, tax, discount, request.notes)
            .await
    }

    /// Retrieves the invoice for an order, issuing it on the spot when the
    /// order is delivered but the delivery-time issuance never happened
    /// (for example because it failed and was only logged).
    #[instrument(skip(self, user), fields(order_id = %order_id))]
    pub async fn get_for_order(
        &self,
        order_id: Uuid,
        user: &AuthUser,
    ) -> Result<InvoiceResponse, ServiceError> {
        let db = &*self.db_pool;

        // The order decides both ownership and whether an invoice can exist
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order for invoice lookup");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !user.is_back_office() && order.customer_id != user.id {
            warn!(order_id = %order_id, user_id = %user.id, "Blocked read of another customer's invoice");
            return Err(ServiceError::Forbidden(
                "You are not allowed to view this invoice.".to_string(),
            ));
        }

        if let Some(existing) = self.find_by_order(order_id).await? {
            return Ok(existing);
        }

        if order.status != "delivered" {
            return Err(ServiceError::InvoiceNotYetAvailable(
                "Invoice is only available for delivered orders.".to_string(),
            ));
        }

        info!(order_id = %order_id, "Invoice missing for delivered order; issuing lazily");
        self.issue_on_delivery(order_id).await
    }

    /// Retrieves an invoice by ID. Students can only read their own invoices;
    /// back-office users can read any.
    #[instrument(skip(self, user), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        invoice_id: Uuid,
        user: &AuthUser,
    ) -> Result<InvoiceResponse, ServiceError> {
        let db = &*self.db_pool;

        let invoice = InvoiceEntity::find_by_id(invoice_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, invoice_id = %invoice_id, "Failed to fetch invoice from database");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                info!(invoice_id = %invoice_id, "Invoice not found");
                ServiceError::NotFound(format!("Invoice {} not found", invoice_id))
            })?;

        if !user.is_back_office() && invoice.customer_id != user.id {
            warn!(invoice_id = %invoice_id, user_id = %user.id, "Blocked read of another customer's invoice");
            return Err(ServiceError::Forbidden(
                "You are not allowed to view this invoice.".to_string(),
            ));
        }

        let items = self.load_items(invoice.id).await?;
        Ok(InvoiceResponse::from_parts(invoice, items))
    }

    /// Lists invoices with pagination, newest first. Results are scoped to
    /// the caller unless they are back-office.
    #[instrument(skip(self, user))]
    pub async fn list_invoices(
        &self,
        user: &AuthUser,
        page: u64,
        per_page: u64,
    ) -> Result<InvoiceListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = InvoiceEntity::find().order_by_desc(invoice::Column::IssuedAt);

        if !user.is_back_office() {
            query = query.filter(invoice::Column::CustomerId.eq(user.id));
        }

        let paginator = query.paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count invoices");
            ServiceError::DatabaseError(e)
        })?;

        let invoices = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page = page, per_page = per_page, "Failed to fetch invoices page");
            ServiceError::DatabaseError(e)
        })?;

        // One items query for the whole page instead of one per invoice
        let invoice_ids: Vec<Uuid> = invoices.iter().map(|invoice| invoice.id).collect();
        let mut items_by_invoice: HashMap<Uuid, Vec<InvoiceItemModel>> = HashMap::new();
        if !invoice_ids.is_empty() {
            let items = InvoiceItemEntity::find()
                .filter(invoice_item::Column::InvoiceId.is_in(invoice_ids))
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to fetch invoice items for page");
                    ServiceError::DatabaseError(e)
                })?;

            for item in items {
                items_by_invoice.entry(item.invoice_id).or_default().push(item);
            }
        }

        let invoice_responses: Vec<InvoiceResponse> = invoices
            .into_iter()
            .map(|invoice| {
                let items = items_by_invoice.remove(&invoice.id).unwrap_or_default();
                InvoiceResponse::from_parts(invoice, items)
            })
            .collect();

        Ok(InvoiceListResponse {
            invoices: invoice_responses,
            total,
            page,
            per_page,
        })
    }

    /// Finds the invoice covering an order, if one exists yet.
    async fn find_by_order(&self, order_id: Uuid) -> Result<Option<InvoiceResponse>, ServiceError> {
        let db = &*self.db_pool;

        let invoice = InvoiceEntity::find()
            .filter(invoice::Column::OrderId.eq(order_id))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to look up invoice by order");
                ServiceError::DatabaseError(e)
            })?;

        match invoice {
            Some(invoice) => {
                let items = self.load_items(invoice.id).await?;
                Ok(Some(InvoiceResponse::from_parts(invoice, items)))
            }
            None => Ok(None),
        }
    }

    async fn load_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItemModel>, ServiceError> {
        let db = &*self.db_pool;

        InvoiceItemEntity::find()
            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, invoice_id = %invoice_id, "Failed to fetch invoice items");
                ServiceError::DatabaseError(e)
            })
    }

    /// Draws the next number for `year` inside the issuing transaction.
    ///
    /// The counter row is seeded with an insert that backs off on conflict,
    /// then bumped with an atomic in-place increment. Concurrent issuers
    /// queue on the row lock, so each commit observes a distinct value.
    async fn next_sequence(
        &self,
        txn: &DatabaseTransaction,
        year: i32,
    ) -> Result<i64, ServiceError> {
        let seed = CounterActiveModel {
            year: Set(year),
            last_value: Set(0),
        };

        match InvoiceCounterEntity::insert(seed)
            .on_conflict(
                OnConflict::column(invoice_counter::Column::Year)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(txn)
            .await
        {
            // RecordNotInserted means the conflict clause skipped the row
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => {
                error!(error = %e, year = year, "Failed to seed invoice counter");
                return Err(ServiceError::DatabaseError(e));
            }
        }

        let updated = InvoiceCounterEntity::update_many()
            .col_expr(
                invoice_counter::Column::LastValue,
                Expr::col(invoice_counter::Column::LastValue).add(1),
            )
            .filter(invoice_counter::Column::Year.eq(year))
            .exec(txn)
            .await
            .map_err(|e| {
                error!(error = %e, year = year, "Failed to increment invoice counter");
                ServiceError::DatabaseError(e)
            })?;

        if updated.rows_affected == 0 {
            return Err(ServiceError::InternalError(format!(
                "Invoice counter for year {} disappeared mid-draw",
                year
            )));
        }

        let counter = InvoiceCounterEntity::find_by_id(year)
            .one(txn)
            .await
            .map_err(|e| {
                error!(error = %e, year = year, "Failed to read invoice counter");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Invoice counter for year {} disappeared mid-draw",
                    year
                ))
            })?;

        Ok(counter.last_value)
    }

    /// Creates the invoice row and its line rows in one transaction.
    ///
    /// The unique constraint on `order_id` is the final word on one invoice
    /// per order; losing that race surfaces as `InvoiceAlreadyExists`.
    async fn issue_invoice(
        &self,
        order_id: Uuid,
        tax: Decimal,
        discount: Decimal,
        notes: Option<String>,
    ) -> Result<InvoiceResponse, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for invoice issuance");
            ServiceError::DatabaseError(e)
        })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order for invoicing");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let already_invoiced = InvoiceEntity::find()
            .filter(invoice::Column::OrderId.eq(order_id))
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to check for existing invoice");
                ServiceError::DatabaseError(e)
            })?
            .is_some();

        if already_invoiced {
            return Err(ServiceError::InvoiceAlreadyExists(
                "Invoice already exists for this order.".to_string(),
            ));
        }

        let order_items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order items for invoicing");
                ServiceError::DatabaseError(e)
            })?;

        let subtotal = order.total_amount;
        let total = subtotal + tax - discount;
        if total.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "Discount cannot exceed the invoiced amount.".to_string(),
            ));
        }

        // Delivered orders were paid at the counter; anything earlier still owes
        let status = if order.status == "delivered" {
            "paid"
        } else {
            "pending"
        };

        let year = now.year();
        let sequence = self.next_sequence(&txn, year).await?;
        let invoice_number = format_invoice_number(year, sequence);

        let invoice_id = Uuid::new_v4();
        let invoice_active_model = InvoiceActiveModel {
            id: Set(invoice_id),
            invoice_number: Set(invoice_number),
            order_id: Set(order_id),
            customer_id: Set(order.customer_id),
            customer_name: Set(order.customer_name.clone()),
            customer_email: Set(order.customer_email.clone()),
            subtotal: Set(subtotal),
            tax: Set(tax),
            discount: Set(discount),
            total: Set(total),
            payment_method: Set(order.payment_method.clone()),
            status: Set(status.to_string()),
            issued_at: Set(now),
            notes: Set(notes),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let invoice_model = invoice_active_model.insert(&txn).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                warn!(order_id = %order_id, "Invoice insert lost a race to a concurrent issuer");
                ServiceError::InvoiceAlreadyExists(
                    "Invoice already exists for this order.".to_string(),
                )
            } else {
                error!(error = %e, order_id = %order_id, "Failed to create invoice in database");
                ServiceError::DatabaseError(e)
            }
        })?;

        let invoice_items: Vec<InvoiceItemActiveModel> = order_items
            .iter()
            .map(|item| InvoiceItemActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(invoice_id),
                name: Set(item.name.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total: Set(item.unit_price * Decimal::from(item.quantity)),
                created_at: Set(now),
            })
            .collect();

        InvoiceItemEntity::insert_many(invoice_items)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, invoice_id = %invoice_id, "Failed to create invoice items");
                ServiceError::DatabaseError(e)
            })?;

        // Commit the transaction
        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit invoice transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            invoice_id = %invoice_id,
            order_id = %order_id,
            invoice_number = %invoice_model.invoice_number,
            "Invoice issued successfully"
        );

        // Send event if event sender is available
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::InvoiceIssued {
                    invoice_id,
                    order_id,
                    invoice_number: invoice_model.invoice_number.clone(),
                })
                .await
            {
                warn!(error = %e, invoice_id = %invoice_id, "Failed to send invoice issued event");
            }
        }

        let items = self.load_items(invoice_id).await?;
        Ok(InvoiceResponse::from_parts(invoice_model, items))
    }
}
