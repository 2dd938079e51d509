use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Invoices::InvoiceNumber)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    // At most one invoice per order, enforced by the schema
                    .col(
                        ColumnDef::new(Invoices::OrderId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Invoices::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(Invoices::CustomerName).string().not_null())
                    .col(ColumnDef::new(Invoices::CustomerEmail).string().null())
                    .col(ColumnDef::new(Invoices::Subtotal).decimal().not_null())
                    .col(
                        ColumnDef::new(Invoices::Tax)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Invoices::Discount)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Invoices::Total).decimal().not_null())
                    .col(ColumnDef::new(Invoices::PaymentMethod).string().not_null())
                    .col(
                        ColumnDef::new(Invoices::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Invoices::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Invoices::Notes).text().null())
                    .col(
                        ColumnDef::new(Invoices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invoices::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoices_order_id")
                            .from(Invoices::Table, Invoices::OrderId)
                            .to(
                                super::m20250301_000002_create_orders_table::Orders::Table,
                                super::m20250301_000002_create_orders_table::Orders::Id,
                            ),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Invoices {
    Table,
    Id,
    InvoiceNumber,
    OrderId,
    CustomerId,
    CustomerName,
    CustomerEmail,
    Subtotal,
    Tax,
    Discount,
    Total,
    PaymentMethod,
    Status,
    IssuedAt,
    Notes,
    CreatedAt,
    UpdatedAt,
}
