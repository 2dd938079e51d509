use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Composite index for a customer's orders filtered by status
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_customer_status")
                    .table(Orders::Table)
                    .col(Orders::CustomerId)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        // Recent orders listing sorted by creation date
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_created_status")
                    .table(Orders::Table)
                    .col((Orders::CreatedAt, IndexOrder::Desc))
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        // Foreign key index for order line joins
        manager
            .create_index(
                Index::create()
                    .name("idx_order_items_order_id")
                    .table(OrderItems::Table)
                    .col(OrderItems::OrderId)
                    .to_owned(),
            )
            .await?;

        // Student-scoped invoice listing
        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_customer_id")
                    .table(Invoices::Table)
                    .col(Invoices::CustomerId)
                    .to_owned(),
            )
            .await?;

        // Foreign key index for invoice line joins
        manager
            .create_index(
                Index::create()
                    .name("idx_invoice_items_invoice_id")
                    .table(InvoiceItems::Table)
                    .col(InvoiceItems::InvoiceId)
                    .to_owned(),
            )
            .await?;

        // Menu browsing by category
        manager
            .create_index(
                Index::create()
                    .name("idx_menu_items_category")
                    .table(MenuItems::Table)
                    .col(MenuItems::Category)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_menu_items_category").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_invoice_items_invoice_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_invoices_customer_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_order_items_order_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_orders_created_status").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_orders_customer_status").to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum Orders {
    Table,
    CustomerId,
    Status,
    CreatedAt,
}

#[derive(Iden)]
enum OrderItems {
    Table,
    OrderId,
}

#[derive(Iden)]
enum Invoices {
    Table,
    CustomerId,
}

#[derive(Iden)]
enum InvoiceItems {
    Table,
    InvoiceId,
}

#[derive(Iden)]
enum MenuItems {
    Table,
    Category,
}
