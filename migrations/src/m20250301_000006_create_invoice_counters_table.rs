use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per calendar year; last_value is only ever moved by an
        // atomic increment inside the invoice-issuing transaction.
        manager
            .create_table(
                Table::create()
                    .table(InvoiceCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceCounters::Year)
                            .integer()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceCounters::LastValue)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvoiceCounters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum InvoiceCounters {
    Table,
    Year,
    LastValue,
}
