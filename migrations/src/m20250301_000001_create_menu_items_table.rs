use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MenuItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MenuItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MenuItems::Name).string().not_null())
                    .col(ColumnDef::new(MenuItems::Description).text().null())
                    .col(ColumnDef::new(MenuItems::Category).string().not_null())
                    .col(ColumnDef::new(MenuItems::Price).decimal().not_null())
                    .col(
                        ColumnDef::new(MenuItems::Stock)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MenuItems::IsAvailable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(MenuItems::ImageUrl).string().null())
                    .col(
                        ColumnDef::new(MenuItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MenuItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MenuItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum MenuItems {
    Table,
    Id,
    Name,
    Description,
    Category,
    Price,
    Stock,
    IsAvailable,
    ImageUrl,
    CreatedAt,
    UpdatedAt,
}
