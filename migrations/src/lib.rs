pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_menu_items_table;
mod m20250301_000002_create_orders_table;
mod m20250301_000003_create_order_items_table;
mod m20250301_000004_create_invoices_table;
mod m20250301_000005_create_invoice_items_table;
mod m20250301_000006_create_invoice_counters_table;
mod m20250301_000007_add_lookup_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_menu_items_table::Migration),
            Box::new(m20250301_000002_create_orders_table::Migration),
            Box::new(m20250301_000003_create_order_items_table::Migration),
            Box::new(m20250301_000004_create_invoices_table::Migration),
            Box::new(m20250301_000005_create_invoice_items_table::Migration),
            Box::new(m20250301_000006_create_invoice_counters_table::Migration),
            Box::new(m20250301_000007_add_lookup_indexes::Migration),
        ]
    }
}
