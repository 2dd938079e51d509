pub mod invoice;
pub mod invoice_counter;
pub mod invoice_item;
pub mod menu_item;
pub mod order;
pub mod order_item;
