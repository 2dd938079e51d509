// Core services
pub mod catalog;
pub mod orders;

// Simple status helpers that work directly with entities
pub mod order_status;

// Financial services
pub mod invoicing;
