//! SeaORM repository implementations
//!
//! This module provides repository implementations using SeaORM that work across
//! SQLite, PostgreSQL, and MySQL databases.

pub mod delivery_ledger;
pub mod person;

// Re-export for convenience
pub use delivery_ledger::DeliveryLedgerSeaOrmRepository;
pub use person::PersonSeaOrmRepository;
