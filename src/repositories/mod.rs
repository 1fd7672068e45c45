//! Storage contracts and in-memory implementations
//!
//! The traits here are what the scheduler, worker and reconciliation
//! service depend on. SeaORM-backed implementations live under
//! `database::repositories`.

pub mod memory;
pub mod traits;

pub use memory::{InMemoryDeliveryLedger, InMemoryPersonStore};
pub use traits::{DeliveryLedger, LedgerInsert, PersonStore};

#[cfg(test)]
pub use traits::{MockDeliveryLedger, MockPersonStore};
