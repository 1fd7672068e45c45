//! Service layer for business logic
//!
//! Services sit between callers and the repository layer: they validate
//! input, write records, and keep the job queue in step with every write.
//!
//! # Design Principles
//!
//! - **Dependency Injection**: Services depend on repository traits, not concrete implementations
//! - **Validation**: Input validation happens at the service layer, before any write
//! - **Logging**: Business operations are logged with appropriate context

pub mod notifier;
pub mod person_service;

pub use notifier::{BirthdayMessage, BirthdayNotifier, LogNotifier};
pub use person_service::PersonService;

#[cfg(test)]
pub use notifier::MockBirthdayNotifier;
