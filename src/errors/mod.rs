//! Centralized error handling for the birthday scheduler
//!
//! Each layer owns a `thiserror` enum and converts into the next one up via
//! `#[from]`, so `?` works across layer boundaries without manual mapping.
//!
//! # Error Categories
//!
//! - **Repository Errors**: record store and ledger persistence failures
//! - **Scheduling Errors**: queue, timeout and occurrence computation failures
//! - **Delivery Errors**: retryable vs fatal classification for the worker
//! - **Validation Errors**: rejected input, never retried
//!
//! # Usage
//!
//! ```rust
//! use birthday_scheduler::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;
