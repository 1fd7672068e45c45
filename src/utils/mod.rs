//! Utility modules for the birthday scheduler
//!
//! - `clock`: injectable wall-clock source
//! - `validation`: input validation for person records

pub mod clock;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use validation::{ValidationError, ValidationResult, ValidationRule, Validator};
