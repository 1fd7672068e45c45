//! Input validation utilities
//!
//! Rules are applied to a map of raw field values and every failure is
//! collected, so callers can report all offending fields at once.
//!
//! # Usage
//!
//! ```rust
//! use birthday_scheduler::utils::validation::{Validator, ValidationRule};
//! use std::collections::HashMap;
//!
//! let validator = Validator::new()
//!     .rule(ValidationRule::required("name"))
//!     .rule(ValidationRule::email("email"))
//!     .rule(ValidationRule::timezone("timezone"));
//!
//! let mut data = HashMap::new();
//! data.insert("name".to_string(), Some("Ayu".to_string()));
//! data.insert("email".to_string(), Some("ayu@example.com".to_string()));
//! data.insert("timezone".to_string(), Some("Asia/Jakarta".to_string()));
//! assert!(validator.validate(&data).is_ok());
//! ```

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Validation errors that can occur during input validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Field is required but missing or empty
    #[error("Field '{field}' is required")]
    Required { field: String },

    /// Field value is too long
    #[error("Field '{field}' must be at most {max} characters long (got {actual})")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    /// Field value is not an email address
    #[error("Field '{field}' must be a valid email address")]
    InvalidEmail { field: String },

    /// Field value is not an ISO 8601 date
    #[error("Field '{field}' must be a valid ISO 8601 date (got '{value}')")]
    InvalidDate { field: String, value: String },

    /// Field value is not an IANA timezone identifier
    #[error("Field '{field}' must be a valid IANA timezone (got '{value}')")]
    InvalidTimezone { field: String, value: String },
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

/// A validation rule that can be applied to a field
#[derive(Debug, Clone)]
pub enum ValidationRule {
    /// Field is required (not None, not blank)
    Required(String),

    /// Field must be at most max characters long
    MaxLength { field: String, max: usize },

    /// Field must look like an email address
    Email(String),

    /// Field must parse as an ISO 8601 date or datetime
    Date(String),

    /// Field must name an IANA timezone
    Timezone(String),
}

impl ValidationRule {
    /// Create a required field rule
    pub fn required<S: Into<String>>(field: S) -> Self {
        Self::Required(field.into())
    }

    /// Create a maximum length rule
    pub fn max_length<S: Into<String>>(field: S, max: usize) -> Self {
        Self::MaxLength {
            field: field.into(),
            max,
        }
    }

    /// Create an email rule
    pub fn email<S: Into<String>>(field: S) -> Self {
        Self::Email(field.into())
    }

    /// Create a date rule
    pub fn date<S: Into<String>>(field: S) -> Self {
        Self::Date(field.into())
    }

    /// Create a timezone rule
    pub fn timezone<S: Into<String>>(field: S) -> Self {
        Self::Timezone(field.into())
    }
}

/// Validator that applies multiple validation rules
#[derive(Debug)]
pub struct Validator {
    rules: Vec<ValidationRule>,
}

impl Validator {
    /// Create a new empty validator
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a validation rule
    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate a map of field values
    pub fn validate(&self, data: &HashMap<String, Option<String>>) -> ValidationResult<()> {
        let errors: Vec<ValidationError> = self
            .rules
            .iter()
            .filter_map(|rule| self.apply_rule(rule, data).err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Apply a single validation rule. Non-required rules skip missing fields.
    fn apply_rule(
        &self,
        rule: &ValidationRule,
        data: &HashMap<String, Option<String>>,
    ) -> Result<(), ValidationError> {
        match rule {
            ValidationRule::Required(field) => {
                let value = data.get(field).and_then(|v| v.as_ref());
                match value {
                    Some(v) if !v.trim().is_empty() => Ok(()),
                    _ => Err(ValidationError::Required {
                        field: field.clone(),
                    }),
                }
            }

            ValidationRule::MaxLength { field, max } => match data.get(field) {
                Some(Some(value)) if value.chars().count() > *max => Err(ValidationError::TooLong {
                    field: field.clone(),
                    max: *max,
                    actual: value.chars().count(),
                }),
                _ => Ok(()),
            },

            ValidationRule::Email(field) => match data.get(field) {
                Some(Some(value)) if !value.is_empty() && !is_email(value) => {
                    Err(ValidationError::InvalidEmail {
                        field: field.clone(),
                    })
                }
                _ => Ok(()),
            },

            ValidationRule::Date(field) => match data.get(field) {
                Some(Some(value)) if !value.is_empty() && parse_birthdate(value).is_none() => {
                    Err(ValidationError::InvalidDate {
                        field: field.clone(),
                        value: value.clone(),
                    })
                }
                _ => Ok(()),
            },

            ValidationRule::Timezone(field) => match data.get(field) {
                Some(Some(value)) if !value.is_empty() && parse_timezone(value).is_none() => {
                    Err(ValidationError::InvalidTimezone {
                        field: field.clone(),
                        value: value.clone(),
                    })
                }
                _ => Ok(()),
            },
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|e| panic!("email regex: {e}"))
    })
}

/// Loose email check: something@domain.tld with no whitespace
pub fn is_email(value: &str) -> bool {
    email_regex().is_match(value.trim())
}

/// Parse a birthdate from `YYYY-MM-DD` or a full RFC 3339 timestamp.
///
/// Timestamps keep their own calendar date; no timezone shift is applied.
pub fn parse_birthdate(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Parse an IANA timezone identifier
pub fn parse_timezone(value: &str) -> Option<Tz> {
    value.trim().parse::<Tz>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_required_validation() {
        let input = data(&[("name", Some("test")), ("empty", Some("  ")), ("missing", None)]);

        let validator = Validator::new()
            .rule(ValidationRule::required("name"))
            .rule(ValidationRule::required("empty"))
            .rule(ValidationRule::required("missing"));

        let errors = validator.validate(&input).unwrap_err();
        assert_eq!(errors.len(), 2); // empty and missing should fail
    }

    #[test]
    fn test_email_validation() {
        let input = data(&[("good", Some("a@b.co")), ("bad", Some("not-an-email"))]);

        let validator = Validator::new()
            .rule(ValidationRule::email("good"))
            .rule(ValidationRule::email("bad"));

        let errors = validator.validate(&input).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidEmail {
                field: "bad".to_string()
            }]
        );
    }

    #[test]
    fn test_date_validation_accepts_date_and_timestamp() {
        assert_eq!(
            parse_birthdate("1990-01-01"),
            NaiveDate::from_ymd_opt(1990, 1, 1)
        );
        assert_eq!(
            parse_birthdate("1990-01-01T00:00:00Z"),
            NaiveDate::from_ymd_opt(1990, 1, 1)
        );
        assert_eq!(parse_birthdate("1990-02-30"), None);
        assert_eq!(parse_birthdate("yesterday"), None);
    }

    #[test]
    fn test_timezone_validation() {
        let input = data(&[("tz", Some("Asia/Jakarta")), ("bad_tz", Some("Mars/Olympus"))]);

        let validator = Validator::new()
            .rule(ValidationRule::timezone("tz"))
            .rule(ValidationRule::timezone("bad_tz"));

        let errors = validator.validate(&input).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ValidationError::InvalidTimezone { field, .. } if field == "bad_tz"
        ));
    }

    #[test]
    fn test_optional_rules_skip_missing_fields() {
        let validator = Validator::new()
            .rule(ValidationRule::email("email"))
            .rule(ValidationRule::date("birthdate"))
            .rule(ValidationRule::max_length("name", 3));

        assert!(validator.validate(&HashMap::new()).is_ok());
    }
}
