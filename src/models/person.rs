//! Person model implementations: validation of raw input and timezone access

use chrono::Utc;
use chrono_tz::Tz;
use std::collections::HashMap;

use crate::models::{NewPerson, Person, PersonChanges, PersonCreateRequest, PersonUpdateRequest};
use crate::utils::validation::{
    ValidationError, ValidationResult, ValidationRule, Validator, parse_birthdate, parse_timezone,
};

const MAX_NAME_LENGTH: usize = 255;
const MAX_EMAIL_LENGTH: usize = 320;

impl Person {
    /// Parse the stored timezone identifier
    pub fn zone(&self) -> Option<Tz> {
        parse_timezone(&self.timezone)
    }

    /// Build the record that results from applying `changes`
    pub fn with_changes(&self, changes: &PersonChanges) -> Person {
        Person {
            id: self.id,
            name: changes.name.clone().unwrap_or_else(|| self.name.clone()),
            email: changes.email.clone().unwrap_or_else(|| self.email.clone()),
            birthdate: changes.birthdate.unwrap_or(self.birthdate),
            timezone: changes
                .timezone
                .clone()
                .unwrap_or_else(|| self.timezone.clone()),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Whether the fields that determine the occurrence differ
    pub fn schedule_changed(&self, other: &Person) -> bool {
        self.birthdate != other.birthdate || self.timezone != other.timezone
    }
}

impl PersonCreateRequest {
    fn as_field_map(&self) -> HashMap<String, Option<String>> {
        HashMap::from([
            ("name".to_string(), self.name.clone()),
            ("email".to_string(), self.email.clone()),
            ("birthdate".to_string(), self.birthdate.clone()),
            ("timezone".to_string(), self.timezone.clone()),
        ])
    }

    /// Validate every field and produce a [`NewPerson`]
    pub fn validate(&self) -> ValidationResult<NewPerson> {
        Validator::new()
            .rule(ValidationRule::required("name"))
            .rule(ValidationRule::max_length("name", MAX_NAME_LENGTH))
            .rule(ValidationRule::required("email"))
            .rule(ValidationRule::email("email"))
            .rule(ValidationRule::max_length("email", MAX_EMAIL_LENGTH))
            .rule(ValidationRule::required("birthdate"))
            .rule(ValidationRule::date("birthdate"))
            .rule(ValidationRule::required("timezone"))
            .rule(ValidationRule::timezone("timezone"))
            .validate(&self.as_field_map())?;

        let birthdate = self
            .birthdate
            .as_deref()
            .and_then(parse_birthdate)
            .ok_or_else(|| {
                vec![ValidationError::Required {
                    field: "birthdate".to_string(),
                }]
            })?;

        Ok(NewPerson {
            name: self.name.clone().unwrap_or_default().trim().to_string(),
            email: self.email.clone().unwrap_or_default().trim().to_string(),
            birthdate,
            timezone: self.timezone.clone().unwrap_or_default().trim().to_string(),
        })
    }
}

impl PersonUpdateRequest {
    fn as_field_map(&self) -> HashMap<String, Option<String>> {
        HashMap::from([
            ("name".to_string(), self.name.clone()),
            ("email".to_string(), self.email.clone()),
            ("birthdate".to_string(), self.birthdate.clone()),
            ("timezone".to_string(), self.timezone.clone()),
        ])
    }

    /// Validate the provided fields and produce [`PersonChanges`]
    pub fn validate(&self) -> ValidationResult<PersonChanges> {
        let mut validator = Validator::new()
            .rule(ValidationRule::max_length("name", MAX_NAME_LENGTH))
            .rule(ValidationRule::email("email"))
            .rule(ValidationRule::max_length("email", MAX_EMAIL_LENGTH))
            .rule(ValidationRule::date("birthdate"))
            .rule(ValidationRule::timezone("timezone"));

        // A present-but-blank name would wipe the record's name
        if self.name.is_some() {
            validator = validator.rule(ValidationRule::required("name"));
        }

        validator.validate(&self.as_field_map())?;

        Ok(PersonChanges {
            name: self.name.as_deref().map(|s| s.trim().to_string()),
            email: non_blank(self.email.as_deref()),
            birthdate: self.birthdate.as_deref().and_then(parse_birthdate),
            timezone: non_blank(self.timezone.as_deref()),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
