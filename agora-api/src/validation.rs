//! Validation Traits
//!
//! Request payload checks shared by the route handlers.

use crate::error::{ApiError, ApiResult};

/// Trait for validating non-empty strings.
pub trait ValidateNonEmpty {
    /// Returns `ApiError::missing_field` if the value is empty or whitespace-only.
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        if self.trim().is_empty() {
            return Err(ApiError::missing_field(field_name));
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        self.as_str().validate_non_empty(field_name)
    }
}

/// Trait for validating string lengths, counted in characters.
pub trait ValidateLength {
    fn validate_max_len(&self, field_name: &str, max: usize) -> ApiResult<()>;

    fn validate_len_between(&self, field_name: &str, min: usize, max: usize) -> ApiResult<()>;
}

impl ValidateLength for str {
    fn validate_max_len(&self, field_name: &str, max: usize) -> ApiResult<()> {
        if self.chars().count() > max {
            return Err(ApiError::validation_failed(format!(
                "Field '{}' must be at most {} characters",
                field_name, max
            )));
        }
        Ok(())
    }

    fn validate_len_between(&self, field_name: &str, min: usize, max: usize) -> ApiResult<()> {
        let len = self.chars().count();
        if len < min || len > max {
            return Err(ApiError::validation_failed(format!(
                "Field '{}' must be between {} and {} characters",
                field_name, min, max
            )));
        }
        Ok(())
    }
}

impl ValidateLength for String {
    fn validate_max_len(&self, field_name: &str, max: usize) -> ApiResult<()> {
        self.as_str().validate_max_len(field_name, max)
    }

    fn validate_len_between(&self, field_name: &str, min: usize, max: usize) -> ApiResult<()> {
        self.as_str().validate_len_between(field_name, min, max)
    }
}

/// Minimal shape check: one `@` with something on both sides.
pub fn validate_email(email: &str, max_len: usize) -> ApiResult<()> {
    email.validate_non_empty("email")?;
    email.validate_max_len("email", max_len)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(ApiError::validation_failed("Field 'email' must be a valid email address")),
    }
}

/// Trait for checking if an update request has any fields set.
pub trait HasUpdates {
    fn has_any_updates(&self) -> bool;

    /// Validate that at least one update field is set.
    fn validate_has_updates(&self) -> ApiResult<()> {
        if !self.has_any_updates() {
            return Err(ApiError::invalid_input(
                "At least one field must be provided for update",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_validate_non_empty_str() {
        assert!("hello".validate_non_empty("test").is_ok());
        assert!("".validate_non_empty("test").is_err());
        assert!("   ".validate_non_empty("test").is_err());
    }

    #[test]
    fn test_validate_max_len_counts_chars() {
        assert!("héllo".validate_max_len("t", 5).is_ok());
        let err = "héllo!".validate_max_len("t", 5).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_validate_len_between() {
        assert!("ab".validate_len_between("password", 3, 72).is_err());
        assert!("abc".validate_len_between("password", 3, 72).is_ok());
        assert!("a".repeat(72).validate_len_between("password", 3, 72).is_ok());
        assert!("a".repeat(73).validate_len_between("password", 3, 72).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ann@example.com", 255).is_ok());
        assert!(validate_email("ann.example.com", 255).is_err());
        assert!(validate_email("@example.com", 255).is_err());
        assert!(validate_email("ann@", 255).is_err());
        assert!(validate_email("a@b@c", 255).is_err());
        assert!(validate_email("", 255).is_err());
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(validate_email(&long, 255).is_err());
    }
}
