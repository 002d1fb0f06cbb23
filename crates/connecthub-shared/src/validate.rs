//! Field-level validation for forms (signup, onboarding, settings).
//!
//! Failures block submission locally; nothing here ever reaches the
//! gateway.

use crate::constants::{
    MAX_AVATAR_BYTES, MAX_BIO_LEN, MIN_INTERESTS, MIN_PASSWORD_LEN, MIN_USERNAME_LEN,
};
use crate::error::ValidationError;

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.trim().chars().count() < MIN_USERNAME_LEN {
        return Err(ValidationError::UsernameTooShort);
    }
    Ok(())
}

pub fn validate_signup_password(password: &str, repeat: &str) -> Result<(), ValidationError> {
    if password != repeat {
        return Err(ValidationError::PasswordMismatch);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

pub fn validate_interest_selection(selected: usize) -> Result<(), ValidationError> {
    if selected < MIN_INTERESTS {
        return Err(ValidationError::TooFewInterests);
    }
    Ok(())
}

pub fn validate_bio(bio: &str) -> Result<(), ValidationError> {
    if bio.chars().count() > MAX_BIO_LEN {
        return Err(ValidationError::BioTooLong);
    }
    Ok(())
}

pub fn validate_community_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyCommunityName);
    }
    Ok(())
}

/// Avatar uploads must be images no larger than 1 MiB.
pub fn validate_avatar(content_type: &str, size: usize) -> Result<(), ValidationError> {
    if !content_type.starts_with("image/") {
        return Err(ValidationError::NotAnImage);
    }
    if size > MAX_AVATAR_BYTES {
        return Err(ValidationError::AvatarTooLarge);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_length() {
        assert_eq!(
            validate_username("ab"),
            Err(ValidationError::UsernameTooShort)
        );
        assert_eq!(validate_username("  ab  "), Err(ValidationError::UsernameTooShort));
        assert!(validate_username("abc").is_ok());
    }

    #[test]
    fn password_mismatch_reported_before_length() {
        assert_eq!(
            validate_signup_password("short", "different"),
            Err(ValidationError::PasswordMismatch)
        );
        assert_eq!(
            validate_signup_password("short", "short"),
            Err(ValidationError::PasswordTooShort)
        );
        assert!(validate_signup_password("longenough", "longenough").is_ok());
    }

    #[test]
    fn interest_minimum() {
        assert_eq!(
            validate_interest_selection(2),
            Err(ValidationError::TooFewInterests)
        );
        assert!(validate_interest_selection(3).is_ok());
    }

    #[test]
    fn avatar_type_and_size() {
        assert_eq!(
            validate_avatar("text/plain", 10),
            Err(ValidationError::NotAnImage)
        );
        assert_eq!(
            validate_avatar("image/png", MAX_AVATAR_BYTES + 1),
            Err(ValidationError::AvatarTooLarge)
        );
        assert!(validate_avatar("image/jpeg", MAX_AVATAR_BYTES).is_ok());
    }

    #[test]
    fn bio_length() {
        assert!(validate_bio(&"x".repeat(MAX_BIO_LEN)).is_ok());
        assert_eq!(
            validate_bio(&"x".repeat(MAX_BIO_LEN + 1)),
            Err(ValidationError::BioTooLong)
        );
    }
}
