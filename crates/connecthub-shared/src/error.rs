use thiserror::Error;

use crate::constants::{MAX_BIO_LEN, MIN_INTERESTS, MIN_PASSWORD_LEN, MIN_USERNAME_LEN};

/// Client-side field validation failures. Shown inline next to the field
/// and never sent to the remote layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Username must be at least {MIN_USERNAME_LEN} characters")]
    UsernameTooShort,

    #[error("Select at least {MIN_INTERESTS} interests")]
    TooFewInterests,

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("File must be an image")]
    NotAnImage,

    #[error("File size must not exceed 1MB")]
    AvatarTooLarge,

    #[error("Community name must not be empty")]
    EmptyCommunityName,

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Bio must be at most {MAX_BIO_LEN} characters")]
    BioTooLong,
}
