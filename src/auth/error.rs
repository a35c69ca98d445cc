use thiserror::Error;

/// Failures surfaced by the credential store.
///
/// The `Display` text of each variant is what API clients see, so it must
/// never carry internal detail (paths, I/O errors, whether a user exists).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing fields")]
    MissingFields,

    #[error("Username already exists")]
    UsernameTaken,

    #[error("Email already exists")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Failed to save user")]
    Storage(#[from] std::io::Error),
}

impl AuthError {
    /// True for the two uniqueness violations.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::UsernameTaken | Self::EmailTaken)
    }
}
