//! Error types shared by the store, the banking operations and the HTTP layer.

use axum::http::StatusCode;
use thiserror::Error;

/// The main error type for nuvana operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Input ===
    /// A request field failed validation.
    #[error("{0}")]
    Validation(String),

    // === Lookups ===
    #[error("User not found")]
    UserNotFound,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Recipient account not found")]
    RecipientNotFound,

    #[error("Loan not found")]
    LoanNotFound,

    // === Money ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// The recipient leg of a transfer failed and the debit was reversed.
    #[error("Error crediting recipient account: {0}")]
    TransferReversed(String),

    // === Authentication ===
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is locked due to too many failed login attempts. Try again later.")]
    AccountLocked,

    #[error("Account is blocked. Please contact support.")]
    AccountBlocked,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Invalid OTP. Please try again.")]
    InvalidOtp,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Your session has expired. Please log in again.")]
    SessionExpired,

    /// A unique field is already taken.
    #[error("{0}")]
    Conflict(String),

    // === Configuration ===
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Persistence ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Renaming the temporary file over the record failed.
    #[error("failed to persist record: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // === Runtime ===
    /// A blocking store task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A specialized Result type for nuvana operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// HTTP status used when this error reaches a client.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InsufficientBalance => StatusCode::BAD_REQUEST,
            Self::UserNotFound
            | Self::AccountNotFound
            | Self::RecipientNotFound
            | Self::LoanNotFound => StatusCode::NOT_FOUND,
            Self::TransferReversed(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials
            | Self::IncorrectPassword
            | Self::InvalidOtp
            | Self::Unauthorized
            | Self::SessionExpired => StatusCode::UNAUTHORIZED,
            Self::AccountLocked => StatusCode::TOO_MANY_REQUESTS,
            Self::AccountBlocked => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ConfigLoad(_)
            | Self::ConfigValidation { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Persist(_)
            | Self::Csv(_)
            | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message is safe to show to an end user.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_passed_through() {
        let err = Error::validation("Invalid email format");
        assert_eq!(err.to_string(), "Invalid email format");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lookup_errors_map_to_not_found() {
        for err in [
            Error::UserNotFound,
            Error::AccountNotFound,
            Error::RecipientNotFound,
            Error::LoanNotFound,
        ] {
            assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn auth_errors_are_distinguishable() {
        assert_eq!(Error::AccountLocked.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(Error::AccountBlocked.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(Error::SessionExpired.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn io_errors_are_internal() {
        let err: Error = std::io::Error::other("disk full").into();
        assert!(err.is_internal());
        assert!(!Error::InsufficientBalance.is_internal());
    }

    #[test]
    fn transfer_reversal_keeps_cause() {
        let err = Error::TransferReversed("Account not found".to_string());
        assert_eq!(
            err.to_string(),
            "Error crediting recipient account: Account not found"
        );
    }
}
