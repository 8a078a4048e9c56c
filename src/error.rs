//! Error types for the recipe pipeline
//!
//! Every failure is categorized so callers can decide between retrying,
//! skipping the item, or aborting the worker.

use thiserror::Error;

/// Common result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline error categories
#[derive(Error, Debug)]
pub enum Error {
    /// Database error (transient unless a constraint violation)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error to an external service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input violates the recipe invariants; never retried
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Provider quota or 429 response; retried with longer backoff
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Unique-constraint collision on identifier or title
    #[error("Duplicate recipe: {0}")]
    Duplicate(String),

    /// Model output did not match the lenient schema
    #[error("Model output did not match schema: {0}")]
    ModelSchema(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// External service unreachable or unhealthy
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry with backoff can plausibly succeed.
    ///
    /// Validation failures, schema failures and duplicates are permanent for
    /// a given input; configuration errors abort the worker instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(e) => !is_constraint_violation(e),
            Error::Io(_) | Error::Http(_) | Error::RateLimited(_) | Error::Unavailable(_) => true,
            _ => false,
        }
    }

    /// Process exit code for the CLI front-end.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) => 2,
            Error::Unavailable(_) => 3,
            _ => 1,
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = axum::Json(serde_json::json!({
            "error": { "message": self.to_string() }
        }));
        (status, body).into_response()
    }
}

/// Check whether a sqlx error is a unique/check constraint violation
/// (permanent for the given input, so not worth retrying).
pub fn is_constraint_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.is_check_violation()
        }
        _ => false,
    }
}
