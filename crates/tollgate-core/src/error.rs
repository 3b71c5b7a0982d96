//! Unified error handling for Tollgate
//!
//! Expected business conditions (no rate, insufficient balance, unreachable
//! call control) are reported by the billing operations as booleans or
//! outcome values. The variants here carry those conditions when they have to
//! cross a layer boundary, plus the infrastructure failures that are real
//! errors.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    #[error("Timed out waiting for session lock: {0}")]
    LockTimeout(String),

    // ==================== Billing Errors ====================
    #[error("Rate not found for destination: {0}")]
    RateNotFound(String),

    #[error("Invalid billing increment config: {0}")]
    InvalidIncrementConfig(String),

    #[error("Billing session not found: {0}")]
    SessionNotFound(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("Call termination failed: {0}")]
    TerminationFailed(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ==================== External Service Errors ====================
    #[error("ESL connection error: {0}")]
    EslConnection(String),

    #[error("ESL command failed: {0}")]
    EslCommand(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_)
            | AppError::InvalidInput(_)
            | AppError::InvalidIncrementConfig(_) => StatusCode::BAD_REQUEST,

            // 402 Payment Required
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,

            // 404 Not Found
            AppError::RateNotFound(_)
            | AppError::SessionNotFound(_)
            | AppError::CallNotFound(_)
            | AppError::AccountNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_) => StatusCode::CONFLICT,

            // 502 Bad Gateway
            AppError::TerminationFailed(_)
            | AppError::EslConnection(_)
            | AppError::EslCommand(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::LockTimeout(_) | AppError::CacheConnection(_) | AppError::Pool(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::LockTimeout(_) => "lock_timeout",
            AppError::RateNotFound(_) => "rate_not_found",
            AppError::InvalidIncrementConfig(_) => "invalid_increment_config",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::TerminationFailed(_) => "termination_failed",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::EslConnection(_) => "esl_connection_error",
            AppError::EslCommand(_) => "esl_command_error",
        }
    }

    /// Whether retrying the same persistence operation may succeed
    ///
    /// Settlement retries the whole transaction on these; everything else is
    /// surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Pool(_)
                | AppError::Transaction(_)
                | AppError::LockTimeout(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
