//! Tollgate Core Library
//!
//! Foundational types for the real-time call billing engine:
//!
//! - Domain models (Rate, BillingSession, CallRecord, Account, LedgerEntry)
//! - The billing increment calculator (pure arithmetic, no I/O)
//! - Operator billing settings
//! - Collaborator traits for rates, call records, ledger, sessions and call control
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod billing;
pub mod config;
pub mod error;
pub mod models;
pub mod settings;
pub mod traits;

pub use billing::{BillingPrecision, IncrementConfig, RoundingMethod};
pub use config::AppConfig;
pub use error::AppError;
pub use settings::BillingSettings;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
