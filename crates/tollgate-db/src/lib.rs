//! Tollgate Database Layer
//!
//! Durable storage for the billing engine:
//!
//! - Connection pool management and migrations with sqlx
//! - PostgreSQL repositories for rates, call records, accounts, the balance
//!   ledger and operator settings
//! - Longest prefix matching for rate lookups
//! - Settlement that debits the ledger and writes the call cost in one transaction
//! - An in-memory store with the same semantics for single-process use and tests

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::InMemoryStore;
pub use pool::{create_pool, health_check, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use sqlx::PgPool;
pub use tollgate_core::{AppError, AppResult};
