//! Repository implementations
//!
//! This module contains PostgreSQL implementations of the repository traits
//! defined in tollgate-core, using sqlx.

pub mod account_repo;
pub mod call_record_repo;
pub mod ledger_repo;
pub mod rate_repo;
pub mod settings_repo;

pub use account_repo::PgAccountRepository;
pub use call_record_repo::PgCallRecordRepository;
pub use ledger_repo::PgLedgerStore;
pub use rate_repo::PgRateRepository;
pub use settings_repo::PgSettingsRepository;
