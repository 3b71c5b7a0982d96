//! Domain models for Tollgate
//!
//! This module contains all the core domain models used by the billing engine.

pub mod account;
pub mod call_record;
pub mod ledger;
pub mod rate;
pub mod session;

pub use account::{Account, AccountType};
pub use call_record::{BillingStatus, CallRecord, CallSettlement, CallStatus, SettleOutcome};
pub use ledger::{EntryType, LedgerEntry, LedgerRequest};
pub use rate::{Rate, RateTier};
pub use session::BillingSession;
