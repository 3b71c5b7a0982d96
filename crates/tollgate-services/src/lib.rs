//! Real-time billing services for Tollgate
//!
//! This crate holds the billing logic. Storage, the session store and call
//! control are injected as trait objects from tollgate-core, so the same
//! services run over PostgreSQL and Redis in production and over the
//! in-memory stores in tests.
//!
//! # Services
//!
//! - `RateResolver` - Longest-prefix rate lookup with tier fallback and caching
//! - `CachedSettingsProvider` - Operator settings with TTL and invalidation
//! - `BalanceLedger` - Manual credits, debits and history
//! - `SettlementService` - End-of-call cost and atomic debit, with retry
//! - `TerminationCoordinator` - Hangup, termination record, settlement
//! - `RealtimeBillingEngine` - Session start, periodic re-pricing, statistics
//! - `BillingScheduler` - Interval driver for the engine

pub mod engine;
pub mod ledger;
pub mod rate_resolver;
pub mod scheduler;
pub mod settings;
pub mod settlement;
pub mod termination;

pub use engine::{BatchReport, BillingStatistics, CounterSnapshot, RealtimeBillingEngine, TickOutcome};
pub use ledger::BalanceLedger;
pub use rate_resolver::{RateResolver, ResolvedRate};
pub use scheduler::BillingScheduler;
pub use settings::{CachedSettingsProvider, SettingsProvider};
pub use settlement::SettlementService;
pub use termination::{TerminationCoordinator, INSUFFICIENT_BALANCE};
