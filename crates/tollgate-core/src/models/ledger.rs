//! Balance ledger entries
//!
//! Immutable history of every balance change. For each entry
//! `balance_after == balance_before ± amount`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Money added to the account (top-up, refund)
    Credit,
    /// Money taken from the account (call charge, manual debit)
    Debit,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Credit => write!(f, "credit"),
            EntryType::Debit => write!(f, "debit"),
        }
    }
}

impl EntryType {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "credit" => Some(EntryType::Credit),
            "debit" => Some(EntryType::Debit),
            _ => None,
        }
    }

    /// Apply an unsigned amount to a balance in this entry's direction
    #[inline]
    pub fn apply(self, balance: Decimal, amount: Decimal) -> Decimal {
        match self {
            EntryType::Credit => balance + amount,
            EntryType::Debit => balance - amount,
        }
    }
}

/// A requested balance change, before it is committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRequest {
    pub user_id: i64,
    pub entry_type: EntryType,
    /// Unsigned amount; the direction comes from `entry_type`
    pub amount: Decimal,
    pub description: String,
    pub call_id: Option<String>,
}

/// Ledger entry entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: i64,
    pub entry_type: EntryType,
    /// Unsigned amount
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    /// Call that produced this entry, for call charges
    pub call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build the entry for `request` applied on top of `balance_before`
    pub fn from_request(request: &LedgerRequest, balance_before: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: request.user_id,
            entry_type: request.entry_type,
            amount: request.amount,
            balance_before,
            balance_after: request.entry_type.apply(balance_before, request.amount),
            description: request.description.clone(),
            call_id: request.call_id.clone(),
            created_at: Utc::now(),
        }
    }

    /// Signed effect of this entry on the balance
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }

    /// Check the before/after invariant
    pub fn is_consistent(&self) -> bool {
        self.balance_after == self.entry_type.apply(self.balance_before, self.amount)
    }
}
