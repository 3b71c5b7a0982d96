//! Call record model
//!
//! The durable record of one call attempt. `end_time`, `status`, `cost` and
//! `billing_status` are written exactly once when the call ends.

use crate::models::{AccountType, LedgerEntry};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call progress
///
/// `initiated → in_progress → {completed, terminated, failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Initiated,
    InProgress,
    Completed,
    Terminated,
    Failed,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Initiated => write!(f, "initiated"),
            CallStatus::InProgress => write!(f, "in_progress"),
            CallStatus::Completed => write!(f, "completed"),
            CallStatus::Terminated => write!(f, "terminated"),
            CallStatus::Failed => write!(f, "failed"),
        }
    }
}

impl CallStatus {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initiated" => Some(CallStatus::Initiated),
            "in_progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "terminated" => Some(CallStatus::Terminated),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }

    /// Check if the call can still accrue cost
    pub fn is_active(&self) -> bool {
        matches!(self, CallStatus::Initiated | CallStatus::InProgress)
    }

    /// Check if the call has ended
    pub fn is_final(&self) -> bool {
        !self.is_active()
    }
}

/// Settlement progress
///
/// `pending → calculated | paid | unpaid | terminated | error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    #[default]
    Pending,
    Calculated,
    Paid,
    Unpaid,
    Terminated,
    Error,
}

impl fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingStatus::Pending => write!(f, "pending"),
            BillingStatus::Calculated => write!(f, "calculated"),
            BillingStatus::Paid => write!(f, "paid"),
            BillingStatus::Unpaid => write!(f, "unpaid"),
            BillingStatus::Terminated => write!(f, "terminated"),
            BillingStatus::Error => write!(f, "error"),
        }
    }
}

impl BillingStatus {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BillingStatus::Pending),
            "calculated" => Some(BillingStatus::Calculated),
            "paid" => Some(BillingStatus::Paid),
            "unpaid" => Some(BillingStatus::Unpaid),
            "terminated" => Some(BillingStatus::Terminated),
            "error" => Some(BillingStatus::Error),
            _ => None,
        }
    }

    /// Status a call settles into
    ///
    /// A call cut for insufficient balance stays `terminated`. Free calls are
    /// `paid`. Otherwise prepaid calls are `paid` only when the balance
    /// before the debit covered the cost; postpaid calls are `unpaid`.
    pub fn for_settlement(
        current: BillingStatus,
        account_type: AccountType,
        balance_before: Decimal,
        cost: Decimal,
    ) -> BillingStatus {
        if current == BillingStatus::Terminated {
            return BillingStatus::Terminated;
        }
        if cost.is_zero() {
            return BillingStatus::Paid;
        }
        match account_type {
            AccountType::Prepaid if balance_before >= cost => BillingStatus::Paid,
            _ => BillingStatus::Unpaid,
        }
    }
}

/// Call record entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unique call identifier (from the switch)
    pub call_id: String,

    /// Customer that pays for the call
    pub user_id: i64,

    /// Dialed destination
    pub destination: String,

    /// Answer time; billing starts here
    pub start_time: DateTime<Utc>,

    /// Set once when the call ends
    pub end_time: Option<DateTime<Utc>>,

    pub status: CallStatus,

    pub billing_status: BillingStatus,

    /// Set once by settlement
    pub cost: Option<Decimal>,

    /// Seconds from start to end
    pub actual_duration: Option<i64>,

    /// Seconds after increment rounding
    pub billable_duration: Option<i64>,

    /// Why the call was cut, for terminated calls
    pub termination_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    /// New call in `initiated` state
    pub fn new(call_id: impl Into<String>, user_id: i64, destination: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.into(),
            user_id,
            destination: destination.into(),
            start_time: now,
            end_time: None,
            status: CallStatus::Initiated,
            billing_status: BillingStatus::Pending,
            cost: None,
            actual_duration: None,
            billable_duration: None,
            termination_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if settlement already happened
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.cost.is_some()
    }

    /// Elapsed seconds from start to `end_time`, or to `now` for live calls
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).num_seconds().max(0)
    }
}

/// Everything settlement writes for one call, applied atomically with the debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSettlement {
    pub call_id: String,
    pub cost: Decimal,
    pub actual_duration: i64,
    pub billable_duration: i64,
    /// End time to stamp when the record has none yet
    pub end_time: DateTime<Utc>,
    /// Ledger description for the debit
    pub description: String,
}

/// Result of a settlement attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// Debit and call record written in one transaction
    Settled {
        entry: LedgerEntry,
        billing_status: BillingStatus,
    },
    /// The call already had a cost; nothing was written
    AlreadySettled,
}
