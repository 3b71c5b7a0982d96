//! Billing session model
//!
//! Ephemeral per-call state kept in the session store while a call is live.
//! Only the billing engine mutates it; `current_cost` and
//! `billable_duration` never decrease.

use crate::billing::IncrementConfig;
use crate::models::{AccountType, CallRecord};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Billing session entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSession {
    pub call_id: String,
    pub user_id: i64,
    pub destination: String,

    /// Account type at call start, used for the affordability rule
    pub account_type: AccountType,

    /// Resolved increment
    pub billing_config: IncrementConfig,

    /// Rate snapshot taken at call start
    pub rate_per_minute: Decimal,
    pub minimum_duration: i64,
    pub matched_prefix: String,

    /// Cost accrued so far
    pub current_cost: Decimal,

    /// Billable seconds accrued so far
    pub billable_duration: i64,

    /// Number of periodic evaluations performed
    pub periodic_check_count: u32,

    /// Advisory hold against the balance
    pub reserved_amount: Decimal,

    /// First tick that saw the balance fall short; cleared on recovery
    pub low_balance_since: Option<DateTime<Utc>>,

    /// Last failed hangup attempt, if any
    pub last_termination_attempt: Option<DateTime<Utc>>,

    pub start_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingSession {
    /// Elapsed talk time at `now`
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.start_time).num_seconds().max(0)
    }

    /// Record a new evaluation, never letting accrued values go backwards
    pub fn advance(&mut self, billable_duration: i64, cost: Decimal, now: DateTime<Utc>) {
        self.billable_duration = self.billable_duration.max(billable_duration);
        self.current_cost = self.current_cost.max(cost);
        self.reserved_amount = self.current_cost;
        self.periodic_check_count += 1;
        self.updated_at = now;
    }

    /// Seconds the balance has been short, if it is short
    pub fn low_balance_for(&self, now: DateTime<Utc>) -> Option<i64> {
        self.low_balance_since
            .map(|since| (now - since).num_seconds().max(0))
    }

    /// Check the session belongs to `record`
    pub fn matches(&self, record: &CallRecord) -> bool {
        self.call_id == record.call_id && self.user_id == record.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn session() -> BillingSession {
        let now = Utc::now();
        BillingSession {
            call_id: "c1".to_string(),
            user_id: 7,
            destination: "18005551234".to_string(),
            account_type: AccountType::Prepaid,
            billing_config: IncrementConfig::SIX_SECOND,
            rate_per_minute: dec!(0.05),
            minimum_duration: 0,
            matched_prefix: "1800".to_string(),
            current_cost: dec!(0.005),
            billable_duration: 6,
            periodic_check_count: 0,
            reserved_amount: dec!(0.005),
            low_balance_since: None,
            last_termination_attempt: None,
            start_time: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut s = session();
        let now = Utc::now();

        s.advance(66, dec!(0.055), now);
        assert_eq!(s.billable_duration, 66);
        assert_eq!(s.current_cost, dec!(0.055));
        assert_eq!(s.periodic_check_count, 1);

        // A stale evaluation cannot shrink the session
        s.advance(12, dec!(0.01), now);
        assert_eq!(s.billable_duration, 66);
        assert_eq!(s.current_cost, dec!(0.055));
        assert_eq!(s.reserved_amount, dec!(0.055));
        assert_eq!(s.periodic_check_count, 2);
    }

    #[test]
    fn test_low_balance_for() {
        let mut s = session();
        let now = Utc::now();
        assert_eq!(s.low_balance_for(now), None);

        s.low_balance_since = Some(now - Duration::seconds(45));
        assert_eq!(s.low_balance_for(now), Some(45));
    }

    #[test]
    fn test_session_serializes_for_cache() {
        let s = session();
        let json = serde_json::to_string(&s).unwrap();
        let back: BillingSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
