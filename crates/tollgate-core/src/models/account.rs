//! Account model
//!
//! The customer entity that owns a balance. Balances only change through
//! ledger entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Prepaid account - calls are cut when the balance runs out
    #[default]
    Prepaid,
    /// Postpaid account - can use credit up to limit
    Postpaid,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Prepaid => write!(f, "prepaid"),
            AccountType::Postpaid => write!(f, "postpaid"),
        }
    }
}

impl AccountType {
    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "prepaid" => Some(AccountType::Prepaid),
            "postpaid" => Some(AccountType::Postpaid),
            _ => None,
        }
    }
}

/// Account entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Customer identifier (the `user_id` of call records)
    pub id: i64,

    /// Customer name
    pub name: Option<String>,

    /// Account billing type
    pub account_type: AccountType,

    /// Current balance (can be negative for postpaid)
    pub balance: Decimal,

    /// Credit limit for postpaid accounts
    pub credit_limit: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Get available balance for affordability checks
    ///
    /// For prepaid: current balance
    /// For postpaid: balance + credit_limit
    #[inline]
    pub fn available_balance(&self) -> Decimal {
        match self.account_type {
            AccountType::Prepaid => self.balance,
            AccountType::Postpaid => self.balance + self.credit_limit,
        }
    }
}

impl Default for Account {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: None,
            account_type: AccountType::Prepaid,
            balance: Decimal::ZERO,
            credit_limit: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_prepaid_available_balance() {
        let account = Account {
            account_type: AccountType::Prepaid,
            balance: dec!(100.00),
            credit_limit: dec!(50.00), // Ignored for prepaid
            ..Default::default()
        };

        assert_eq!(account.available_balance(), dec!(100.00));
    }

    #[test]
    fn test_postpaid_available_balance() {
        let account = Account {
            account_type: AccountType::Postpaid,
            balance: dec!(-50.00),
            credit_limit: dec!(100.00),
            ..Default::default()
        };

        assert_eq!(account.available_balance(), dec!(50.00));
    }

    #[test]
    fn test_account_type_parse() {
        assert_eq!(AccountType::parse("POSTPAID"), Some(AccountType::Postpaid));
        assert_eq!(AccountType::parse("prepaid"), Some(AccountType::Prepaid));
        assert_eq!(AccountType::parse("credit"), None);
    }
}
