//! Account DTOs
//!
//! Request and response types for balance and ledger endpoints.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Balance top-up request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TopupRequest {
    /// Amount to add to balance (must be positive, checked by the ledger)
    pub amount: Decimal,

    /// Optional reason for the topup
    #[validate(length(max = 255))]
    pub reason: Option<String>,
}

impl TopupRequest {
    /// Ledger description for the credit
    pub fn description(&self) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| "Balance top-up".to_string())
    }
}

/// Ledger history query
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Current balance
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub user_id: i64,
    pub balance: Decimal,
}
