//! Billing DTOs
//!
//! Request and response types for the real-time billing endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tollgate_core::models::{BillingStatus, CallRecord, CallStatus};
use tollgate_core::AppError;
use validator::Validate;

/// Call end notification
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct FinalizeRequest {
    /// Final call status (completed, terminated or failed)
    pub status: Option<String>,

    /// When the call ended; defaults to now
    pub end_time: Option<DateTime<Utc>>,
}

impl FinalizeRequest {
    /// Parsed final status, if one was given
    pub fn final_status(&self) -> Result<Option<CallStatus>, AppError> {
        let Some(raw) = self.status.as_deref() else {
            return Ok(None);
        };

        match CallStatus::parse(raw) {
            Some(status) if status.is_final() => Ok(Some(status)),
            Some(status) => Err(AppError::Validation(format!(
                "'{}' is not a final call status",
                status
            ))),
            None => Err(AppError::Validation(format!("Unknown call status '{}'", raw))),
        }
    }
}

/// Termination request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TerminateRequest {
    /// Recorded as the call's termination reason
    #[serde(default = "default_reason")]
    #[validate(length(min = 1, max = 100, message = "Reason must be 1-100 characters"))]
    pub reason: String,

    /// Skip the grace period and the auto-terminate setting
    #[serde(default)]
    pub emergency: bool,
}

fn default_reason() -> String {
    "operator_request".to_string()
}

/// Start result
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub call_id: String,
    /// False when the call is billed at the end only
    pub started: bool,
}

/// Termination result
#[derive(Debug, Clone, Serialize)]
pub struct TerminateResponse {
    pub call_id: String,
    pub terminated: bool,
    pub emergency: bool,
}

/// Settlement result
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeResponse {
    pub call_id: String,
    pub settled: bool,
    pub status: CallStatus,
    pub billing_status: BillingStatus,
    pub cost: Option<Decimal>,
    pub actual_duration: Option<i64>,
    pub billable_duration: Option<i64>,
}

impl FinalizeResponse {
    pub fn new(record: CallRecord, settled: bool) -> Self {
        Self {
            call_id: record.call_id,
            settled,
            status: record.status,
            billing_status: record.billing_status,
            cost: record.cost,
            actual_duration: record.actual_duration,
            billable_duration: record.billable_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_status_parsing() {
        let req = FinalizeRequest::default();
        assert_eq!(req.final_status().unwrap(), None);

        let req = FinalizeRequest {
            status: Some("completed".to_string()),
            ..Default::default()
        };
        assert_eq!(req.final_status().unwrap(), Some(CallStatus::Completed));

        let req = FinalizeRequest {
            status: Some("in_progress".to_string()),
            ..Default::default()
        };
        assert!(matches!(req.final_status(), Err(AppError::Validation(_))));

        let req = FinalizeRequest {
            status: Some("hungup".to_string()),
            ..Default::default()
        };
        assert!(req.final_status().is_err());
    }

    #[test]
    fn test_terminate_request_defaults() {
        let req: TerminateRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.reason, "operator_request");
        assert!(!req.emergency);
        assert!(req.validate().is_ok());

        let req: TerminateRequest =
            serde_json::from_str(r#"{"reason": "", "emergency": true}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
