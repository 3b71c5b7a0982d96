//! Call termination coordinator
//!
//! Hangs up a call through the call-control collaborator, records the
//! termination, then settles what the call accrued. A hangup that fails or
//! times out leaves the call untouched; the next billing tick tries again.

use crate::settlement::SettlementService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::{
    models::CallRecord,
    traits::{CallControl, CallRecordRepository, SessionStore},
    AppError, AppResult,
};
use tracing::{debug, error, info, instrument, warn};

/// Reason recorded when a call runs out of funds
pub const INSUFFICIENT_BALANCE: &str = "insufficient_balance";

pub struct TerminationCoordinator {
    control: Arc<dyn CallControl>,
    calls: Arc<dyn CallRecordRepository>,
    sessions: Arc<dyn SessionStore>,
    settlement: Arc<SettlementService>,
    hangup_timeout: Duration,
    session_ttl_secs: u64,
}

impl TerminationCoordinator {
    pub fn new(
        control: Arc<dyn CallControl>,
        calls: Arc<dyn CallRecordRepository>,
        sessions: Arc<dyn SessionStore>,
        settlement: Arc<SettlementService>,
        hangup_timeout: Duration,
        session_ttl_secs: u64,
    ) -> Self {
        Self {
            control,
            calls,
            sessions,
            settlement,
            hangup_timeout,
            session_ttl_secs,
        }
    }

    /// Cut a call the customer can no longer pay for
    ///
    /// Returns false if the switch could not be reached or refused; the call
    /// stays active in that case.
    #[instrument(skip(self, record), fields(call_id = %record.call_id))]
    pub async fn terminate_for_insufficient_balance(
        &self,
        record: &CallRecord,
        reason: &str,
    ) -> AppResult<bool> {
        self.terminate(record, reason).await
    }

    /// Cut a call on operator request
    #[instrument(skip(self, record), fields(call_id = %record.call_id))]
    pub async fn emergency_terminate(&self, record: &CallRecord, reason: &str) -> AppResult<bool> {
        warn!(user_id = record.user_id, "Emergency termination: {}", reason);
        self.terminate(record, reason).await
    }

    async fn terminate(&self, record: &CallRecord, reason: &str) -> AppResult<bool> {
        if !record.status.is_active() {
            debug!(status = %record.status, "Call already ended, nothing to terminate");
            return Ok(false);
        }

        if !self.hangup(&record.call_id).await {
            self.note_failed_attempt(&record.call_id).await;
            return Ok(false);
        }

        let ended_at = Utc::now();
        if !self
            .calls
            .mark_terminated(&record.call_id, ended_at, reason)
            .await?
        {
            debug!("Call ended on its own before the termination was recorded");
        }

        let stored = self
            .calls
            .find_by_call_id(&record.call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(record.call_id.clone()))?;
        self.settlement.finalize_billing(&stored).await?;

        info!(user_id = record.user_id, "Call terminated: {}", reason);
        Ok(true)
    }

    /// One bounded hangup attempt; any failure is reported as false
    async fn hangup(&self, call_id: &str) -> bool {
        match tokio::time::timeout(self.hangup_timeout, self.control.hangup(call_id)).await {
            Ok(Ok(result)) if result.success => true,
            Ok(Ok(result)) => {
                warn!("Hangup refused: {}", result.message);
                false
            }
            Ok(Err(e)) => {
                warn!("Hangup failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Hangup timed out after {:?}", self.hangup_timeout);
                false
            }
        }
    }

    async fn note_failed_attempt(&self, call_id: &str) {
        let result: AppResult<()> = async {
            let _guard = self.sessions.lock(call_id).await?;
            if let Some(mut session) = self.sessions.get(call_id).await? {
                session.last_termination_attempt = Some(Utc::now());
                self.sessions.put(&session, self.session_ttl_secs).await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!("Failed to record termination attempt: {}", e);
        }
    }
}
