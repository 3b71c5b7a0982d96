//! Hangup over ESL
//!
//! The switch that carries a call is not known to the billing engine, so a
//! hangup is tried on each configured server in turn until one accepts it.

use crate::connection::EslConnection;
use async_trait::async_trait;
use std::time::Duration;
use tollgate_core::config::{FreeSwitchConfig, FreeSwitchServer};
use tollgate_core::traits::{CallControl, HangupResult};
use tollgate_core::{AppError, AppResult};
use tracing::{debug, info, instrument, warn};

/// `CallControl` backed by FreeSWITCH `uuid_kill`
pub struct EslCallControl {
    servers: Vec<FreeSwitchServer>,
    timeout: Duration,
    hangup_cause: String,
}

impl EslCallControl {
    pub fn new(servers: Vec<FreeSwitchServer>, timeout: Duration, hangup_cause: impl Into<String>) -> Self {
        Self {
            servers,
            timeout,
            hangup_cause: hangup_cause.into(),
        }
    }

    pub fn from_config(config: &FreeSwitchConfig) -> Self {
        Self::new(
            config.servers.clone(),
            Duration::from_secs(config.hangup_timeout_secs),
            config.hangup_cause.clone(),
        )
    }

    /// Ids go onto the ESL command line verbatim, so only ASCII
    /// alphanumerics and dashes are allowed
    fn is_valid_call_id(call_id: &str) -> bool {
        !call_id.is_empty()
            && call_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    }

    /// The `uuid_kill` command line for a call
    pub fn kill_command(&self, call_id: &str) -> String {
        format!("uuid_kill {} {}", call_id, self.hangup_cause)
    }

    async fn hangup_on(&self, server: &FreeSwitchServer, call_id: &str) -> AppResult<HangupResult> {
        let command = self.kill_command(call_id);

        let attempt = async {
            let mut conn = EslConnection::connect(server).await?;
            let reply = conn.api(&command).await?;
            conn.close().await;
            Ok::<_, AppError>(reply)
        };

        let reply = tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| {
                AppError::EslConnection(format!(
                    "{}: no answer within {:?}",
                    server.label(),
                    self.timeout
                ))
            })??;

        if reply.is_ok() {
            Ok(HangupResult::ok(reply.result_text().unwrap_or("+OK")))
        } else {
            let message = reply
                .error_message()
                .or_else(|| reply.result_text().map(str::to_string))
                .unwrap_or_else(|| "empty reply".to_string());
            Ok(HangupResult::failed(message))
        }
    }
}

#[async_trait]
impl CallControl for EslCallControl {
    #[instrument(skip(self))]
    async fn hangup(&self, call_id: &str) -> AppResult<HangupResult> {
        if !Self::is_valid_call_id(call_id) {
            warn!("Refusing to hang up a call with a malformed id");
            return Ok(HangupResult::failed("invalid call id"));
        }
        if self.servers.is_empty() {
            warn!("No FreeSWITCH servers configured, cannot hang up");
            return Ok(HangupResult::failed("no call-control servers configured"));
        }

        let mut refused: Option<HangupResult> = None;
        let mut last_error: Option<AppError> = None;

        for server in &self.servers {
            match self.hangup_on(server, call_id).await {
                Ok(result) if result.success => {
                    info!(server = %server.label(), "Call hung up");
                    return Ok(result);
                }
                Ok(result) => {
                    debug!(server = %server.label(), "Hangup refused: {}", result.message);
                    refused = Some(result);
                }
                Err(e) => {
                    warn!(server = %server.label(), "Hangup attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        // A server that answered is more informative than one that did not
        match (refused, last_error) {
            (Some(result), _) => Ok(result),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(HangupResult::failed("no server accepted the hangup")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_command() {
        let control = EslCallControl::new(Vec::new(), Duration::from_secs(1), "NORMAL_CLEARING");
        assert_eq!(
            control.kill_command("a1b2-c3"),
            "uuid_kill a1b2-c3 NORMAL_CLEARING"
        );
    }

    #[test]
    fn test_from_config() {
        let control = EslCallControl::from_config(&FreeSwitchConfig::default());
        assert_eq!(control.timeout, Duration::from_secs(5));
        assert_eq!(control.kill_command("x"), "uuid_kill x MANAGER_REQUEST");
    }

    #[test]
    fn test_no_servers_is_failed_hangup() {
        let control = EslCallControl::new(Vec::new(), Duration::from_secs(1), "MANAGER_REQUEST");
        let result = tokio_test::block_on(control.hangup("call-1")).unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "no call-control servers configured");
    }

    #[test]
    fn test_valid_call_ids() {
        assert!(EslCallControl::is_valid_call_id(
            "0b6f1a3e-2c4d-4e5f-8a9b-0c1d2e3f4a5b"
        ));
        assert!(EslCallControl::is_valid_call_id("call-1"));
        assert!(!EslCallControl::is_valid_call_id(""));
        assert!(!EslCallControl::is_valid_call_id("a b"));
        assert!(!EslCallControl::is_valid_call_id("a\n\nbgapi originate"));
        assert!(!EslCallControl::is_valid_call_id("a;b"));
    }

    #[test]
    fn test_malformed_call_id_is_failed_hangup() {
        let server = FreeSwitchServer {
            host: "127.0.0.1".to_string(),
            port: 1,
            password: "ClueCon".to_string(),
            id: None,
        };
        let control = EslCallControl::new(vec![server], Duration::from_secs(1), "MANAGER_REQUEST");
        let result = tokio_test::block_on(control.hangup("x\n\napi shutdown")).unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "invalid call id");
    }
}
