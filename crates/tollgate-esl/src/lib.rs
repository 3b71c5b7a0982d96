//! FreeSWITCH Event Socket Layer (ESL) call control for Tollgate
//!
//! The billing engine only ever needs one thing from the switch: cut a call
//! that can no longer be paid for. This crate implements the `CallControl`
//! trait by opening an inbound ESL connection, authenticating, and issuing
//! `api uuid_kill <call_id> <cause>`.
//!
//! # Architecture
//!
//! ```text
//! TerminationCoordinator
//!         |
//!         v
//!  EslCallControl (tries each server, bounded by a timeout)
//!         |
//!         v
//!  EslConnection (TCP, auth, api)
//!         |
//!         v
//!    EslEvent (Parser)
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use tollgate_esl::EslCallControl;
//! use tollgate_core::config::FreeSwitchConfig;
//! use tollgate_core::traits::CallControl;
//!
//! let control = EslCallControl::from_config(&FreeSwitchConfig::default());
//! let result = control.hangup("0b9c6e7a-4f2d-4c1e-9f51-1f0f8f1b2a3c").await?;
//! ```

pub mod connection;
pub mod control;
pub mod event;

pub use connection::EslConnection;
pub use control::EslCallControl;
pub use event::EslEvent;

/// ESL protocol constants
pub mod constants {
    /// Default ESL password (FreeSWITCH default)
    pub const DEFAULT_PASSWORD: &str = "ClueCon";

    /// Authentication command
    pub const AUTH_COMMAND: &str = "auth";

    /// API command prefix
    pub const API_COMMAND: &str = "api";

    /// Close the session
    pub const EXIT_COMMAND: &str = "exit";

    /// Command/Reply content type
    pub const CONTENT_TYPE_REPLY: &str = "command/reply";

    /// Synchronous api response content type
    pub const CONTENT_TYPE_API: &str = "api/response";

    /// Event plain content type
    pub const CONTENT_TYPE_EVENT: &str = "text/event-plain";

    /// Sent by the server right before it closes the socket
    pub const CONTENT_TYPE_DISCONNECT: &str = "text/disconnect-notice";

    /// Authentication request content type
    pub const CONTENT_TYPE_AUTH: &str = "auth/request";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(constants::DEFAULT_PASSWORD, "ClueCon");
        assert_eq!(constants::AUTH_COMMAND, "auth");
        assert_ne!(constants::CONTENT_TYPE_API, constants::CONTENT_TYPE_REPLY);
    }
}
