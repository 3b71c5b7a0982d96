//! API layer for Tollgate
//!
//! HTTP handlers that expose the real-time billing engine: starting and
//! settling calls, forced termination, batch processing, statistics and
//! account balances.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::ApiResponse;
pub use handlers::{configure_accounts, configure_billing, configure_routes};
pub use state::AppState;
