//! Cache key constants and builders for Tollgate
//!
//! Provides standardized key naming patterns for billing session state,
//! ensuring consistency between processes sharing one Redis.
//!
//! # Key Patterns
//!
//! - `billing_session:{call_id}` - Serialized billing session
//! - `billing_session_lock:{call_id}` - Per-call lock token
//! - `billing_sessions:active` - Set of call ids with a live session
//!
//! # Example
//!
//! ```
//! use tollgate_cache::keys;
//!
//! let session_key = keys::billing_session_key("abc-123");
//! assert_eq!(session_key, "billing_session:abc-123");
//! ```

/// Prefix for billing session data
///
/// Format: `billing_session:{call_id}`
pub const BILLING_SESSION_PREFIX: &str = "billing_session";

/// Prefix for per-call lock keys
///
/// Format: `billing_session_lock:{call_id}`
pub const SESSION_LOCK_PREFIX: &str = "billing_session_lock";

/// Set of call ids with a live session
pub const ACTIVE_SESSIONS_KEY: &str = "billing_sessions:active";

/// Lock keys expire on their own if the holder dies (30 seconds)
pub const SESSION_LOCK_TTL_MS: u64 = 30_000;

/// Build a cache key for a billing session by call id
///
/// # Example
///
/// ```
/// use tollgate_cache::keys::billing_session_key;
///
/// let key = billing_session_key("abc-123-def");
/// assert_eq!(key, "billing_session:abc-123-def");
/// ```
pub fn billing_session_key(call_id: &str) -> String {
    format!("{}:{}", BILLING_SESSION_PREFIX, call_id)
}

/// Build the lock key guarding one call's session
pub fn session_lock_key(call_id: &str) -> String {
    format!("{}:{}", SESSION_LOCK_PREFIX, call_id)
}
