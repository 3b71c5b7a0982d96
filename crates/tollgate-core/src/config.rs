//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sessions: SessionConfig,
    pub freeswitch: FreeSwitchConfig,
    pub billing: BillingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_timeout() -> u64 {
    30
}

/// Which durable store backs call records, rates, accounts and settings
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply embedded migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Which store holds live billing sessions
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    Redis,
}

/// Billing session store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default)]
    pub backend: SessionBackend,

    /// Redis connection URL (redis backend only)
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Safety-net TTL for orphaned sessions
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// How long to wait for a per-call lock before giving up
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,
}

fn default_session_ttl() -> u64 {
    14400 // 4 hours
}

fn default_lock_timeout() -> u64 {
    5000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            redis_url: None,
            session_ttl_secs: default_session_ttl(),
            lock_timeout_ms: default_lock_timeout(),
        }
    }
}

/// FreeSWITCH ESL configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FreeSwitchConfig {
    /// List of FreeSWITCH servers
    #[serde(default)]
    pub servers: Vec<FreeSwitchServer>,

    /// Upper bound for one hangup request, connect included
    #[serde(default = "default_hangup_timeout")]
    pub hangup_timeout_secs: u64,

    /// Hangup cause passed to `uuid_kill`
    #[serde(default = "default_hangup_cause")]
    pub hangup_cause: String,
}

fn default_hangup_timeout() -> u64 {
    5
}

fn default_hangup_cause() -> String {
    "MANAGER_REQUEST".to_string()
}

impl Default for FreeSwitchConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            hangup_timeout_secs: default_hangup_timeout(),
            hangup_cause: default_hangup_cause(),
        }
    }
}

/// Individual FreeSWITCH server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FreeSwitchServer {
    /// Server hostname or IP
    pub host: String,

    /// ESL port
    #[serde(default = "default_fs_port")]
    pub port: u16,

    /// ESL password
    pub password: String,

    /// Server identifier
    pub id: Option<String>,
}

fn default_fs_port() -> u16 {
    8021
}

impl FreeSwitchServer {
    /// Identifier for logs, falling back to `host:port`
    pub fn label(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }
}

/// Billing-specific configuration
///
/// The first six fields are defaults for the operator settings stored in
/// `billing_settings`; the rest tune the engine itself.
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    #[serde(default = "default_true")]
    pub real_time_billing_enabled: bool,

    #[serde(default = "default_true")]
    pub auto_terminate_on_zero_balance: bool,

    #[serde(default)]
    pub grace_period_seconds: i64,

    /// `"I/S"` or a named preset
    #[serde(default = "default_billing_increment")]
    pub default_billing_increment: String,

    /// 2, 4 or 6
    #[serde(default = "default_billing_precision")]
    pub billing_precision: u32,

    /// up, down or nearest
    #[serde(default = "default_rounding_method")]
    pub rounding_method: String,

    /// Scheduler tick
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Calls evaluated in parallel per tick
    #[serde(default = "default_scheduler_concurrency")]
    pub scheduler_concurrency: usize,

    #[serde(default = "default_finalize_attempts")]
    pub finalize_max_attempts: u32,

    #[serde(default = "default_finalize_backoff")]
    pub finalize_retry_backoff_ms: u64,

    #[serde(default = "default_settings_cache_ttl")]
    pub settings_cache_ttl_secs: u64,

    #[serde(default = "default_rate_cache_ttl")]
    pub rate_cache_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_billing_increment() -> String {
    "6/6".to_string()
}

fn default_billing_precision() -> u32 {
    4
}

fn default_rounding_method() -> String {
    "up".to_string()
}

fn default_check_interval() -> u64 {
    10
}

fn default_scheduler_concurrency() -> usize {
    32
}

fn default_finalize_attempts() -> u32 {
    3
}

fn default_finalize_backoff() -> u64 {
    200
}

fn default_settings_cache_ttl() -> u64 {
    60
}

fn default_rate_cache_ttl() -> u64 {
    300
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            real_time_billing_enabled: true,
            auto_terminate_on_zero_balance: true,
            grace_period_seconds: 0,
            default_billing_increment: default_billing_increment(),
            billing_precision: default_billing_precision(),
            rounding_method: default_rounding_method(),
            check_interval_secs: default_check_interval(),
            scheduler_concurrency: default_scheduler_concurrency(),
            finalize_max_attempts: default_finalize_attempts(),
            finalize_retry_backoff_ms: default_finalize_backoff(),
            settings_cache_ttl_secs: default_settings_cache_ttl(),
            rate_cache_ttl_secs: default_rate_cache_ttl(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Level for tollgate crates when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Self::with_defaults(Config::builder())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with TOLLGATE_ prefix
            .add_source(
                Environment::with_prefix("TOLLGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("TOLLGATE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.timeout_secs", 30)?
            .set_default("database.backend", "postgres")?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("sessions.backend", "memory")?
            .set_default("sessions.session_ttl_secs", 14400)?
            .set_default("sessions.lock_timeout_ms", 5000)?
            .set_default("freeswitch.hangup_timeout_secs", 5)?
            .set_default("freeswitch.hangup_cause", "MANAGER_REQUEST")?
            .set_default("billing.real_time_billing_enabled", true)?
            .set_default("billing.auto_terminate_on_zero_balance", true)?
            .set_default("billing.grace_period_seconds", 0)?
            .set_default("billing.default_billing_increment", "6/6")?
            .set_default("billing.billing_precision", 4)?
            .set_default("billing.rounding_method", "up")?
            .set_default("billing.check_interval_secs", 10)?
            .set_default("billing.scheduler_concurrency", 32)?
            .set_default("billing.finalize_max_attempts", 3)?
            .set_default("billing.finalize_retry_backoff_ms", 200)?
            .set_default("billing.settings_cache_ttl_secs", 60)?
            .set_default("billing.rate_cache_ttl_secs", 300)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
