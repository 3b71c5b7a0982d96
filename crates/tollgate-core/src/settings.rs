//! Operator billing settings
//!
//! Values an operator can change at runtime through the `billing_settings`
//! key/value table. Anything missing or malformed in the table falls back to
//! the configured default.

use crate::billing::{BillingPrecision, IncrementConfig, RoundingMethod};
use crate::config::BillingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Setting keys as stored in `billing_settings`
pub mod keys {
    pub const REAL_TIME_BILLING_ENABLED: &str = "real_time_billing_enabled";
    pub const AUTO_TERMINATE_ON_ZERO_BALANCE: &str = "auto_terminate_on_zero_balance";
    pub const GRACE_PERIOD_SECONDS: &str = "grace_period_seconds";
    pub const DEFAULT_BILLING_INCREMENT: &str = "default_billing_increment";
    pub const BILLING_PRECISION: &str = "billing_precision";
    pub const ROUNDING_METHOD: &str = "rounding_method";
}

/// Effective operator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSettings {
    pub real_time_billing_enabled: bool,
    pub auto_terminate_on_zero_balance: bool,
    pub grace_period_seconds: i64,
    pub default_billing_increment: IncrementConfig,
    pub billing_precision: BillingPrecision,
    pub rounding_method: RoundingMethod,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            real_time_billing_enabled: true,
            auto_terminate_on_zero_balance: true,
            grace_period_seconds: 0,
            default_billing_increment: IncrementConfig::SIX_SECOND,
            billing_precision: BillingPrecision::Four,
            rounding_method: RoundingMethod::Up,
        }
    }
}

impl BillingSettings {
    /// Settings taken from static configuration only
    pub fn from_defaults(config: &BillingConfig) -> Self {
        let fallback = Self::default();

        let default_billing_increment =
            parse_increment(&config.default_billing_increment).unwrap_or_else(|| {
                warn!(
                    value = %config.default_billing_increment,
                    "Configured default increment is not valid, using {}",
                    fallback.default_billing_increment
                );
                fallback.default_billing_increment
            });

        let billing_precision =
            BillingPrecision::try_from(config.billing_precision).unwrap_or_else(|e| {
                warn!("{}, using {}", e, fallback.billing_precision.decimal_places());
                fallback.billing_precision
            });

        let rounding_method = config.rounding_method.parse().unwrap_or_else(|e| {
            warn!("{}, using {}", e, fallback.rounding_method);
            fallback.rounding_method
        });

        Self {
            real_time_billing_enabled: config.real_time_billing_enabled,
            auto_terminate_on_zero_balance: config.auto_terminate_on_zero_balance,
            grace_period_seconds: config.grace_period_seconds.max(0),
            default_billing_increment,
            billing_precision,
            rounding_method,
        }
    }

    /// Apply stored key/value overrides on top of `self`
    ///
    /// Unknown keys are ignored. Malformed values keep the current value.
    pub fn with_overrides(mut self, values: &HashMap<String, String>) -> Self {
        for (key, raw) in values {
            let raw = raw.trim();
            match key.as_str() {
                keys::REAL_TIME_BILLING_ENABLED => {
                    apply(key, raw, parse_bool(raw), &mut self.real_time_billing_enabled)
                }
                keys::AUTO_TERMINATE_ON_ZERO_BALANCE => apply(
                    key,
                    raw,
                    parse_bool(raw),
                    &mut self.auto_terminate_on_zero_balance,
                ),
                keys::GRACE_PERIOD_SECONDS => apply(
                    key,
                    raw,
                    raw.parse::<i64>().ok().filter(|v| *v >= 0),
                    &mut self.grace_period_seconds,
                ),
                keys::DEFAULT_BILLING_INCREMENT => apply(
                    key,
                    raw,
                    parse_increment(raw),
                    &mut self.default_billing_increment,
                ),
                keys::BILLING_PRECISION => apply(
                    key,
                    raw,
                    raw.parse::<u32>()
                        .ok()
                        .and_then(|p| BillingPrecision::try_from(p).ok()),
                    &mut self.billing_precision,
                ),
                keys::ROUNDING_METHOD => {
                    apply(key, raw, raw.parse().ok(), &mut self.rounding_method)
                }
                _ => {}
            }
        }
        self
    }
}

fn apply<T>(key: &str, raw: &str, parsed: Option<T>, slot: &mut T) {
    match parsed {
        Some(value) => *slot = value,
        None => warn!(key, value = raw, "Ignoring malformed billing setting"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Preset names and allow-listed values, or free-form `"N/M"`
///
/// Free-form values are accepted but logged so an operator can spot typos.
fn parse_increment(raw: &str) -> Option<IncrementConfig> {
    let config = IncrementConfig::parse_or_preset(raw).ok()?;
    if !IncrementConfig::is_preset(raw) {
        warn!(increment = raw, "Default billing increment is not a standard preset");
    }
    Some(config)
}
