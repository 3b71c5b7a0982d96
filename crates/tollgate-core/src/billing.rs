//! Billing increment calculator
//!
//! Pure, deterministic arithmetic: elapsed call time becomes billable
//! seconds under the telecom "initial/subsequent" increment model, and
//! billable seconds become money at a per-minute rate.
//!
//! Rounding of duration is always up to the next increment boundary.

use crate::error::AppError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Increment strings accepted as operator defaults without further review
pub const INCREMENT_PRESETS: &[&str] = &["1/1", "6/6", "6/30", "6/60", "30/6", "30/30", "60/60"];

const SECONDS_PER_MINUTE: i64 = 60;

/// Billing increment: an `initial` block followed by `subsequent` blocks
///
/// `"6/60"` bills the first 6 seconds as one block, then every started
/// minute after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncrementConfig {
    /// Length of the first block in seconds
    pub initial: i64,
    /// Length of every following block in seconds
    pub subsequent: i64,
}

impl IncrementConfig {
    pub const PER_SECOND: Self = Self { initial: 1, subsequent: 1 };
    pub const SIX_SECOND: Self = Self { initial: 6, subsequent: 6 };
    pub const HALF_MINUTE: Self = Self { initial: 30, subsequent: 30 };
    pub const PER_MINUTE: Self = Self { initial: 60, subsequent: 60 };

    /// Build a config, rejecting empty blocks
    pub fn new(initial: i64, subsequent: i64) -> Result<Self, AppError> {
        if initial < 1 || subsequent < 1 {
            return Err(AppError::InvalidIncrementConfig(format!(
                "{}/{}",
                initial, subsequent
            )));
        }
        Ok(Self { initial, subsequent })
    }

    /// Look up a named preset (`per_second`, `six_second`, `half_minute`, `per_minute`)
    pub fn named(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "per_second" => Some(Self::PER_SECOND),
            "six_second" => Some(Self::SIX_SECOND),
            "half_minute" => Some(Self::HALF_MINUTE),
            "per_minute" => Some(Self::PER_MINUTE),
            _ => None,
        }
    }

    /// Parse either a named preset or a free-form `"I/S"` string
    pub fn parse_or_preset(raw: &str) -> Result<Self, AppError> {
        match Self::named(raw) {
            Some(config) => Ok(config),
            None => raw.parse(),
        }
    }

    /// Whether `raw` is on the preset allow-list (by value or by name)
    pub fn is_preset(raw: &str) -> bool {
        INCREMENT_PRESETS.contains(&raw.trim()) || Self::named(raw).is_some()
    }
}

impl Default for IncrementConfig {
    fn default() -> Self {
        Self::SIX_SECOND
    }
}

impl fmt::Display for IncrementConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.initial, self.subsequent)
    }
}

impl FromStr for IncrementConfig {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidIncrementConfig(s.to_string());

        let (initial, subsequent) = s.trim().split_once('/').ok_or_else(invalid)?;
        let initial: i64 = initial.trim().parse().map_err(|_| invalid())?;
        let subsequent: i64 = subsequent.trim().parse().map_err(|_| invalid())?;

        Self::new(initial, subsequent)
    }
}

/// Number of decimal places money is rounded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BillingPrecision {
    Two,
    #[default]
    Four,
    Six,
}

impl BillingPrecision {
    pub fn decimal_places(self) -> u32 {
        match self {
            BillingPrecision::Two => 2,
            BillingPrecision::Four => 4,
            BillingPrecision::Six => 6,
        }
    }
}

impl TryFrom<u32> for BillingPrecision {
    type Error = AppError;

    fn try_from(places: u32) -> Result<Self, Self::Error> {
        match places {
            2 => Ok(BillingPrecision::Two),
            4 => Ok(BillingPrecision::Four),
            6 => Ok(BillingPrecision::Six),
            other => Err(AppError::InvalidInput(format!(
                "billing precision must be 2, 4 or 6 (got {})",
                other
            ))),
        }
    }
}

impl From<BillingPrecision> for u32 {
    fn from(precision: BillingPrecision) -> Self {
        precision.decimal_places()
    }
}

/// How money is rounded to the configured precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMethod {
    #[default]
    Up,
    Down,
    Nearest,
}

impl RoundingMethod {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMethod::Up => RoundingStrategy::AwayFromZero,
            RoundingMethod::Down => RoundingStrategy::ToZero,
            RoundingMethod::Nearest => RoundingStrategy::MidpointAwayFromZero,
        }
    }
}

impl fmt::Display for RoundingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMethod::Up => write!(f, "up"),
            RoundingMethod::Down => write!(f, "down"),
            RoundingMethod::Nearest => write!(f, "nearest"),
        }
    }
}

impl FromStr for RoundingMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(RoundingMethod::Up),
            "down" => Ok(RoundingMethod::Down),
            "nearest" => Ok(RoundingMethod::Nearest),
            other => Err(AppError::InvalidInput(format!(
                "unknown rounding method: {}",
                other
            ))),
        }
    }
}

/// Billable seconds for `elapsed` seconds of talk time
///
/// Zero or negative elapsed time bills nothing. Otherwise the elapsed time is
/// raised to `min_duration`, billed as one initial block if it fits, and
/// rounded up to whole subsequent blocks beyond that.
pub fn billable_seconds(elapsed: i64, config: IncrementConfig, min_duration: i64) -> i64 {
    if elapsed <= 0 {
        return 0;
    }

    let effective = elapsed.max(min_duration);
    if effective <= config.initial {
        return config.initial;
    }

    let remainder = effective - config.initial;
    let blocks = (remainder + config.subsequent - 1) / config.subsequent;
    config.initial + blocks * config.subsequent
}

/// Cost of `billable_seconds` at `rate_per_minute`, rounded to `precision`
#[inline]
pub fn cost(
    billable_seconds: i64,
    rate_per_minute: Decimal,
    precision: BillingPrecision,
    rounding: RoundingMethod,
) -> Decimal {
    if billable_seconds <= 0 || rate_per_minute <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    // Multiply before dividing so exact results stay exact
    let raw = Decimal::from(billable_seconds) * rate_per_minute / Decimal::from(SECONDS_PER_MINUTE);
    raw.round_dp_with_strategy(precision.decimal_places(), rounding.strategy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_increment() {
        assert_eq!(
            "6/60".parse::<IncrementConfig>().unwrap(),
            IncrementConfig { initial: 6, subsequent: 60 }
        );
        assert_eq!(
            " 30 / 30 ".parse::<IncrementConfig>().unwrap(),
            IncrementConfig::HALF_MINUTE
        );
        assert!("6-6".parse::<IncrementConfig>().is_err());
        assert!("0/6".parse::<IncrementConfig>().is_err());
        assert!("6/".parse::<IncrementConfig>().is_err());
        assert!("abc".parse::<IncrementConfig>().is_err());
    }

    #[test]
    fn test_named_presets() {
        assert_eq!(
            IncrementConfig::parse_or_preset("per_minute").unwrap(),
            IncrementConfig::PER_MINUTE
        );
        assert_eq!(
            IncrementConfig::parse_or_preset("1/1").unwrap(),
            IncrementConfig::PER_SECOND
        );
        assert!(IncrementConfig::is_preset("6/60"));
        assert!(IncrementConfig::is_preset("six_second"));
        assert!(!IncrementConfig::is_preset("7/13"));
        assert_eq!(IncrementConfig::SIX_SECOND.to_string(), "6/6");
    }

    #[test]
    fn test_billable_zero_and_negative() {
        assert_eq!(billable_seconds(0, IncrementConfig::SIX_SECOND, 0), 0);
        assert_eq!(billable_seconds(-5, IncrementConfig::SIX_SECOND, 60), 0);
    }

    #[test]
    fn test_billable_six_six_65_seconds() {
        assert_eq!(billable_seconds(65, IncrementConfig::SIX_SECOND, 0), 66);
    }

    #[test]
    fn test_billable_initial_block() {
        let config = IncrementConfig::new(6, 60).unwrap();
        assert_eq!(billable_seconds(1, config, 0), 6);
        assert_eq!(billable_seconds(6, config, 0), 6);
        assert_eq!(billable_seconds(7, config, 0), 66);
        assert_eq!(billable_seconds(66, config, 0), 66);
        assert_eq!(billable_seconds(67, config, 0), 126);
    }

    #[test]
    fn test_billable_minimum_duration() {
        assert_eq!(billable_seconds(10, IncrementConfig::SIX_SECOND, 60), 60);
        assert_eq!(billable_seconds(10, IncrementConfig::PER_SECOND, 60), 60);
        assert_eq!(billable_seconds(10, IncrementConfig::PER_MINUTE, 60), 60);
        assert_eq!(billable_seconds(10, IncrementConfig::HALF_MINUTE, 60), 60);
        // Longer than the minimum: the minimum no longer matters
        assert_eq!(billable_seconds(61, IncrementConfig::PER_SECOND, 60), 61);
    }

    #[test]
    fn test_cost_scenario_six_six() {
        let billable = billable_seconds(65, IncrementConfig::SIX_SECOND, 0);
        let c = cost(billable, dec!(0.05), BillingPrecision::Four, RoundingMethod::Up);
        assert_eq!(c, dec!(0.055));
    }

    #[test]
    fn test_cost_rounding_methods() {
        // 66s at 0.05/min = 0.055
        assert_eq!(
            cost(66, dec!(0.05), BillingPrecision::Two, RoundingMethod::Up),
            dec!(0.06)
        );
        assert_eq!(
            cost(66, dec!(0.05), BillingPrecision::Two, RoundingMethod::Down),
            dec!(0.05)
        );
        assert_eq!(
            cost(66, dec!(0.05), BillingPrecision::Two, RoundingMethod::Nearest),
            dec!(0.06)
        );
        // 7s at 0.10/min = 0.011666...
        assert_eq!(
            cost(7, dec!(0.10), BillingPrecision::Six, RoundingMethod::Up),
            dec!(0.011667)
        );
        assert_eq!(
            cost(7, dec!(0.10), BillingPrecision::Six, RoundingMethod::Down),
            dec!(0.011666)
        );
    }

    #[test]
    fn test_cost_zero() {
        assert_eq!(
            cost(0, dec!(0.05), BillingPrecision::Four, RoundingMethod::Up),
            Decimal::ZERO
        );
        assert_eq!(
            cost(60, Decimal::ZERO, BillingPrecision::Four, RoundingMethod::Up),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_precision_conversion() {
        assert_eq!(BillingPrecision::try_from(2).unwrap(), BillingPrecision::Two);
        assert_eq!(BillingPrecision::try_from(6).unwrap().decimal_places(), 6);
        assert!(BillingPrecision::try_from(3).is_err());
        assert_eq!("Nearest".parse::<RoundingMethod>().unwrap(), RoundingMethod::Nearest);
        assert!("ceil".parse::<RoundingMethod>().is_err());
    }

    proptest! {
        #[test]
        fn prop_billable_rounds_up_to_block_boundary(
            elapsed in 1i64..100_000,
            initial in 1i64..600,
            subsequent in 1i64..600,
        ) {
            let config = IncrementConfig::new(initial, subsequent).unwrap();
            let billed = billable_seconds(elapsed, config, 0);

            prop_assert!(billed >= elapsed);
            prop_assert!(billed >= initial);
            prop_assert_eq!((billed - initial) % subsequent, 0);
            // Never more than one block beyond what was used
            prop_assert!(billed - elapsed < initial.max(subsequent));
        }

        #[test]
        fn prop_billable_is_monotonic(
            elapsed in 0i64..50_000,
            step in 0i64..500,
            initial in 1i64..120,
            subsequent in 1i64..120,
            min_duration in 0i64..300,
        ) {
            let config = IncrementConfig::new(initial, subsequent).unwrap();
            let earlier = billable_seconds(elapsed, config, min_duration);
            let later = billable_seconds(elapsed + step, config, min_duration);
            prop_assert!(later >= earlier);
        }

        #[test]
        fn prop_cost_is_monotonic(
            billable in 0i64..100_000,
            step in 0i64..1_000,
            cents in 0i64..10_000,
        ) {
            let rate = Decimal::new(cents, 3);
            let earlier = cost(billable, rate, BillingPrecision::Four, RoundingMethod::Up);
            let later = cost(billable + step, rate, BillingPrecision::Four, RoundingMethod::Up);
            prop_assert!(later >= earlier);
        }
    }
}
