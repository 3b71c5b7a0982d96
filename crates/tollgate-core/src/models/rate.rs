//! Rate model
//!
//! Prices keyed by the leading digits of a dialed destination. Two tiers
//! exist: destination-specific rates win over country-level rates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which table a rate lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateTier {
    /// Call-specific rate keyed by an exact destination prefix
    #[default]
    Destination,
    /// Country-level rate keyed by the calling-code prefix
    Country,
}

impl fmt::Display for RateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateTier::Destination => write!(f, "destination"),
            RateTier::Country => write!(f, "country"),
        }
    }
}

/// Rate entity
///
/// Rates referenced by a billed call are never edited in place; the billing
/// session snapshots what it needs at call start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    /// Unique identifier (per tier)
    pub id: i64,

    /// Which tier this rate belongs to
    pub tier: RateTier,

    /// Destination prefix for matching (e.g. "1" for NANP, "1800" for US toll-free)
    pub destination_prefix: String,

    /// Human-readable destination name
    pub destination_name: Option<String>,

    /// Price per minute
    pub rate_per_minute: Decimal,

    /// Minimum billed duration in seconds
    pub minimum_duration: i64,

    /// `"I/S"` increment string or a named preset; None uses the operator default
    pub billing_increment: Option<String>,

    /// When this rate becomes effective
    pub effective_date: DateTime<Utc>,

    /// Inactive rates never match
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rate {
    /// Check if the rate can be used at `now`
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.effective_date <= now
    }

    /// Strip everything that is not a digit from a dialed number
    pub fn normalize_destination(destination: &str) -> String {
        destination.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    /// Generate all possible prefixes for a destination (for LPM lookup)
    ///
    /// Returns prefixes from longest to shortest.
    pub fn generate_prefixes(destination: &str) -> Vec<String> {
        let normalized = Self::normalize_destination(destination);
        (1..=normalized.len())
            .rev()
            .map(|i| normalized[..i].to_string())
            .collect()
    }
}

impl Default for Rate {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tier: RateTier::Destination,
            destination_prefix: String::new(),
            destination_name: None,
            rate_per_minute: Decimal::ZERO,
            minimum_duration: 0,
            billing_increment: None,
            effective_date: now,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_normalize_destination() {
        assert_eq!(Rate::normalize_destination("+1 (800) 555-1234"), "18005551234");
        assert_eq!(Rate::normalize_destination("00-44-20"), "004420");
        assert_eq!(Rate::normalize_destination("sip:abc"), "");
    }

    #[test]
    fn test_generate_prefixes() {
        let prefixes = Rate::generate_prefixes("+1800");
        assert_eq!(prefixes, vec!["1800", "180", "18", "1"]);
        assert!(Rate::generate_prefixes("--").is_empty());
    }

    #[test]
    fn test_is_effective_at() {
        let now = Utc::now();

        let rate = Rate {
            effective_date: now - Duration::hours(1),
            ..Default::default()
        };
        assert!(rate.is_effective_at(now));

        let future = Rate {
            effective_date: now + Duration::hours(1),
            ..Default::default()
        };
        assert!(!future.is_effective_at(now));

        let inactive = Rate {
            active: false,
            effective_date: now - Duration::hours(1),
            ..Default::default()
        };
        assert!(!inactive.is_effective_at(now));
    }
}
