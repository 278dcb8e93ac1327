//! Table health vocabulary: freshness classes and diagnosis severity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Severity of a suspicious upstream table
///
/// Orders by urgency: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Ranking key (critical = 0, warning = 1, info = 2)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Warning => 1,
            Self::Info => 2,
        }
    }

    /// Raise severity to at least `to`; never lowers it
    #[must_use]
    pub fn escalate(self, to: Severity) -> Severity {
        if to.rank() < self.rank() {
            to
        } else {
            self
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Recency of a table's last modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Recent,
    Stale,
}

/// Hour boundaries used to classify freshness
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreshnessThresholds {
    /// Younger than this is `fresh`
    pub fresh_hours: f64,
    /// Younger than this (and not fresh) is `recent`, otherwise `stale`
    pub stale_hours: f64,
}

impl Default for FreshnessThresholds {
    fn default() -> Self {
        Self {
            fresh_hours: 24.0,
            stale_hours: 168.0,
        }
    }
}

impl Freshness {
    /// Classify by age in hours
    pub fn from_age_hours(hours: f64, thresholds: &FreshnessThresholds) -> Self {
        if hours < thresholds.fresh_hours {
            Self::Fresh
        } else if hours < thresholds.stale_hours {
            Self::Recent
        } else {
            Self::Stale
        }
    }

    /// Classify a last-modified timestamp relative to `now`
    pub fn classify(
        modified_at: DateTime<Utc>,
        now: DateTime<Utc>,
        thresholds: &FreshnessThresholds,
    ) -> Self {
        Self::from_age_hours(age_hours(modified_at, now), thresholds)
    }
}

/// Fractional hours elapsed between `since` and `now`
pub fn age_hours(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - since).num_seconds() as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn critical_sorts_first() {
        let mut severities = vec![Severity::Info, Severity::Critical, Severity::Warning];
        severities.sort();
        assert_eq!(severities, vec![Severity::Critical, Severity::Warning, Severity::Info]);
    }

    #[test]
    fn escalation_is_monotonic() {
        let all = [Severity::Critical, Severity::Warning, Severity::Info];
        for start in all {
            for step in all {
                let next = start.escalate(step);
                assert!(next.rank() <= start.rank(), "{:?} -> {:?}", start, step);
                assert!(next.rank() <= step.rank());
            }
        }
        assert_eq!(Severity::Critical.escalate(Severity::Info), Severity::Critical);
        assert_eq!(Severity::Info.escalate(Severity::Warning), Severity::Warning);
    }

    #[test]
    fn freshness_boundaries() {
        let t = FreshnessThresholds::default();
        assert_eq!(Freshness::from_age_hours(0.5, &t), Freshness::Fresh);
        assert_eq!(Freshness::from_age_hours(24.0, &t), Freshness::Recent);
        assert_eq!(Freshness::from_age_hours(167.9, &t), Freshness::Recent);
        assert_eq!(Freshness::from_age_hours(168.0, &t), Freshness::Stale);
    }

    #[test]
    fn classify_uses_timestamps() {
        let now = Utc::now();
        let t = FreshnessThresholds::default();
        assert_eq!(Freshness::classify(now - Duration::hours(2), now, &t), Freshness::Fresh);
        assert_eq!(Freshness::classify(now - Duration::days(2), now, &t), Freshness::Recent);
        assert_eq!(Freshness::classify(now - Duration::days(30), now, &t), Freshness::Stale);
    }
}
