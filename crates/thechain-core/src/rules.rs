//! Rule parameters and versioned rule provider
//!
//! The engine reads `ticket_duration_hours` and `max_attempts` through a
//! `RuleProvider` at the moment each operation runs. Rule changes are
//! published as versions with an `effective_from` time and only take effect
//! once applied, so a rule change never retroactively alters tickets that were
//! already issued.

use crate::errors::{ChainError, ChainResult};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tunable chain rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainRule {
    /// Lifetime of an issued ticket
    pub ticket_duration_hours: u32,
    /// Strikes (own or invitee) that trigger removal
    pub max_attempts: u32,
}

impl Default for ChainRule {
    fn default() -> Self {
        Self {
            ticket_duration_hours: 24,
            max_attempts: 3,
        }
    }
}

impl ChainRule {
    /// Ticket lifetime as a duration
    pub fn ticket_duration(&self) -> Duration {
        Duration::hours(i64::from(self.ticket_duration_hours))
    }

    /// Reject rules that would make the chain unusable
    pub fn validate(&self) -> ChainResult<()> {
        if self.ticket_duration_hours == 0 {
            return Err(ChainError::invalid("ticket_duration_hours must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(ChainError::invalid("max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Attempt number for an owner with `strike_count` expired tickets
    pub fn attempt_number(&self, strike_count: u32) -> u32 {
        strike_count.saturating_add(1).clamp(1, self.max_attempts.max(1))
    }
}

/// A published rule version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVersion {
    /// Monotonic version number
    pub version: u32,
    /// Parameters
    pub rule: ChainRule,
    /// When the version starts to govern operations
    pub effective_from: DateTime<Utc>,
    /// When an operator applied it; unapplied versions are ignored
    pub applied_at: Option<DateTime<Utc>>,
}

/// Source of the rule in force at a point in time
pub trait RuleProvider: Send + Sync {
    /// Rule in force at `now`, if any version is
    fn current_rule(&self, now: DateTime<Utc>) -> Option<ChainRule>;

    /// Rule in force at `now`, falling back to `fallback`
    fn effective_rule(&self, now: DateTime<Utc>, fallback: ChainRule) -> ChainRule {
        self.current_rule(now).unwrap_or(fallback)
    }
}

/// Constant rule provider
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRule(pub ChainRule);

impl RuleProvider for FixedRule {
    fn current_rule(&self, _now: DateTime<Utc>) -> Option<ChainRule> {
        Some(self.0)
    }
}

/// Versioned rule book
#[derive(Debug, Default)]
pub struct RuleBook {
    versions: RwLock<BTreeMap<u32, RuleVersion>>,
}

impl RuleBook {
    /// Empty rule book
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new, not yet applied, version. Returns its version number.
    pub fn publish(&self, rule: ChainRule, effective_from: DateTime<Utc>) -> ChainResult<u32> {
        rule.validate()?;
        let mut versions = self.versions.write();
        let version = versions
            .keys()
            .next_back()
            .map_or(1, |latest| latest.saturating_add(1));
        versions.insert(
            version,
            RuleVersion {
                version,
                rule,
                effective_from,
                applied_at: None,
            },
        );
        tracing::info!(version, %effective_from, "Rule version published");
        Ok(version)
    }

    /// Apply a published version
    pub fn apply(&self, version: u32, at: DateTime<Utc>) -> ChainResult<()> {
        let mut versions = self.versions.write();
        let entry = versions
            .get_mut(&version)
            .ok_or_else(|| ChainError::invalid(format!("unknown rule version {version}")))?;
        if entry.applied_at.is_none() {
            entry.applied_at = Some(at);
            tracing::info!(version, "Rule version applied");
        }
        Ok(())
    }

    /// Highest applied version with `effective_from <= now`
    pub fn current(&self, now: DateTime<Utc>) -> Option<RuleVersion> {
        self.versions
            .read()
            .values()
            .rev()
            .find(|v| v.applied_at.is_some() && v.effective_from <= now)
            .cloned()
    }
}

impl RuleProvider for RuleBook {
    fn current_rule(&self, now: DateTime<Utc>) -> Option<ChainRule> {
        self.current(now).map(|v| v.rule)
    }
}
