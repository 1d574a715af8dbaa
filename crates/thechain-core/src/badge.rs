//! Badge awards

use crate::identifiers::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Badge types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    /// Lost an invitee and then successfully invited again
    ChainSavior,
}

impl BadgeKind {
    /// Stable string form
    pub fn as_str(self) -> &'static str {
        match self {
            BadgeKind::ChainSavior => "chain_savior",
        }
    }
}

impl fmt::Display for BadgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A badge held by a member. At most one award per `(position, badge)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeAward {
    /// Holder
    pub position: Position,
    /// Badge type
    pub badge: BadgeKind,
    /// Award time
    pub awarded_at: DateTime<Utc>,
    /// Removed invitees at the time of the award
    pub removed_invitees: u32,
}
