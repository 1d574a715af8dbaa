//! Chain members
//!
//! A member is created on a successful claim and never hard-deleted. Only
//! `status`, `active_child_position`, `strike_count` and the removal metadata
//! are mutable; `position` and `parent_position` are historical truth and stay
//! untouched even after the parent is removed.

use crate::identifiers::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Member status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// Origin of the chain, immune to removal
    Seed,
    /// Live member
    Active,
    /// Soft-removed member
    Removed,
}

impl MemberStatus {
    /// Whether the member still participates in the chain
    pub fn is_live(self) -> bool {
        !matches!(self, MemberStatus::Removed)
    }

    /// Stable string form
    pub fn as_str(self) -> &'static str {
        match self {
            MemberStatus::Seed => "seed",
            MemberStatus::Active => "active",
            MemberStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a member was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalReason {
    /// The member let `max_attempts` of their own tickets expire
    WastedTickets,
    /// `max_attempts` of the member's invitees were removed
    WastedChildren,
    /// Removed by an operator
    Administrative,
}

impl RemovalReason {
    /// Stable string form
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalReason::WastedTickets => "WASTED_TICKETS",
            RemovalReason::WastedChildren => "WASTED_CHILDREN",
            RemovalReason::Administrative => "ADMINISTRATIVE",
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Immutable chain position
    pub position: Position,
    /// Display name chosen at claim time
    pub display_name: String,
    /// Member whose ticket was claimed; `None` only for the seed
    pub parent_position: Option<Position>,
    /// Current live invitee, if any.
    ///
    /// May transiently point at a child that has since been removed; readers
    /// check the child's invitation record instead of trusting the pointer.
    pub active_child_position: Option<Position>,
    /// Current status
    pub status: MemberStatus,
    /// Tickets this member let expire
    pub strike_count: u32,
    /// Set when the member is removed
    pub removal_reason: Option<RemovalReason>,
    /// Set when the member is removed
    pub removed_at: Option<DateTime<Utc>>,
    /// When the member joined
    pub joined_at: DateTime<Utc>,
}

impl Member {
    /// Create the seed member
    pub fn seed(display_name: impl Into<String>, joined_at: DateTime<Utc>) -> Self {
        Self {
            position: Position::SEED,
            display_name: display_name.into(),
            parent_position: None,
            active_child_position: None,
            status: MemberStatus::Seed,
            strike_count: 0,
            removal_reason: None,
            removed_at: None,
            joined_at,
        }
    }

    /// Create a member who joined by claiming a ticket issued by `parent`
    pub fn joined(
        position: Position,
        parent: Position,
        display_name: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            position,
            display_name: display_name.into(),
            parent_position: Some(parent),
            active_child_position: None,
            status: MemberStatus::Active,
            strike_count: 0,
            removal_reason: None,
            removed_at: None,
            joined_at,
        }
    }

    /// Whether this member is the seed
    pub fn is_seed(&self) -> bool {
        self.status == MemberStatus::Seed
    }

    /// Whether this member has been removed
    pub fn is_removed(&self) -> bool {
        self.status == MemberStatus::Removed
    }

    /// Whether this member still participates in the chain
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

/// Information supplied by a newcomer when claiming a ticket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewcomerInfo {
    /// Requested display name
    pub display_name: Option<String>,
}

impl NewcomerInfo {
    /// Newcomer with a chosen display name
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
        }
    }

    /// Resolve the display name, falling back to `Anonymous #<position>`
    pub fn display_name_for(&self, position: Position) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Anonymous #{}", position.value()),
        }
    }
}
