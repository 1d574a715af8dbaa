//! Tickets and their signed payloads
//!
//! A ticket moves only forward: `Active -> Used | Expired | Cancelled`.
//! `claimed_by_position` is set if and only if the ticket is `Used`.

use crate::errors::{ChainError, ChainResult};
use crate::identifiers::{Position, TicketId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Issued and redeemable
    Active,
    /// Redeemed by a newcomer
    Used,
    /// Deadline passed without redemption
    Expired,
    /// Withdrawn administratively
    Cancelled,
}

impl TicketStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        !matches!(self, TicketStatus::Active)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (
                TicketStatus::Active,
                TicketStatus::Used | TicketStatus::Expired | TicketStatus::Cancelled
            )
        )
    }

    /// Stable string form
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Active => "ACTIVE",
            TicketStatus::Used => "USED",
            TicketStatus::Expired => "EXPIRED",
            TicketStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured form of a ticket payload.
///
/// Encoded as `ownerPosition|issuedAtMillis|expiresAtMillis|nonce`. The nonce
/// is fresh per ticket so two tickets from the same owner never share a
/// payload, and the signature covers the whole string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPayload {
    /// Issuing member
    pub owner: Position,
    /// Issue time (millisecond precision)
    pub issued_at: DateTime<Utc>,
    /// Deadline (millisecond precision)
    pub expires_at: DateTime<Utc>,
    /// Per-ticket random nonce
    pub nonce: String,
}

impl TicketPayload {
    const SEPARATOR: char = '|';

    /// Build a payload
    pub fn new(
        owner: Position,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            issued_at,
            expires_at,
            nonce: nonce.into(),
        }
    }

    /// Canonical string form that gets signed
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.owner.value(),
            self.issued_at.timestamp_millis(),
            self.expires_at.timestamp_millis(),
            self.nonce
        )
    }

    /// Parse the canonical string form
    pub fn decode(encoded: &str) -> ChainResult<Self> {
        let mut parts = encoded.splitn(4, Self::SEPARATOR);
        let (Some(owner), Some(issued), Some(expires), Some(nonce)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ChainError::invalid("ticket payload must have four fields"));
        };

        let owner = owner
            .parse::<u64>()
            .map_err(|e| ChainError::invalid(format!("bad owner position: {e}")))?;
        let issued_at = parse_millis(issued)?;
        let expires_at = parse_millis(expires)?;
        if nonce.is_empty() {
            return Err(ChainError::invalid("ticket payload nonce is empty"));
        }

        Ok(Self::new(Position::new(owner), issued_at, expires_at, nonce))
    }
}

fn parse_millis(raw: &str) -> ChainResult<DateTime<Utc>> {
    let millis = raw
        .parse::<i64>()
        .map_err(|e| ChainError::invalid(format!("bad timestamp '{raw}': {e}")))?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ChainError::invalid(format!("timestamp out of range: {millis}")))
}

/// A signed invitation to take the next position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket id
    pub id: TicketId,
    /// Issuing member
    pub owner_position: Position,
    /// Encoded `TicketPayload`
    pub payload: String,
    /// Base64 HMAC over `payload`
    pub signature: String,
    /// Current status
    pub status: TicketStatus,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Deadline
    pub expires_at: DateTime<Utc>,
    /// Newcomer who redeemed the ticket
    pub claimed_by_position: Option<Position>,
    /// Redemption time
    pub claimed_at: Option<DateTime<Utc>>,
    /// Which attempt of the owner this is, `1..=max_attempts`
    pub attempt_number: u32,
}

impl Ticket {
    /// Whether the ticket is still redeemable by status
    pub fn is_active(&self) -> bool {
        self.status == TicketStatus::Active
    }

    /// Whether the deadline has passed at `now`
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Time left before the deadline, never negative
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// Move to a terminal status other than `Used`
    pub fn close(&mut self, next: TicketStatus) -> ChainResult<()> {
        if next == TicketStatus::Used {
            return Err(ChainError::invalid(
                "tickets become USED only through claim_by",
            ));
        }
        self.transition(next)
    }

    /// Mark the ticket as redeemed by `newcomer`
    pub fn claim_by(&mut self, newcomer: Position, at: DateTime<Utc>) -> ChainResult<()> {
        self.transition(TicketStatus::Used)?;
        self.claimed_by_position = Some(newcomer);
        self.claimed_at = Some(at);
        Ok(())
    }

    fn transition(&mut self, next: TicketStatus) -> ChainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ChainError::TicketNotActive {
                ticket_id: self.id,
                status: self.status,
            });
        }
        self.status = next;
        Ok(())
    }
}
