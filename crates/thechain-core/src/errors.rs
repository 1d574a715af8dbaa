//! Error taxonomy for chain operations
//!
//! Every rejected operation maps to one `ChainError` variant carrying a stable
//! `code()` and a human-readable message. Callers outside the core should
//! surface `ErrorReport`, never the raw error's debug form.

use crate::effects::store::StoreError;
use crate::identifiers::{Position, TicketId};
use crate::ticket::TicketStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unified error type for chain operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ChainError {
    /// No ticket with this id
    #[error("Ticket {ticket_id} not found")]
    TicketNotFound {
        /// Requested ticket
        ticket_id: TicketId,
    },

    /// No member at this position
    #[error("Member {position} not found")]
    MemberNotFound {
        /// Requested position
        position: Position,
    },

    /// The parent referenced by a ticket or invitation is missing
    #[error("Parent {position} not found")]
    ParentNotFound {
        /// Missing parent
        position: Position,
    },

    /// The chain has no live tip (empty chain)
    #[error("Unable to identify chain tip")]
    TipNotFound,

    /// Ticket is not in the ACTIVE state
    #[error("Ticket {ticket_id} is {status}")]
    TicketNotActive {
        /// Ticket
        ticket_id: TicketId,
        /// Status it was found in
        status: TicketStatus,
    },

    /// Ticket deadline has passed
    #[error("Ticket {ticket_id} expired at {expires_at}")]
    TicketExpired {
        /// Ticket
        ticket_id: TicketId,
        /// Deadline that passed
        expires_at: DateTime<Utc>,
    },

    /// Owner already has a live invitee
    #[error("Member {owner} already has an active invitee at {child}")]
    OwnerHasActiveChild {
        /// Issuing member
        owner: Position,
        /// Live invitee
        child: Position,
    },

    /// Owner already holds an ACTIVE ticket
    #[error("Member {owner} already holds active ticket {ticket_id}")]
    ActiveTicketExists {
        /// Issuing member
        owner: Position,
        /// Outstanding ticket
        ticket_id: TicketId,
    },

    /// The ticket's owner gained an invitee since the ticket was issued
    #[error("Parent {parent} already has an active invitee at {child}")]
    ParentHasChild {
        /// Ticket owner
        parent: Position,
        /// Live invitee
        child: Position,
    },

    /// Member was removed from the chain
    #[error("Member {position} has been removed from the chain")]
    MemberRemoved {
        /// Removed member
        position: Position,
    },

    /// Chain already has a seed
    #[error("Seed already exists at {position}")]
    SeedAlreadyExists {
        /// Existing seed
        position: Position,
    },

    /// Provided signature does not match the ticket payload
    #[error("Invalid signature for ticket {ticket_id}")]
    InvalidSignature {
        /// Ticket
        ticket_id: TicketId,
    },

    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// What was invalid
        message: String,
    },

    /// Persistence failure
    #[error("Storage error: {message}")]
    Storage {
        /// Underlying store failure
        message: String,
    },

    /// The removal cascade walked further than any consistent chain allows
    #[error("Removal cascade exceeded depth {max_depth} at member {position}")]
    CascadeDepthExceeded {
        /// Member the cascade had reached
        position: Position,
        /// Configured bound
        max_depth: usize,
    },
}

/// Coarse error classes used for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Entity does not exist
    NotFound,
    /// Operation rejected by current state
    StateConflict,
    /// Possible tampering
    Integrity,
    /// Transient infrastructure failure
    Infrastructure,
    /// Data-integrity violation that must not be silently skipped
    Fatal,
}

impl ChainError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ChainError::TicketNotFound { .. } => "TICKET_NOT_FOUND",
            ChainError::MemberNotFound { .. } => "MEMBER_NOT_FOUND",
            ChainError::ParentNotFound { .. } => "PARENT_NOT_FOUND",
            ChainError::TipNotFound => "NO_TIP_FOUND",
            ChainError::TicketNotActive { status, .. } => match status {
                TicketStatus::Active => "TICKET_ACTIVE",
                TicketStatus::Used => "TICKET_USED",
                TicketStatus::Expired => "TICKET_EXPIRED",
                TicketStatus::Cancelled => "TICKET_CANCELLED",
            },
            ChainError::TicketExpired { .. } => "TICKET_EXPIRED",
            ChainError::OwnerHasActiveChild { .. } => "ALREADY_HAS_INVITEE",
            ChainError::ActiveTicketExists { .. } => "ACTIVE_TICKET_EXISTS",
            ChainError::ParentHasChild { .. } => "PARENT_HAS_INVITEE",
            ChainError::MemberRemoved { .. } => "MEMBER_REMOVED",
            ChainError::SeedAlreadyExists { .. } => "SEED_EXISTS",
            ChainError::InvalidSignature { .. } => "INVALID_SIGNATURE",
            ChainError::Invalid { .. } => "INVALID",
            ChainError::Storage { .. } => "STORAGE_UNAVAILABLE",
            ChainError::CascadeDepthExceeded { .. } => "CASCADE_DEPTH_EXCEEDED",
        }
    }

    /// Error class
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChainError::TicketNotFound { .. }
            | ChainError::MemberNotFound { .. }
            | ChainError::ParentNotFound { .. }
            | ChainError::TipNotFound => ErrorCategory::NotFound,
            ChainError::TicketNotActive { .. }
            | ChainError::TicketExpired { .. }
            | ChainError::OwnerHasActiveChild { .. }
            | ChainError::ActiveTicketExists { .. }
            | ChainError::ParentHasChild { .. }
            | ChainError::MemberRemoved { .. }
            | ChainError::SeedAlreadyExists { .. }
            | ChainError::Invalid { .. } => ErrorCategory::StateConflict,
            ChainError::InvalidSignature { .. } => ErrorCategory::Integrity,
            ChainError::Storage { .. } => ErrorCategory::Infrastructure,
            ChainError::CascadeDepthExceeded { .. } => ErrorCategory::Fatal,
        }
    }

    /// Whether the same call may succeed later without any caller change
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Infrastructure
    }

    /// User-visible report
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        Self::storage(err.to_string())
    }
}

/// Stable code plus human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stable code, e.g. `TICKET_NOT_FOUND`
    pub code: String,
    /// Human-readable message
    pub message: String,
}

/// Standard Result type for chain operations
pub type ChainResult<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_not_active_code_names_status() {
        let err = ChainError::TicketNotActive {
            ticket_id: TicketId::new_random(),
            status: TicketStatus::Used,
        };
        assert_eq!(err.code(), "TICKET_USED");
        assert!(err.to_string().ends_with("is USED"));
        assert_eq!(err.category(), ErrorCategory::StateConflict);
    }

    #[test]
    fn test_store_error_is_infrastructure() {
        let err = ChainError::from(StoreError::Unavailable {
            reason: "connection reset".into(),
        });
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
        assert!(err.is_transient());
    }

    #[test]
    fn test_report_serializes_code_and_message() {
        let report = ChainError::InvalidSignature {
            ticket_id: TicketId::new_random(),
        }
        .report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["code"], "INVALID_SIGNATURE");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid signature"));
    }

    #[test]
    fn test_cascade_depth_is_fatal() {
        let err = ChainError::CascadeDepthExceeded {
            position: Position::new(9),
            max_depth: 4,
        };
        assert_eq!(err.category(), ErrorCategory::Fatal);
        assert!(!err.is_transient());
    }
}
