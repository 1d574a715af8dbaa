//! # The Chain Core - Layer 1: Types, Errors, Effects
//!
//! Foundation crate for the membership chain. Every member occupies a unique
//! position and may extend the chain exactly once by issuing a signed,
//! time-limited ticket that a newcomer redeems for the next position.
//!
//! ## What Belongs Here
//!
//! - Identifiers and entities (`Member`, `Ticket`, `InvitationRecord`, badges)
//! - Rule parameters and the versioned rule book
//! - The error taxonomy with stable codes
//! - Configuration loading and validation
//! - Ticket signing (HMAC-SHA256)
//! - Effect traits: store, clock, notifications
//!
//! ## What Does NOT Belong Here
//!
//! - Effect handler implementations (belong in `thechain-effects`)
//! - Lifecycle, graph and cascade logic (belong in `thechain-engine`)

#![forbid(unsafe_code)]

/// Badge awards
pub mod badge;

/// Runtime configuration
pub mod config;

/// Ticket payload signing and verification
pub mod crypto;

/// Effect traits implemented by handlers in `thechain-effects`
pub mod effects;

/// Error taxonomy
pub mod errors;

/// Position and ticket identifiers
pub mod identifiers;

/// Parent/child audit edges
pub mod invitation;

/// Chain members
pub mod member;

/// Rule parameters and versioned rule provider
pub mod rules;

/// Tickets and their payloads
pub mod ticket;

pub use badge::{BadgeAward, BadgeKind};
pub use config::{CascadeConfig, ChainConfig, SweeperConfig};
pub use crypto::TicketSigner;
pub use errors::{ChainError, ChainResult, ErrorCategory, ErrorReport};
pub use identifiers::{Position, TicketId};
pub use invitation::{InvitationRecord, InvitationStatus};
pub use member::{Member, MemberStatus, NewcomerInfo, RemovalReason};
pub use rules::{ChainRule, FixedRule, RuleBook, RuleProvider, RuleVersion};
pub use ticket::{Ticket, TicketPayload, TicketStatus};
