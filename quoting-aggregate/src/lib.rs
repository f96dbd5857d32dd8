//! Quoting Aggregate
//!
//! Consumes batches of inbound commands, validates them against participants
//! and scheme rules, persists quote state and produces exactly one outbound
//! event per inbound message.
//!
//! # Flow
//!
//! ```text
//! InboundMessage → parse → participants → scheme → repository → OutboundMessage
//! ```
//!
//! Business failures become `QuotingErrorEvt` messages. Only infrastructure
//! failures (store unreachable, account lookup down) abort the batch.

#![warn(clippy::all)]

pub mod aggregate;
mod bulk;
pub mod config;
pub mod error;
mod outcome;
pub mod rules;

#[cfg(test)]
mod test_support;

// Re-exports
pub use aggregate::{CommandProcessor, QuotingAggregate};
pub use config::{AggregateConfig, DEFAULT_MAX_BULK_QUOTES};
pub use error::{AggregateError, AggregateResult};
pub use rules::{validate_participant, ParticipantRole, SchemeRules};
