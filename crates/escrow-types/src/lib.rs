//! # escrow-types
//!
//! Shared types, errors, and configuration for the two-party **escrow
//! settlement engine**.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`PartyId`], [`AgreementId`], [`Role`]
//! - **Terms**: [`AgreementTerms`] and its creation-time validation
//! - **Transfers**: [`Transfer`], [`TransferPurpose`]
//! - **Status**: [`SettlementPath`], [`DeadlinePhase`]
//! - **Notifications**: [`Notification`], [`NotificationKind`]
//! - **Configuration**: [`EscrowConfig`]
//! - **Errors**: [`EscrowError`] with `ESC_ERR_` prefix codes, grouped by [`ErrorKind`]
//! - **Constants**: defaults and limits

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod notification;
pub mod status;
pub mod terms;
pub mod transfer;

pub use config::*;
pub use error::*;
pub use ids::*;
pub use notification::*;
pub use status::*;
pub use terms::*;
pub use transfer::*;

// Constants are accessed via `escrow_types::constants::FOO`.
