//! Error types for the escrow settlement engine.
//!
//! All errors use the `ESC_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by failure class:
//! - 1xx: Authorization errors
//! - 2xx: State conflicts
//! - 3xx: Timing errors
//! - 4xx: Invariant / validation errors
//! - 5xx: Transfer errors
//! - 9xx: General / internal errors

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{PartyId, Role};

/// Failure class of an [`EscrowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller is not a registered party, or is the wrong party.
    Authorization,
    /// The action conflicts with the agreement's current state.
    StateConflict,
    /// A deadline has not been reached yet.
    Timing,
    /// A value or construction invariant would be broken.
    InvariantViolation,
    /// An outbound (or inbound) value transfer failed.
    TransferFailure,
    /// Configuration or serialization failure.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorization => write!(f, "AUTHORIZATION"),
            Self::StateConflict => write!(f, "STATE_CONFLICT"),
            Self::Timing => write!(f, "TIMING"),
            Self::InvariantViolation => write!(f, "INVARIANT_VIOLATION"),
            Self::TransferFailure => write!(f, "TRANSFER_FAILURE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Central error enum for all escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    // =================================================================
    // Authorization Errors (1xx)
    // =================================================================
    /// Caller is neither the funder nor the counterparty.
    #[error("ESC_ERR_100: Caller {0} is not a party to this agreement")]
    UnknownCaller(PartyId),

    /// Caller is a party, but not the one allowed to perform this action.
    #[error("ESC_ERR_101: Only the {required} may {action}")]
    WrongParty {
        required: Role,
        action: &'static str,
    },

    // =================================================================
    // State Conflicts (2xx)
    // =================================================================
    /// The party already approved; approval is one-shot.
    #[error("ESC_ERR_200: {0} has already approved")]
    AlreadyApproved(Role),

    /// The agreement has already been settled.
    #[error("ESC_ERR_201: Agreement already settled")]
    AlreadySettled,

    /// The other side approved, so the timeout path is closed to this role.
    #[error("ESC_ERR_202: Deadline claim unavailable to {claimant}: the {claimant_opposite} has approved", claimant_opposite = .claimant.opposite())]
    OpposingPartyApproved { claimant: Role },

    /// A transition is already running (re-entrant call from a transfer).
    #[error("ESC_ERR_203: Another transition is in progress")]
    TransitionInProgress,

    /// The funder accepted the work and cannot take the deposit back.
    #[error("ESC_ERR_204: Deadline claim unavailable to FUNDER: the FUNDER has approved")]
    FunderApproved,

    // =================================================================
    // Timing Errors (3xx)
    // =================================================================
    /// The hard deadline has not passed yet.
    #[error("ESC_ERR_300: Deadline {deadline} not reached (now {now})")]
    DeadlineNotReached {
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    // =================================================================
    // Invariant / Validation Errors (4xx)
    // =================================================================
    /// The agreement terms failed validation.
    #[error("ESC_ERR_400: Invalid terms: {reason}")]
    InvalidTerms { reason: String },

    /// The deposit does not cover what the terms require.
    #[error("ESC_ERR_401: Underfunded: need {needed}, deposited {deposited}")]
    Underfunded { needed: Decimal, deposited: Decimal },

    /// The escrow holds less than a required transfer.
    #[error("ESC_ERR_402: Insufficient escrow: need {needed}, have {available}")]
    InsufficientEscrow { needed: Decimal, available: Decimal },

    /// Nothing left in escrow to claim.
    #[error("ESC_ERR_403: Escrow balance is zero")]
    NothingToClaim,

    /// Value conservation check failed. Critical.
    #[error("ESC_ERR_404: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    /// An amount computation overflowed.
    #[error("ESC_ERR_405: Amount overflow computing {what}")]
    AmountOverflow { what: &'static str },

    // =================================================================
    // Transfer Errors (5xx)
    // =================================================================
    /// An outbound transfer was rejected by the recipient or the host.
    #[error("ESC_ERR_500: Transfer of {amount} to {recipient} rejected: {reason}")]
    TransferRejected {
        recipient: PartyId,
        amount: Decimal,
        reason: String,
    },

    /// The deposit could not be collected from the funder.
    #[error("ESC_ERR_501: Deposit of {amount} from {funder} rejected: {reason}")]
    DepositRejected {
        funder: PartyId,
        amount: Decimal,
        reason: String,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Serialization / deserialization error.
    #[error("ESC_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("ESC_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl EscrowError {
    /// The failure class this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCaller(_) | Self::WrongParty { .. } => ErrorKind::Authorization,
            Self::AlreadyApproved(_)
            | Self::AlreadySettled
            | Self::OpposingPartyApproved { .. }
            | Self::TransitionInProgress
            | Self::FunderApproved => ErrorKind::StateConflict,
            Self::DeadlineNotReached { .. } => ErrorKind::Timing,
            Self::InvalidTerms { .. }
            | Self::Underfunded { .. }
            | Self::InsufficientEscrow { .. }
            | Self::NothingToClaim
            | Self::ConservationViolation { .. }
            | Self::AmountOverflow { .. } => ErrorKind::InvariantViolation,
            Self::TransferRejected { .. } | Self::DepositRejected { .. } => {
                ErrorKind::TransferFailure
            }
            Self::Serialization(_) | Self::Configuration(_) => ErrorKind::Internal,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowError>;

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
