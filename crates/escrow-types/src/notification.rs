//! Notifications emitted by committed transitions.
//!
//! Notifications are an advisory side channel for monitors and log
//! collectors. The engine never reads them back; nothing depends on them
//! being observed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AgreementId, PartyId};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A party declared approval.
    ApprovalRecorded { party: PartyId, is_funder: bool },
    /// Full payment released on mutual approval.
    FullPaymentReleased { recipient: PartyId, amount: Decimal },
    /// Counterparty claimed the guaranteed amount.
    GuaranteedClaimed { recipient: PartyId, amount: Decimal },
    /// Remainder refunded to the funder after a guaranteed claim.
    RefundIssued { recipient: PartyId, amount: Decimal },
    /// A party took the balance after the hard deadline.
    DeadlineClaimed { recipient: PartyId, amount: Decimal },
}

impl NotificationKind {
    /// Upper-case name, stable across versions.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApprovalRecorded { .. } => "APPROVAL_RECORDED",
            Self::FullPaymentReleased { .. } => "FULL_PAYMENT_RELEASED",
            Self::GuaranteedClaimed { .. } => "GUARANTEED_CLAIMED",
            Self::RefundIssued { .. } => "REFUND_ISSUED",
            Self::DeadlineClaimed { .. } => "DEADLINE_CLAIMED",
        }
    }

    /// Value moved by this notification, if any.
    #[must_use]
    pub fn amount(&self) -> Option<Decimal> {
        match self {
            Self::ApprovalRecorded { .. } => None,
            Self::FullPaymentReleased { amount, .. }
            | Self::GuaranteedClaimed { amount, .. }
            | Self::RefundIssued { amount, .. }
            | Self::DeadlineClaimed { amount, .. } => Some(*amount),
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A notification as stored in an engine's journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Position in the agreement's notification stream, starting at 0.
    pub sequence: u64,
    pub agreement_id: AgreementId,
    pub kind: NotificationKind,
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    /// JSON line for log shippers.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
