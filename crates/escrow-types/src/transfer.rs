//! Outbound value transfers issued by a settlement transition.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::PartyId;

/// Why value is leaving escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferPurpose {
    /// Full payment to the counterparty after mutual approval.
    FullPayment,
    /// Guaranteed floor claimed by the counterparty.
    Guaranteed,
    /// Remainder returned to the funder after a guaranteed claim.
    Refund,
    /// Entire balance taken by a party after the hard deadline.
    DeadlineClaim,
}

impl std::fmt::Display for TransferPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullPayment => write!(f, "FULL_PAYMENT"),
            Self::Guaranteed => write!(f, "GUARANTEED"),
            Self::Refund => write!(f, "REFUND"),
            Self::DeadlineClaim => write!(f, "DEADLINE_CLAIM"),
        }
    }
}

/// One leg of value moving out of escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub recipient: PartyId,
    pub amount: Decimal,
    pub purpose: TransferPurpose,
}

impl Transfer {
    #[must_use]
    pub fn new(recipient: PartyId, amount: Decimal, purpose: TransferPurpose) -> Self {
        Self {
            recipient,
            amount,
            purpose,
        }
    }
}
