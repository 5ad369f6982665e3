//! How an agreement settled, and where it stands against its deadlines.
//!
//! ```text
//!   ┌───────────────────┐  approve (both)        ┌─────────┐
//!   │ OPEN(fa, ca)      ├───────────────────────▶│ SETTLED │
//!   │  approve: fa / ca │  claim_guaranteed      │         │
//!   │  self-loop        ├───────────────────────▶│         │
//!   │                   │  claim_after_deadline  │         │
//!   │                   ├───────────────────────▶│         │
//!   └───────────────────┘                        └─────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Role;

/// The transition that released value and settled the agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementPath {
    /// Both parties approved; full payment released.
    MutualApproval,
    /// Counterparty took the guaranteed amount; remainder refunded.
    GuaranteedClaim,
    /// A party took the entire balance after the hard deadline.
    DeadlineClaim(Role),
}

impl std::fmt::Display for SettlementPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MutualApproval => write!(f, "MUTUAL_APPROVAL"),
            Self::GuaranteedClaim => write!(f, "GUARANTEED_CLAIM"),
            Self::DeadlineClaim(role) => write!(f, "DEADLINE_CLAIM({role})"),
        }
    }
}

/// Position of a timestamp relative to an agreement's two deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeadlinePhase {
    /// At or before the ideal deadline.
    BeforeIdeal,
    /// Past the ideal deadline, at or before the hard deadline.
    PastIdeal,
    /// Strictly past the hard deadline; timeout claims are open.
    PastMax,
}

impl DeadlinePhase {
    #[must_use]
    pub fn at(
        now: DateTime<Utc>,
        ideal_deadline: DateTime<Utc>,
        max_deadline: DateTime<Utc>,
    ) -> Self {
        if now > max_deadline {
            Self::PastMax
        } else if now > ideal_deadline {
            Self::PastIdeal
        } else {
            Self::BeforeIdeal
        }
    }
}
