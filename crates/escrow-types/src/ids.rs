//! Identifiers for parties, agreements, and the roles parties play.
//!
//! Party identities are resolved outside the engine (name lookup, wallets,
//! etc.); the engine only ever compares them. Agreement IDs are derived
//! deterministically from the agreement's inputs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::AgreementTerms;

// ---------------------------------------------------------------------------
// PartyId
// ---------------------------------------------------------------------------

/// Resolved identity of a party to an agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PartyId(pub Uuid);

impl PartyId {
    /// The null identity. Never a valid counterparty.
    pub const NULL: Self = Self(Uuid::nil());

    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for PartyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which side of the agreement a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Supplied the deposit.
    Funder,
    /// Performs the work and is eligible for payment.
    Counterparty,
}

impl Role {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Funder => Self::Counterparty,
            Self::Counterparty => Self::Funder,
        }
    }

    #[must_use]
    pub fn is_funder(self) -> bool {
        self == Self::Funder
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Funder => write!(f, "FUNDER"),
            Self::Counterparty => write!(f, "COUNTERPARTY"),
        }
    }
}

// ---------------------------------------------------------------------------
// AgreementId
// ---------------------------------------------------------------------------

/// Identifier of one escrow agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AgreementId(pub [u8; 32]);

impl AgreementId {
    /// Derive the ID from the agreement's terms, deposit and creation time.
    ///
    /// `SHA-256("escrow:agreement:v1:" || funder || counterparty || unit_rate
    /// || units_required || guaranteed || ideal_secs || max_secs || deposit || created_ms)`
    #[must_use]
    pub fn derive(
        terms: &AgreementTerms,
        deposit: rust_decimal::Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"escrow:agreement:v1:");
        hasher.update(terms.funder.0.as_bytes());
        hasher.update(terms.counterparty.0.as_bytes());
        hasher.update(terms.unit_rate.to_string().as_bytes());
        hasher.update(terms.units_required.to_le_bytes());
        hasher.update(terms.guaranteed_amount.to_string().as_bytes());
        hasher.update(terms.ideal_duration.as_secs().to_le_bytes());
        hasher.update(terms.max_duration.as_secs().to_le_bytes());
        hasher.update(deposit.to_string().as_bytes());
        hasher.update(created_at.timestamp_millis().to_le_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for AgreementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agreement:{}", hex::encode(&self.0[..8]))
    }
}
