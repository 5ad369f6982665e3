//! Value conservation for a single agreement.
//!
//! Invariant enforced after every committed transition:
//! ```text
//! deposited == Σ(released to each party) + escrow balance
//! ```
//!
//! A violation means value was created or destroyed. The transition that
//! produced it is unwound and the engine refuses to commit.

use std::collections::HashMap;

use escrow_types::{EscrowError, PartyId, Result};
use rust_decimal::Decimal;

/// Tracks what went into escrow and what came out, per party.
#[derive(Debug, Clone)]
pub struct ValueAccounting {
    deposited: Decimal,
    released: HashMap<PartyId, Decimal>,
}

impl ValueAccounting {
    /// Start accounting for an escrow funded with `deposited`.
    #[must_use]
    pub fn new(deposited: Decimal) -> Self {
        Self {
            deposited,
            released: HashMap::new(),
        }
    }

    /// Record value released to a party.
    pub fn record_release(&mut self, recipient: PartyId, amount: Decimal) {
        *self.released.entry(recipient).or_insert(Decimal::ZERO) += amount;
    }

    #[must_use]
    pub fn deposited(&self) -> Decimal {
        self.deposited
    }

    /// Total released to every party.
    #[must_use]
    pub fn total_released(&self) -> Decimal {
        self.released.values().copied().sum()
    }

    /// Total released to one party.
    #[must_use]
    pub fn released_to(&self, party: PartyId) -> Decimal {
        self.released.get(&party).copied().unwrap_or(Decimal::ZERO)
    }

    /// Verify the escrow balance against the books.
    ///
    /// # Errors
    /// Returns [`EscrowError::ConservationViolation`] if the balance is
    /// negative or `deposited != released + balance`.
    pub fn verify(&self, balance: Decimal) -> Result<()> {
        if balance < Decimal::ZERO {
            return Err(EscrowError::ConservationViolation {
                reason: format!("escrow balance is negative: {balance}"),
            });
        }
        let released = self.total_released();
        if released + balance != self.deposited {
            return Err(EscrowError::ConservationViolation {
                reason: format!(
                    "released {released} + balance {balance} != deposited {}",
                    self.deposited
                ),
            });
        }
        Ok(())
    }
}
