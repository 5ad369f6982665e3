//! Agreement terms: who the parties are, what full payment is, what the
//! counterparty is guaranteed, and how long each side may wait.
//!
//! Terms are fixed at creation. [`AgreementTerms::validate`] is the single
//! gate every agreement passes before any value is collected.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EscrowConfig, EscrowError, PartyId, Result, constants};

/// Parameters of a two-party escrow agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementTerms {
    /// Party supplying the deposit.
    pub funder: PartyId,
    /// Party performing the work.
    pub counterparty: PartyId,
    /// Price of one unit of work, in minor units.
    pub unit_rate: Decimal,
    /// Units of work owed.
    pub units_required: u64,
    /// Floor the counterparty can claim outside mutual approval.
    pub guaranteed_amount: Decimal,
    /// Soft deadline, relative to creation.
    pub ideal_duration: Duration,
    /// Hard deadline, relative to creation. Timeout claims open after it.
    pub max_duration: Duration,
}

impl AgreementTerms {
    /// `unit_rate * units_required`, released on mutual approval.
    pub fn full_payment(&self) -> Result<Decimal> {
        self.unit_rate
            .checked_mul(Decimal::from(self.units_required))
            .ok_or(EscrowError::AmountOverflow {
                what: "full payment",
            })
    }

    /// Check every creation precondition against the offered deposit.
    ///
    /// # Errors
    /// - `InvalidTerms` for null/duplicate parties, non-positive or
    ///   fractional amounts, and bad durations
    /// - `AmountOverflow` if the full payment does not fit
    /// - `Underfunded` if the deposit covers neither the full payment nor
    ///   the guaranteed amount
    pub fn validate(&self, deposit: Decimal, config: &EscrowConfig) -> Result<()> {
        if self.counterparty.is_null() {
            return Err(invalid("counterparty must not be the null identity"));
        }
        if self.funder.is_null() {
            return Err(invalid("funder must not be the null identity"));
        }
        if self.funder == self.counterparty {
            return Err(invalid("funder and counterparty must differ"));
        }

        check_positive_whole("unit_rate", self.unit_rate)?;
        if self.units_required == 0 {
            return Err(invalid("units_required must be > 0"));
        }
        check_positive_whole("guaranteed_amount", self.guaranteed_amount)?;
        check_positive_whole("deposit", deposit)?;

        if self.ideal_duration.is_zero() {
            return Err(invalid("ideal_duration must be > 0"));
        }
        if self.max_duration < self.ideal_duration {
            return Err(invalid("max_duration must be >= ideal_duration"));
        }
        if self.max_duration > config.max_horizon {
            return Err(EscrowError::InvalidTerms {
                reason: format!(
                    "max_duration {}s exceeds horizon {}s",
                    self.max_duration.as_secs(),
                    config.max_horizon.as_secs()
                ),
            });
        }

        let full_payment = self.full_payment()?;
        if deposit < full_payment {
            return Err(EscrowError::Underfunded {
                needed: full_payment,
                deposited: deposit,
            });
        }
        if deposit < self.guaranteed_amount {
            return Err(EscrowError::Underfunded {
                needed: self.guaranteed_amount,
                deposited: deposit,
            });
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> EscrowError {
    EscrowError::InvalidTerms {
        reason: reason.to_string(),
    }
}

fn check_positive_whole(field: &str, amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(EscrowError::InvalidTerms {
            reason: format!("{field} must be > 0, got {amount}"),
        });
    }
    if amount.normalize().scale() > constants::AMOUNT_SCALE {
        return Err(EscrowError::InvalidTerms {
            reason: format!("{field} must be a whole number of minor units, got {amount}"),
        });
    }
    Ok(())
}

#[cfg(any(test, feature = "test-helpers"))]
impl AgreementTerms {
    /// Rate 10 × 5 units, guaranteed 20, one day ideal, one week max.
    #[must_use]
    pub fn dummy(funder: PartyId, counterparty: PartyId) -> Self {
        Self {
            funder,
            counterparty,
            unit_rate: Decimal::new(10, 0),
            units_required: 5,
            guaranteed_amount: Decimal::new(20, 0),
            ideal_duration: Duration::from_secs(24 * 60 * 60),
            max_duration: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}
