//! The agreement record.
//!
//! Every field is private to the crate. Outside code reads it through
//! accessors or an [`AgreementSnapshot`]; only the engine's transitions
//! mutate it, and only on a working copy that is swapped in on commit.

use chrono::{DateTime, Utc};
use escrow_types::{
    AgreementId, AgreementTerms, DeadlinePhase, EscrowError, PartyId, Result, Role,
    SettlementPath,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One escrow arrangement between a funder and a counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    id: AgreementId,
    terms: AgreementTerms,
    full_payment: Decimal,
    created_at: DateTime<Utc>,
    ideal_deadline: DateTime<Utc>,
    max_deadline: DateTime<Utc>,
    funder_approved: bool,
    counterparty_approved: bool,
    settled: bool,
    settlement: Option<SettlementPath>,
    escrow_balance: Decimal,
}

impl Agreement {
    /// Build an open agreement from already-validated terms.
    pub(crate) fn open(
        terms: AgreementTerms,
        deposit: Decimal,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let full_payment = terms.full_payment()?;
        let ideal_deadline = deadline_after(created_at, terms.ideal_duration)?;
        let max_deadline = deadline_after(created_at, terms.max_duration)?;

        Ok(Self {
            id: AgreementId::derive(&terms, deposit, created_at),
            terms,
            full_payment,
            created_at,
            ideal_deadline,
            max_deadline,
            funder_approved: false,
            counterparty_approved: false,
            settled: false,
            settlement: None,
            escrow_balance: deposit,
        })
    }

    #[must_use]
    pub fn id(&self) -> AgreementId {
        self.id
    }

    #[must_use]
    pub fn terms(&self) -> &AgreementTerms {
        &self.terms
    }

    #[must_use]
    pub fn funder(&self) -> PartyId {
        self.terms.funder
    }

    #[must_use]
    pub fn counterparty(&self) -> PartyId {
        self.terms.counterparty
    }

    #[must_use]
    pub fn full_payment(&self) -> Decimal {
        self.full_payment
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn ideal_deadline(&self) -> DateTime<Utc> {
        self.ideal_deadline
    }

    #[must_use]
    pub fn max_deadline(&self) -> DateTime<Utc> {
        self.max_deadline
    }

    #[must_use]
    pub fn escrow_balance(&self) -> Decimal {
        self.escrow_balance
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    #[must_use]
    pub fn settlement_path(&self) -> Option<SettlementPath> {
        self.settlement
    }

    #[must_use]
    pub fn is_approved_by(&self, role: Role) -> bool {
        match role {
            Role::Funder => self.funder_approved,
            Role::Counterparty => self.counterparty_approved,
        }
    }

    /// Both approval flags, funder first.
    #[must_use]
    pub fn approvals(&self) -> (bool, bool) {
        (self.funder_approved, self.counterparty_approved)
    }

    #[must_use]
    pub fn deadline_phase_at(&self, now: DateTime<Utc>) -> DeadlinePhase {
        DeadlinePhase::at(now, self.ideal_deadline, self.max_deadline)
    }

    /// Which side `caller` is on.
    ///
    /// # Errors
    /// Returns [`EscrowError::UnknownCaller`] for anyone but the two parties.
    pub fn role_of(&self, caller: PartyId) -> Result<Role> {
        if caller == self.terms.funder {
            Ok(Role::Funder)
        } else if caller == self.terms.counterparty {
            Ok(Role::Counterparty)
        } else {
            Err(EscrowError::UnknownCaller(caller))
        }
    }

    #[must_use]
    pub fn party(&self, role: Role) -> PartyId {
        match role {
            Role::Funder => self.terms.funder,
            Role::Counterparty => self.terms.counterparty,
        }
    }

    pub(crate) fn record_approval(&mut self, role: Role) {
        match role {
            Role::Funder => self.funder_approved = true,
            Role::Counterparty => self.counterparty_approved = true,
        }
    }

    pub(crate) fn mark_settled(&mut self, path: SettlementPath) {
        self.settled = true;
        self.settlement = Some(path);
    }

    /// Take `amount` out of the escrow balance.
    pub(crate) fn debit(&mut self, amount: Decimal) -> Result<()> {
        if self.escrow_balance < amount {
            return Err(EscrowError::InsufficientEscrow {
                needed: amount,
                available: self.escrow_balance,
            });
        }
        self.escrow_balance -= amount;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self, asset: &str) -> AgreementSnapshot {
        AgreementSnapshot {
            id: self.id,
            asset: asset.to_string(),
            funder: self.terms.funder,
            counterparty: self.terms.counterparty,
            unit_rate: self.terms.unit_rate,
            units_required: self.terms.units_required,
            full_payment: self.full_payment,
            guaranteed_amount: self.terms.guaranteed_amount,
            created_at: self.created_at,
            ideal_deadline: self.ideal_deadline,
            max_deadline: self.max_deadline,
            funder_approved: self.funder_approved,
            counterparty_approved: self.counterparty_approved,
            settled: self.settled,
            settlement: self.settlement,
            escrow_balance: self.escrow_balance,
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_balance(&mut self, balance: Decimal) {
        self.escrow_balance = balance;
    }
}

fn deadline_after(start: DateTime<Utc>, after: std::time::Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or_else(|| EscrowError::InvalidTerms {
            reason: format!("deadline {}s after creation is out of range", after.as_secs()),
        })
}

/// Read-only, serializable copy of an agreement for monitors and UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementSnapshot {
    pub id: AgreementId,
    pub asset: String,
    pub funder: PartyId,
    pub counterparty: PartyId,
    pub unit_rate: Decimal,
    pub units_required: u64,
    pub full_payment: Decimal,
    pub guaranteed_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub ideal_deadline: DateTime<Utc>,
    pub max_deadline: DateTime<Utc>,
    pub funder_approved: bool,
    pub counterparty_approved: bool,
    pub settled: bool,
    pub settlement: Option<SettlementPath>,
    pub escrow_balance: Decimal,
}
