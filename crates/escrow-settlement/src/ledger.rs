//! Value movement between parties and the escrow.
//!
//! The engine never holds a party's funds directly: it asks the host's
//! [`Ledger`] to pull the deposit at creation and to deliver each outbound
//! transfer. Delivery runs recipient code, which receives a shared reference
//! to the engine and may try to call back into it.

use std::collections::{HashMap, HashSet};

use escrow_types::{EscrowError, PartyId, Result, Transfer};
use rust_decimal::Decimal;

use crate::engine::SettlementEngine;

/// Host-side ledger the engine moves value through.
pub trait Ledger {
    /// Pull `amount` from the funder into escrow. Called once, after the
    /// terms validated; if it fails no agreement exists.
    fn collect(&mut self, funder: PartyId, amount: Decimal) -> Result<()>;

    /// Deliver one outbound transfer. May fail (recipient rejects) and may
    /// re-enter `engine`.
    fn deliver(&mut self, engine: &SettlementEngine, transfer: &Transfer) -> Result<()>;

    /// Undo a transfer this ledger already delivered, because a later leg of
    /// the same transition failed.
    fn revert(&mut self, transfer: &Transfer);
}

/// In-process ledger: per-party balances plus a set of parties whose
/// transfers are refused.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: HashMap<PartyId, Decimal>,
    rejecting: HashSet<PartyId>,
    delivered: Vec<Transfer>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a party from outside the system.
    ///
    /// # Errors
    /// Returns [`EscrowError::AmountOverflow`] if the balance would overflow.
    pub fn fund(&mut self, party: PartyId, amount: Decimal) -> Result<()> {
        let balance = self.balances.entry(party).or_insert(Decimal::ZERO);
        *balance = balance
            .checked_add(amount)
            .ok_or(EscrowError::AmountOverflow {
                what: "ledger balance",
            })?;
        Ok(())
    }

    /// Refuse every future transfer to `party`.
    pub fn reject_transfers_to(&mut self, party: PartyId) {
        self.rejecting.insert(party);
    }

    /// Accept transfers to `party` again.
    pub fn accept_transfers_to(&mut self, party: PartyId) {
        self.rejecting.remove(&party);
    }

    #[must_use]
    pub fn balance(&self, party: PartyId) -> Decimal {
        self.balances.get(&party).copied().unwrap_or(Decimal::ZERO)
    }

    /// Transfers delivered and not reverted, in order.
    #[must_use]
    pub fn deliveries(&self) -> &[Transfer] {
        &self.delivered
    }

    /// Sum of every party balance (escrowed value excluded).
    #[must_use]
    pub fn total_supply(&self) -> Decimal {
        self.balances.values().copied().sum()
    }
}

impl Ledger for InMemoryLedger {
    fn collect(&mut self, funder: PartyId, amount: Decimal) -> Result<()> {
        let available = self.balance(funder);
        if available < amount {
            return Err(EscrowError::DepositRejected {
                funder,
                amount,
                reason: format!("insufficient funds: have {available}"),
            });
        }
        self.balances.insert(funder, available - amount);
        Ok(())
    }

    fn deliver(&mut self, _engine: &SettlementEngine, transfer: &Transfer) -> Result<()> {
        if self.rejecting.contains(&transfer.recipient) {
            return Err(EscrowError::TransferRejected {
                recipient: transfer.recipient,
                amount: transfer.amount,
                reason: "recipient refuses transfers".into(),
            });
        }
        self.fund(transfer.recipient, transfer.amount)?;
        self.delivered.push(transfer.clone());
        Ok(())
    }

    fn revert(&mut self, transfer: &Transfer) {
        *self
            .balances
            .entry(transfer.recipient)
            .or_insert(Decimal::ZERO) -= transfer.amount;
        if let Some(pos) = self.delivered.iter().rposition(|t| t == transfer) {
            self.delivered.remove(pos);
        }
    }
}
