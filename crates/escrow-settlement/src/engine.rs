//! The settlement engine.
//!
//! Owns one [`Agreement`] and is the only code allowed to move value out of
//! its escrow. Every mutating call runs as a single transition:
//!
//! 1. Take the re-entrancy token (nested calls fail with `TransitionInProgress`)
//! 2. Authenticate the caller and check guards against a working copy
//! 3. Apply the effects to the working copy (terminal flag first)
//! 4. Deliver the outbound transfers through the host [`Ledger`]
//! 5. Verify value conservation
//! 6. Commit the working copy and publish notifications
//!
//! A failure at any step discards the working copy and reverts any
//! already-delivered leg, so readers only ever see committed state.
//!
//! The engine is deliberately `!Sync`: its host runs calls one at a time.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use escrow_types::{
    AgreementId, AgreementTerms, DeadlinePhase, EscrowConfig, EscrowError, Notification,
    NotificationKind, PartyId, Result, Role, SettlementPath, Transfer, TransferPurpose,
    constants,
};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::{
    accounting::ValueAccounting,
    agreement::{Agreement, AgreementSnapshot},
    clock::Clock,
    ledger::Ledger,
    transition_lock::TransitionLock,
};

/// Effects of a transition, computed before anything leaves escrow.
struct Staged {
    next: Agreement,
    transfers: Vec<Transfer>,
    events: Vec<NotificationKind>,
}

impl Staged {
    fn begin(current: &Agreement) -> Self {
        Self {
            next: current.clone(),
            transfers: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Debit escrow and queue the outbound leg with its notification.
    fn pay(
        &mut self,
        recipient: PartyId,
        amount: Decimal,
        purpose: TransferPurpose,
    ) -> Result<()> {
        self.next.debit(amount)?;
        self.transfers.push(Transfer::new(recipient, amount, purpose));
        self.events.push(match purpose {
            TransferPurpose::FullPayment => {
                NotificationKind::FullPaymentReleased { recipient, amount }
            }
            TransferPurpose::Guaranteed => {
                NotificationKind::GuaranteedClaimed { recipient, amount }
            }
            TransferPurpose::Refund => NotificationKind::RefundIssued { recipient, amount },
            TransferPurpose::DeadlineClaim => {
                NotificationKind::DeadlineClaimed { recipient, amount }
            }
        });
        Ok(())
    }
}

/// Settlement engine for a single two-party agreement.
pub struct SettlementEngine {
    config: EscrowConfig,
    clock: Arc<dyn Clock>,
    agreement: RefCell<Agreement>,
    accounting: RefCell<ValueAccounting>,
    journal: RefCell<VecDeque<Notification>>,
    next_sequence: Cell<u64>,
    lock: TransitionLock,
}

impl SettlementEngine {
    /// Validate the terms, collect the deposit, and open the agreement.
    ///
    /// Nothing is collected unless every precondition holds; if collection
    /// itself fails no agreement exists and the funder keeps the deposit.
    ///
    /// # Errors
    /// - `Configuration` for an unusable config
    /// - `InvalidTerms`, `Underfunded`, `AmountOverflow` from term validation
    /// - `DepositRejected` if the ledger cannot collect the deposit
    pub fn create<L: Ledger + ?Sized>(
        config: EscrowConfig,
        terms: AgreementTerms,
        deposit: Decimal,
        clock: Arc<dyn Clock>,
        ledger: &mut L,
    ) -> Result<Self> {
        config.validate()?;
        terms.validate(deposit, &config)?;

        let agreement = Agreement::open(terms, deposit, clock.now())?;
        ledger.collect(agreement.funder(), deposit)?;

        info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            agreement = %agreement.id(),
            funder = %agreement.funder(),
            counterparty = %agreement.counterparty(),
            asset = %config.asset,
            deposit = %deposit,
            full_payment = %agreement.full_payment(),
            guaranteed = %agreement.terms().guaranteed_amount,
            max_deadline = %agreement.max_deadline(),
            "Escrow agreement opened"
        );

        let capacity = config.journal_capacity.min(64);
        Ok(Self {
            config,
            clock,
            agreement: RefCell::new(agreement),
            accounting: RefCell::new(ValueAccounting::new(deposit)),
            journal: RefCell::new(VecDeque::with_capacity(capacity)),
            next_sequence: Cell::new(0),
            lock: TransitionLock::new(),
        })
    }

    // =================================================================
    // Transitions
    // =================================================================

    /// Record the caller's approval. When both parties have approved, the
    /// full payment is released to the counterparty in the same transition.
    ///
    /// # Errors
    /// - `UnknownCaller` if the caller is not a party
    /// - `AlreadySettled` once the agreement is settled
    /// - `AlreadyApproved` if the caller approved before
    /// - `TransferRejected` if the full-payment transfer fails (the approval
    ///   is discarded with it)
    pub fn approve<L: Ledger + ?Sized>(&self, caller: PartyId, ledger: &mut L) -> Result<()> {
        self.transition("approve", ledger, |current, _now| {
            let role = current.role_of(caller)?;
            if current.is_settled() {
                return Err(EscrowError::AlreadySettled);
            }
            if current.is_approved_by(role) {
                return Err(EscrowError::AlreadyApproved(role));
            }

            let mut staged = Staged::begin(current);
            staged.next.record_approval(role);
            staged.events.push(NotificationKind::ApprovalRecorded {
                party: caller,
                is_funder: role.is_funder(),
            });

            if staged.next.approvals() == (true, true) {
                staged.next.mark_settled(SettlementPath::MutualApproval);
                let amount = staged.next.full_payment();
                let counterparty = staged.next.counterparty();
                staged.pay(counterparty, amount, TransferPurpose::FullPayment)?;
            }
            Ok(staged)
        })
    }

    /// Counterparty's unilateral exit: take the guaranteed amount and refund
    /// whatever remains to the funder. Available under any approval state.
    ///
    /// # Errors
    /// - `UnknownCaller` / `WrongParty` unless called by the counterparty
    /// - `AlreadySettled` once the agreement is settled
    /// - `InsufficientEscrow` if the balance is below the guaranteed amount
    /// - `TransferRejected` if either leg fails (both are unwound)
    pub fn claim_guaranteed<L: Ledger + ?Sized>(
        &self,
        caller: PartyId,
        ledger: &mut L,
    ) -> Result<()> {
        self.transition("claim_guaranteed", ledger, |current, _now| {
            if current.role_of(caller)? != Role::Counterparty {
                return Err(EscrowError::WrongParty {
                    required: Role::Counterparty,
                    action: "claim the guaranteed amount",
                });
            }
            if current.is_settled() {
                return Err(EscrowError::AlreadySettled);
            }

            let guaranteed = current.terms().guaranteed_amount;
            if current.escrow_balance() < guaranteed {
                return Err(EscrowError::InsufficientEscrow {
                    needed: guaranteed,
                    available: current.escrow_balance(),
                });
            }

            let mut staged = Staged::begin(current);
            staged.next.mark_settled(SettlementPath::GuaranteedClaim);
            staged.pay(caller, guaranteed, TransferPurpose::Guaranteed)?;

            let remainder = staged.next.escrow_balance();
            if remainder > Decimal::ZERO {
                let funder = staged.next.funder();
                staged.pay(funder, remainder, TransferPurpose::Refund)?;
            }
            Ok(staged)
        })
    }

    /// Take the entire balance after the hard deadline, in whichever role
    /// the caller holds.
    ///
    /// # Errors
    /// See [`SettlementEngine::claim_after_deadline_as`].
    pub fn claim_after_deadline<L: Ledger + ?Sized>(
        &self,
        caller: PartyId,
        ledger: &mut L,
    ) -> Result<()> {
        let role = self.agreement.borrow().role_of(caller)?;
        self.claim_after_deadline_as(role, caller, ledger)
    }

    /// Deadline claim for an explicit claimant role.
    ///
    /// The claim is closed to a role once the *other* party has approved:
    /// that party did its part and the cooperative path applies. A funder
    /// who approved cannot claim either.
    ///
    /// # Errors
    /// - `UnknownCaller` / `WrongParty` if `caller` does not hold `claimant`
    /// - `AlreadySettled` once the agreement is settled
    /// - `DeadlineNotReached` at or before the hard deadline
    /// - `OpposingPartyApproved` if the other party approved
    /// - `FunderApproved` if the funder claims after approving
    /// - `NothingToClaim` on a zero balance
    /// - `TransferRejected` if the transfer fails
    pub fn claim_after_deadline_as<L: Ledger + ?Sized>(
        &self,
        claimant: Role,
        caller: PartyId,
        ledger: &mut L,
    ) -> Result<()> {
        self.transition("claim_after_deadline", ledger, |current, now| {
            if current.role_of(caller)? != claimant {
                return Err(EscrowError::WrongParty {
                    required: claimant,
                    action: "make this deadline claim",
                });
            }
            if current.is_settled() {
                return Err(EscrowError::AlreadySettled);
            }
            if now <= current.max_deadline() {
                return Err(EscrowError::DeadlineNotReached {
                    deadline: current.max_deadline(),
                    now,
                });
            }
            if current.is_approved_by(claimant.opposite()) {
                return Err(EscrowError::OpposingPartyApproved { claimant });
            }
            if claimant.is_funder() && current.is_approved_by(Role::Funder) {
                return Err(EscrowError::FunderApproved);
            }

            let amount = current.escrow_balance();
            if amount.is_zero() {
                return Err(EscrowError::NothingToClaim);
            }

            let recipient = current.party(claimant);
            let mut staged = Staged::begin(current);
            staged.next.mark_settled(SettlementPath::DeadlineClaim(claimant));
            staged.pay(recipient, amount, TransferPurpose::DeadlineClaim)?;
            Ok(staged)
        })
    }

    /// Run one all-or-nothing transition.
    fn transition<L, F>(&self, op: &'static str, ledger: &mut L, stage: F) -> Result<()>
    where
        L: Ledger + ?Sized,
        F: FnOnce(&Agreement, DateTime<Utc>) -> Result<Staged>,
    {
        let _token = self.lock.enter()?;
        let now = self.clock.now();

        let staged = {
            let current = self.agreement.borrow();
            stage(&*current, now).inspect_err(|err| {
                debug!(agreement = %current.id(), op, error = %err, "Transition rejected");
            })?
        };

        // No RefCell borrow is held past this point: recipients may read the
        // engine (and see the last committed state) while being paid.
        self.deliver_all(ledger, &staged.transfers)?;

        let mut accounting = self.accounting.borrow().clone();
        for transfer in &staged.transfers {
            accounting.record_release(transfer.recipient, transfer.amount);
        }
        if let Err(err) = accounting.verify(staged.next.escrow_balance()) {
            error!(
                agreement = %staged.next.id(),
                op,
                error = %err,
                "Conservation check failed, unwinding"
            );
            Self::revert_all(ledger, &staged.transfers);
            return Err(err);
        }

        let Staged {
            next,
            transfers,
            events,
        } = staged;

        if !transfers.is_empty() {
            let released: Decimal = transfers.iter().map(|t| t.amount).sum();
            info!(
                agreement = %next.id(),
                op,
                path = ?next.settlement_path(),
                released = %released,
                remaining = %next.escrow_balance(),
                "Agreement settled"
            );
        }

        *self.agreement.borrow_mut() = next;
        *self.accounting.borrow_mut() = accounting;
        self.publish(events, now);
        Ok(())
    }

    /// Deliver every leg in order. On the first failure, revert the legs
    /// already delivered and return that failure.
    fn deliver_all<L: Ledger + ?Sized>(
        &self,
        ledger: &mut L,
        transfers: &[Transfer],
    ) -> Result<()> {
        for (i, transfer) in transfers.iter().enumerate() {
            if let Err(err) = ledger.deliver(self, transfer) {
                warn!(
                    agreement = %self.id(),
                    recipient = %transfer.recipient,
                    amount = %transfer.amount,
                    purpose = %transfer.purpose,
                    error = %err,
                    "Transfer failed, unwinding transition"
                );
                Self::revert_all(ledger, &transfers[..i]);
                return Err(err);
            }
            debug!(
                agreement = %self.id(),
                recipient = %transfer.recipient,
                amount = %transfer.amount,
                purpose = %transfer.purpose,
                "Transfer delivered"
            );
        }
        Ok(())
    }

    fn revert_all<L: Ledger + ?Sized>(ledger: &mut L, delivered: &[Transfer]) {
        for transfer in delivered.iter().rev() {
            ledger.revert(transfer);
        }
    }

    fn publish(&self, events: Vec<NotificationKind>, at: DateTime<Utc>) {
        let agreement_id = self.id();
        let mut journal = self.journal.borrow_mut();
        for kind in events {
            let sequence = self.next_sequence.get();
            self.next_sequence.set(sequence + 1);

            if journal.len() >= self.config.journal_capacity {
                journal.pop_front();
            }
            debug!(agreement = %agreement_id, sequence, kind = %kind, "Notification");
            journal.push_back(Notification {
                sequence,
                agreement_id,
                kind,
                emitted_at: at,
            });
        }
    }

    // =================================================================
    // Reads
    // =================================================================

    #[must_use]
    pub fn id(&self) -> AgreementId {
        self.agreement.borrow().id()
    }

    #[must_use]
    pub fn terms(&self) -> AgreementTerms {
        self.agreement.borrow().terms().clone()
    }

    #[must_use]
    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    /// Value currently held in escrow.
    #[must_use]
    pub fn balance(&self) -> Decimal {
        self.agreement.borrow().escrow_balance()
    }

    /// `(funder_approved, counterparty_approved)`.
    #[must_use]
    pub fn approvals(&self) -> (bool, bool) {
        self.agreement.borrow().approvals()
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.agreement.borrow().is_settled()
    }

    #[must_use]
    pub fn settlement_path(&self) -> Option<SettlementPath> {
        self.agreement.borrow().settlement_path()
    }

    /// `(ideal_deadline, max_deadline)`.
    #[must_use]
    pub fn deadlines(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let agreement = self.agreement.borrow();
        (agreement.ideal_deadline(), agreement.max_deadline())
    }

    /// Deadline phase at the engine clock's current time.
    #[must_use]
    pub fn deadline_phase(&self) -> DeadlinePhase {
        self.deadline_phase_at(self.clock.now())
    }

    #[must_use]
    pub fn deadline_phase_at(&self, at: DateTime<Utc>) -> DeadlinePhase {
        self.agreement.borrow().deadline_phase_at(at)
    }

    #[must_use]
    pub fn snapshot(&self) -> AgreementSnapshot {
        self.agreement.borrow().snapshot(&self.config.asset)
    }

    /// Value deposited at creation.
    #[must_use]
    pub fn deposited(&self) -> Decimal {
        self.accounting.borrow().deposited()
    }

    #[must_use]
    pub fn total_released(&self) -> Decimal {
        self.accounting.borrow().total_released()
    }

    #[must_use]
    pub fn released_to(&self, party: PartyId) -> Decimal {
        self.accounting.borrow().released_to(party)
    }

    /// Journaled notifications, oldest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.journal.borrow().iter().cloned().collect()
    }

    /// Remove and return every journaled notification.
    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.journal.borrow_mut().drain(..).collect()
    }

    #[cfg(test)]
    fn corrupt_balance(&self, balance: Decimal) {
        self.agreement.borrow_mut().corrupt_balance(balance);
    }
}

impl fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("agreement", &self.snapshot())
            .field("transition_in_progress", &self.lock.is_held())
            .finish_non_exhaustive()
    }
}
