//! # escrow-settlement
//!
//! **Settlement engine** for a two-party escrow: a funder deposits value,
//! a counterparty performs off-system work, and the engine decides who is
//! paid what, and when.
//!
//! ## Settlement paths
//!
//! Exactly one of these fires per agreement, after which it is terminal:
//! - **Mutual approval**: both parties approve; full payment
//!   (`unit_rate * units_required`) goes to the counterparty
//! - **Guaranteed claim**: the counterparty takes the guaranteed floor and
//!   the remainder is refunded to the funder
//! - **Deadline claim**: after the hard deadline, either party takes the
//!   whole balance, unless the *other* party has already approved
//!
//! ## Safety properties
//!
//! - All-or-nothing transitions: state, transfers and notifications commit
//!   together or not at all
//! - Re-entrant calls from recipient code are rejected
//! - `deposited == released + balance` is verified before every commit

pub mod accounting;
pub mod agreement;
pub mod clock;
pub mod engine;
pub mod ledger;
pub mod transition_lock;

pub use accounting::ValueAccounting;
pub use agreement::{Agreement, AgreementSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::SettlementEngine;
pub use ledger::{InMemoryLedger, Ledger};
pub use transition_lock::{TransitionLock, TransitionToken};
