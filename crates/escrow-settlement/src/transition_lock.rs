//! Re-entrancy guard for settlement transitions.
//!
//! Outbound transfers hand control to recipient code, which holds a shared
//! reference to the engine and may call back into it. The engine holds a
//! [`TransitionToken`] for the whole transition, so any nested mutating call
//! fails with [`EscrowError::TransitionInProgress`] instead of observing a
//! half-applied transition.

use std::cell::Cell;

use escrow_types::{EscrowError, Result};

/// Single-slot lock guarding the engine's mutating transitions.
#[derive(Debug, Default)]
pub struct TransitionLock {
    held: Cell<bool>,
}

impl TransitionLock {
    /// Create an unlocked guard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            held: Cell::new(false),
        }
    }

    /// Whether a transition currently holds the lock.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    /// Acquire the lock for the duration of a transition.
    ///
    /// # Errors
    /// Returns [`EscrowError::TransitionInProgress`] if already held.
    pub fn enter(&self) -> Result<TransitionToken<'_>> {
        if self.held.replace(true) {
            return Err(EscrowError::TransitionInProgress);
        }
        Ok(TransitionToken { lock: self })
    }
}

/// Proof that the holder owns the transition lock. Releases on drop,
/// including on early `?` returns.
#[derive(Debug)]
pub struct TransitionToken<'a> {
    lock: &'a TransitionLock,
}

impl Drop for TransitionToken<'_> {
    fn drop(&mut self) {
        self.lock.held.set(false);
    }
}
