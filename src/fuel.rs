//! The fuel cell: a shared, monotone
//! non-increasing budget debited by every expression node and every
//! atom. Exhaustion is the ultimate runaway guard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared fuel counter. Stored as bits of an `f64` behind an atomic so it
/// can be cheaply cloned into child scopes/contexts without locking.
#[derive(Clone)]
pub struct FuelCell(Arc<AtomicU64>);

impl FuelCell {
    pub fn new(initial: f64) -> Self {
        Self(Arc::new(AtomicU64::new(initial.to_bits())))
    }

    pub fn current(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }

    /// Debits `amount` and returns the remaining fuel. Saturates rather
    /// than panicking on concurrent access; a run's atoms never actually
    /// race each other (single-threaded cooperative), so
    /// this is a correctness belt, not a contention-handling mechanism.
    pub fn debit(&self, amount: f64) -> f64 {
        loop {
            let current = self.0.load(Ordering::SeqCst);
            let current_f = f64::from_bits(current);
            let next_f = current_f - amount;
            if self
                .0
                .compare_exchange(
                    current,
                    next_f.to_bits(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                return next_f;
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.current() <= 0.0
    }
}

/// Per-node evaluator debit.
pub const EXPR_NODE_COST: f64 = 0.01;
/// Per-iteration `while` loop debit.
pub const WHILE_ITER_COST: f64 = 0.1;
