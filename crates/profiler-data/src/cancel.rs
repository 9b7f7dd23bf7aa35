//! Cooperative cancellation shared by every scan phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-way stop flag. Clones observe the same flag.
///
/// The flag goes from `false` to `true` at most once and is never reset, so a
/// worker that saw it set can drop its result without re-checking.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Returns `true` only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
