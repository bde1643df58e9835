//! Reentrancy guard for mutating entry points.
//!
//! A single call-in-progress flag covers the whole mutating boundary. The
//! returned token clears the flag on drop, so every exit path releases it,
//! including early returns through `?`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Call-in-progress flag shared by all mutating entry points
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    entered: Arc<AtomicBool>,
}

/// Held for the duration of a mutating call
#[derive(Debug)]
pub struct GuardToken {
    entered: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Create an unlocked guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the guarded section, failing if a call is already in progress
    pub fn enter(&self) -> Result<GuardToken> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Reentrancy)?;
        Ok(GuardToken {
            entered: Arc::clone(&self.entered),
        })
    }

    /// Whether a call is currently in progress
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.entered.store(false, Ordering::Release);
    }
}
