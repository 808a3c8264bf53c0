//! Generation tracking for polling scopes.
//!
//! Each polling scope carries the [`Generation`] that was current when it
//! started. Switching or stopping a scope advances the counter, so any
//! in-flight fetch tagged with the old generation is detected as stale
//! after it resolves and is discarded unreconciled.

use tether_types::Generation;

/// Monotonically increasing generation counter for one scope family.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    /// Create a counter at generation zero (no scope started yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to a fresh generation and return it.
    pub fn advance(&mut self) -> Generation {
        self.current = self.current.next();
        self.current
    }

    /// The generation currently in effect.
    pub fn current(&self) -> Generation {
        self.current
    }

    /// Whether a response tagged with `generation` may still be reconciled.
    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.current
    }
}
