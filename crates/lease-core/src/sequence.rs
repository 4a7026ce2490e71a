//! Monotonic id generator.

use serde::{Deserialize, Serialize};

/// Hands out ids `1, 2, 3, ...`.
///
/// Each table owns its own sequence; there are no process-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    next: u64,
}

impl Sequence {
    /// A sequence whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next id and advances.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of ids issued so far.
    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.next - 1
    }

    /// Whether `id` has been issued by this sequence.
    #[must_use]
    pub const fn contains(&self, id: u64) -> bool {
        id >= 1 && id < self.next
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}
