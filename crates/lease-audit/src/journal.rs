//! Transactional event buffer.

use lease_core::{Principal, Timestamp};
use uuid::Uuid;

use crate::events::{AuditRecord, LedgerEvent};

/// Records emitted by an operation that has not yet been committed.
///
/// A journal lives inside the state that an operation mutates. Cloning the
/// state for a trial run clones the journal too, so records from a failed
/// attempt vanish with the discarded copy.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pending: Vec<AuditRecord>,
    sequence: u64,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn emit(&mut self, at: Timestamp, actor: Principal, event: LedgerEvent) {
        self.sequence += 1;
        self.pending.push(AuditRecord {
            event_id: Uuid::new_v4(),
            sequence: self.sequence,
            at,
            actor,
            event,
        });
    }

    /// Takes every buffered record, oldest first.
    pub fn drain(&mut self) -> Vec<AuditRecord> {
        std::mem::take(&mut self.pending)
    }

    /// Records currently buffered.
    #[must_use]
    pub fn pending(&self) -> &[AuditRecord] {
        &self.pending
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total records ever emitted, drained or not.
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lease_core::ProviderId;

    fn jail(provider: u64) -> LedgerEvent {
        LedgerEvent::ProviderJailed {
            provider: ProviderId::new(provider),
            jailed: true,
        }
    }

    #[test]
    fn sequence_survives_drain() {
        let mut journal = Journal::new();
        journal.emit(Timestamp::ZERO, Principal::ZERO, jail(1));
        journal.emit(Timestamp::ZERO, Principal::ZERO, jail(2));
        let first = journal.drain();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].sequence, 2);
        assert!(journal.is_empty());

        journal.emit(Timestamp::ZERO, Principal::ZERO, jail(3));
        assert_eq!(journal.pending()[0].sequence, 3);
        assert_eq!(journal.emitted(), 3);
    }

    #[test]
    fn discarded_clone_leaves_original_untouched() {
        let mut journal = Journal::new();
        let mut trial = journal.clone();
        trial.emit(Timestamp::ZERO, Principal::ZERO, jail(1));
        assert_eq!(trial.len(), 1);
        assert!(journal.drain().is_empty());
    }
}
