//! Audit sinks.
//!
//! A sink receives records only after the operation that produced them has
//! committed.

use parking_lot::Mutex;

use crate::events::{AuditRecord, Severity};

/// Destination for committed audit records.
pub trait AuditSink: Send + Sync {
    /// Logs one record.
    fn log(&self, record: &AuditRecord);

    /// Logs the record if its severity is at or above `min_severity`.
    fn log_if_severe(&self, record: &AuditRecord, min_severity: Severity) {
        if record.severity() >= min_severity {
            self.log(record);
        }
    }
}

/// Sink that emits records through `tracing`.
///
/// - Info, Low → `tracing::info!`
/// - Medium → `tracing::warn!`
/// - High → `tracing::error!`
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink {
    prefix: Option<String>,
}

impl TracingAuditSink {
    /// Creates a sink with the default `LEDGER` prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink with a custom message prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl AuditSink for TracingAuditSink {
    fn log(&self, record: &AuditRecord) {
        let event_id = record.event_id;
        let sequence = record.sequence;
        let event_type = record.event_type();
        let severity = record.severity();
        let at = record.at;
        let actor = record.actor;
        let json = record.to_json().unwrap_or_else(|_| "{}".to_string());
        let prefix = self.prefix.as_deref().unwrap_or("LEDGER");

        match severity {
            Severity::Info | Severity::Low => {
                tracing::info!(
                    target: "lease_audit",
                    %event_id, sequence, %event_type, %severity, %at, %actor,
                    event_json = %json,
                    "[{prefix}] {event_type}"
                );
            }
            Severity::Medium => {
                tracing::warn!(
                    target: "lease_audit",
                    %event_id, sequence, %event_type, %severity, %at, %actor,
                    event_json = %json,
                    "[{prefix}] {event_type}"
                );
            }
            Severity::High => {
                tracing::error!(
                    target: "lease_audit",
                    %event_id, sequence, %event_type, %severity, %at, %actor,
                    event_json = %json,
                    "[{prefix}] {event_type}"
                );
            }
        }
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Event types logged so far, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.records.lock().iter().map(AuditRecord::event_type).collect()
    }

    /// Forgets every record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn log(&self, record: &AuditRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl NoopAuditSink {
    /// Creates a no-op sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditSink for NoopAuditSink {
    fn log(&self, _record: &AuditRecord) {}
}

impl<T: AuditSink + ?Sized> AuditSink for std::sync::Arc<T> {
    fn log(&self, record: &AuditRecord) {
        (**self).log(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Journal, LedgerEvent};
    use lease_core::{Amount, MachineId, Principal, ProviderId, Timestamp};

    fn records() -> Vec<AuditRecord> {
        let mut journal = Journal::new();
        journal.emit(
            Timestamp::from_secs(10),
            Principal::ZERO,
            LedgerEvent::ProviderJailed {
                provider: ProviderId::new(1),
                jailed: false,
            },
        );
        journal.emit(
            Timestamp::from_secs(11),
            Principal::ZERO,
            LedgerEvent::StakeSlashed {
                provider: ProviderId::new(1),
                machine: MachineId::new(0),
                amount: Amount::new(5),
                reason: "fraud".to_string(),
            },
        );
        journal.drain()
    }

    #[test]
    fn memory_sink_collects_in_order() {
        let sink = MemoryAuditSink::new();
        for record in records() {
            sink.log(&record);
        }
        assert_eq!(sink.event_types(), vec!["provider_jailed", "stake_slashed"]);
        sink.clear();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn log_if_severe_filters() {
        let sink = MemoryAuditSink::new();
        for record in records() {
            sink.log_if_severe(&record, Severity::High);
        }
        assert_eq!(sink.event_types(), vec!["stake_slashed"]);
    }

    #[test]
    fn tracing_sink_does_not_panic() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let sink = TracingAuditSink::with_prefix("TEST");
        for record in records() {
            sink.log(&record);
        }
        NoopAuditSink::new().log(&records()[0]);
    }
}
