//! # lease-audit
//!
//! Audit trail for lease network ledger transitions.
//!
//! Every committed state transition (stake movements, slashing, usage
//! accrual, reward payout, refunds, configuration changes) is recorded as an
//! [`AuditRecord`]. Components append records to a [`Journal`] while an
//! operation runs; the journal is part of the transactional state, so an
//! aborted operation leaves no records behind. Committed records are handed
//! to an [`AuditSink`].
//!
//! ## Example
//!
//! ```rust
//! use lease_audit::{AuditSink, Journal, LedgerEvent, MemoryAuditSink};
//! use lease_core::{Principal, ProviderId, Timestamp};
//!
//! let mut journal = Journal::new();
//! journal.emit(
//!     Timestamp::from_secs(1_700_000_000),
//!     Principal::ZERO,
//!     LedgerEvent::ProviderJailed { provider: ProviderId::new(1), jailed: true },
//! );
//!
//! let sink = MemoryAuditSink::new();
//! for record in journal.drain() {
//!     sink.log(&record);
//! }
//! assert_eq!(sink.records().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod journal;
pub mod logger;

pub use error::{AuditError, Result};
pub use events::{AuditRecord, LedgerEvent, Severity, UsageAccrual};
pub use journal::Journal;
pub use logger::{AuditSink, MemoryAuditSink, NoopAuditSink, TracingAuditSink};
