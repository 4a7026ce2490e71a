//! Ledger time and call context.
//!
//! The ledger never reads a wall clock. Every operation is executed at a
//! timestamp supplied by the ordering layer in its [`CallContext`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Principal;

/// Seconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from Unix seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns Unix seconds.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// Adds a number of seconds, saturating at the end of time.
    #[must_use]
    pub const fn plus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Converts to a calendar time for display.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        i64::try_from(self.0)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}s", self.0),
        }
    }
}

/// Who is calling, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// The principal that submitted the operation.
    pub caller: Principal,
    /// Ledger time at which the operation executes.
    pub now: Timestamp,
}

impl CallContext {
    /// Creates a context.
    #[must_use]
    pub const fn new(caller: Principal, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_secs_saturates() {
        assert_eq!(Timestamp::from_secs(u64::MAX).plus_secs(1).as_secs(), u64::MAX);
        assert_eq!(Timestamp::from_secs(10).plus_secs(5), Timestamp::from_secs(15));
    }

    #[test]
    fn display_is_rfc3339() {
        assert_eq!(Timestamp::ZERO.to_string(), "1970-01-01T00:00:00+00:00");
    }
}
