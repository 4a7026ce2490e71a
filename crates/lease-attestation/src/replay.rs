//! Consumed attestation digests.

use std::collections::BTreeSet;

use lease_core::Digest;
use serde::{Deserialize, Serialize};

use crate::error::{AttestationError, Result};

/// Every digest that has ever been accepted.
///
/// Append-only and never pruned: a digest accepted once is rejected forever.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedMessageSet {
    digests: BTreeSet<Digest>,
}

impl UsedMessageSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `digest` has been consumed.
    #[must_use]
    pub fn contains(&self, digest: &Digest) -> bool {
        self.digests.contains(digest)
    }

    /// Fails if `digest` has been consumed.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Replay`] for a consumed digest.
    pub fn check(&self, digest: &Digest) -> Result<()> {
        if self.contains(digest) {
            Err(AttestationError::Replay(*digest))
        } else {
            Ok(())
        }
    }

    /// Consumes `digest`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Replay`] if it was already consumed.
    pub fn consume(&mut self, digest: Digest) -> Result<()> {
        if self.digests.insert(digest) {
            Ok(())
        } else {
            Err(AttestationError::Replay(digest))
        }
    }

    /// Number of consumed digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Whether nothing has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lease_core::ErrorKind;

    #[test]
    fn digest_is_consumed_once() {
        let mut set = UsedMessageSet::new();
        let digest = Digest::from_bytes([7; 32]);
        assert!(set.check(&digest).is_ok());
        set.consume(digest).unwrap();
        assert!(set.contains(&digest));
        let err = set.consume(digest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Replay);
        assert!(set.check(&digest).is_err());
        assert_eq!(set.len(), 1);
    }
}
