//! Error types for lease-core.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Amount, AssetId, IdentityId, Principal};

/// The failure classes every ledger operation reports.
///
/// Each crate keeps its own error enum and maps every variant onto one of
/// these kinds. An operation that fails for any kind leaves no trace in the
/// ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller is not the owning or operating principal for the target.
    Authorization,
    /// Operation is invalid for the current lifecycle state.
    State,
    /// Attestation digest already consumed.
    Replay,
    /// Signature does not recover to an authorized principal, or quorum not met.
    Integrity,
    /// Insufficient balance or stake, overflow, or a resource downgrade.
    Arithmetic,
}

impl ErrorKind {
    /// Returns the string representation of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::State => "state",
            Self::Replay => "replay",
            Self::Integrity => "integrity",
            Self::Arithmetic => "arithmetic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the primitives and in-memory collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Balance too low for a transfer.
    #[error("insufficient balance of {asset} for {account}: required {required}, available {available}")]
    InsufficientBalance {
        /// Asset being moved.
        asset: AssetId,
        /// Account being debited.
        account: Principal,
        /// Amount required.
        required: Amount,
        /// Amount available.
        available: Amount,
    },

    /// Spender allowance too low for a delegated transfer.
    #[error("insufficient allowance of {asset} from {owner} to {spender}: required {required}, available {available}")]
    InsufficientAllowance {
        /// Asset being moved.
        asset: AssetId,
        /// Account being debited.
        owner: Principal,
        /// Principal spending on the owner's behalf.
        spender: Principal,
        /// Amount required.
        required: Amount,
        /// Allowance available.
        available: Amount,
    },

    /// Arithmetic overflow or underflow.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// Malformed amount literal.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Identity token does not exist.
    #[error("unknown identity: {0}")]
    UnknownIdentity(IdentityId),

    /// Caller does not own the identity token.
    #[error("{caller} does not own identity {id}")]
    NotIdentityOwner {
        /// Token id.
        id: IdentityId,
        /// Offending caller.
        caller: Principal,
    },

    /// Caller is not allowed to perform an administrative action.
    #[error("{0} is not authorized for this action")]
    Unauthorized(Principal),

    /// Signature bytes could not be parsed or recovered.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// Signing failed.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl CoreError {
    /// Maps the error onto the ledger failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientBalance { .. }
            | Self::InsufficientAllowance { .. }
            | Self::Overflow(_)
            | Self::InvalidAmount(_) => ErrorKind::Arithmetic,
            Self::UnknownIdentity(_) => ErrorKind::State,
            Self::NotIdentityOwner { .. } | Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::MalformedSignature(_) | Self::Crypto(_) => ErrorKind::Integrity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display() {
        assert_eq!(ErrorKind::Replay.to_string(), "replay");
        assert_eq!(ErrorKind::Arithmetic.to_string(), "arithmetic");
    }

    #[test]
    fn balance_errors_are_arithmetic() {
        let err = CoreError::InsufficientBalance {
            asset: AssetId::new("LEASE"),
            account: Principal::ZERO,
            required: Amount::new(10),
            available: Amount::new(1),
        };
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
        assert!(err.to_string().contains("required 10"));
    }

    #[test]
    fn ownership_errors_are_authorization() {
        let err = CoreError::NotIdentityOwner {
            id: IdentityId::new(7),
            caller: Principal::ZERO,
        };
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }
}
