//! Error types for lease-attestation.

use lease_core::{CoreError, Digest, ErrorKind, Principal};
use thiserror::Error;

/// Errors that can occur while verifying an attestation.
#[derive(Debug, Error)]
pub enum AttestationError {
    /// The digest has already been consumed.
    #[error("attestation {0} already consumed")]
    Replay(Digest),

    /// Signature payload has the wrong length for the verification mode.
    #[error("malformed signature payload: {len} bytes")]
    MalformedPayload {
        /// Payload length in bytes.
        len: usize,
    },

    /// Recovered signer is not authorized for the app.
    #[error("signer {0} is not authorized")]
    UnauthorizedSigner(Principal),

    /// Too few valid verifier signatures.
    #[error("quorum not met: {valid} valid of {verifiers} verifiers")]
    QuorumNotMet {
        /// Signatures that recovered to an active listed verifier.
        valid: usize,
        /// Size of the verifier set.
        verifiers: usize,
    },

    /// Signature could not be parsed or recovered.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AttestationError {
    /// Maps the error onto the ledger failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Replay(_) => ErrorKind::Replay,
            Self::MalformedPayload { .. }
            | Self::UnauthorizedSigner(_)
            | Self::QuorumNotMet { .. } => ErrorKind::Integrity,
            Self::Core(e) => e.kind(),
        }
    }
}

/// Result type alias for attestation operations.
pub type Result<T> = std::result::Result<T, AttestationError>;
