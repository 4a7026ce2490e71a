//! Error types for lease-settlement.

use lease_attestation::AttestationError;
use lease_core::{Amount, AppId, CoreError, ErrorKind, Principal, ProviderId};
use thiserror::Error;

/// Errors that can occur in settlement operations.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Caller is not the settlement administrator.
    #[error("{0} is not the settlement admin")]
    NotAdmin(Principal),

    /// Caller does not own the app.
    #[error("{caller} does not own {app}")]
    NotAppOwner {
        /// App.
        app: AppId,
        /// Offending caller.
        caller: Principal,
    },

    /// Caller does not own the provider identity.
    #[error("{caller} does not own {provider}")]
    NotProviderOwner {
        /// Provider.
        provider: ProviderId,
        /// Offending caller.
        caller: Principal,
    },

    /// App does not exist.
    #[error("app not found: {0}")]
    AppNotFound(AppId),

    /// Provider does not exist.
    #[error("provider not found: {0}")]
    ProviderNotFound(ProviderId),

    /// Symbol already taken or empty.
    #[error("invalid app symbol: {0:?}")]
    InvalidSymbol(String),

    /// Nothing of the budget is left.
    #[error("budget of {0} exhausted")]
    BudgetExhausted(AppId),

    /// Reward would push spending past the budget.
    #[error("reward {reward} exceeds remaining budget of {app} ({spent} of {budget} spent)")]
    BudgetExceeded {
        /// App.
        app: AppId,
        /// Budget.
        budget: Amount,
        /// Already spent.
        spent: Amount,
        /// Reward of the rejected report.
        reward: Amount,
    },

    /// Peer is not a node of the provider.
    #[error("peer {peer_id:?} is not a node of {provider}")]
    UnknownPeer {
        /// Provider.
        provider: ProviderId,
        /// Reported peer.
        peer_id: String,
    },

    /// Provider is jailed.
    #[error("{0} is jailed")]
    ProviderJailed(ProviderId),

    /// Provider is not jailed.
    #[error("{0} is not jailed")]
    ProviderNotJailed(ProviderId),

    /// Verifier is not active in the verifier registry.
    #[error("verifier {0} is not active")]
    InactiveVerifier(Principal),

    /// Deposit of nothing.
    #[error("deposit amount must be positive")]
    ZeroDeposit,

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Attestation rejected.
    #[error(transparent)]
    Attestation(#[from] AttestationError),

    /// Error from a collaborator or primitive.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SettlementError {
    /// Maps the error onto the ledger failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAdmin(_) | Self::NotAppOwner { .. } | Self::NotProviderOwner { .. } => {
                ErrorKind::Authorization
            }
            Self::AppNotFound(_)
            | Self::ProviderNotFound(_)
            | Self::InvalidSymbol(_)
            | Self::BudgetExhausted(_)
            | Self::BudgetExceeded { .. }
            | Self::UnknownPeer { .. }
            | Self::ProviderJailed(_)
            | Self::ProviderNotJailed(_)
            | Self::InactiveVerifier(_)
            | Self::InvalidConfig(_) => ErrorKind::State,
            Self::ZeroDeposit => ErrorKind::Arithmetic,
            Self::Attestation(e) => e.kind(),
            Self::Core(e) => e.kind(),
        }
    }
}

/// Result type alias for settlement operations.
pub type Result<T> = std::result::Result<T, SettlementError>;
