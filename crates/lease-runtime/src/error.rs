//! Error types for the marketplace facade.

use lease_collateral::CollateralError;
use lease_core::{CoreError, ErrorKind, Principal};
use lease_settlement::SettlementError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by marketplace operations.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Caller is not the marketplace administrator.
    #[error("{0} is not the marketplace admin")]
    NotAdmin(Principal),

    /// Collateral ledger error.
    #[error(transparent)]
    Collateral(#[from] CollateralError),

    /// Settlement engine error.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// Collaborator error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MarketError {
    /// Maps the error onto the ledger failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAdmin(_) => ErrorKind::Authorization,
            Self::Collateral(e) => e.kind(),
            Self::Settlement(e) => e.kind(),
            Self::Core(e) => e.kind(),
            Self::Config(e) => e.kind(),
        }
    }
}

/// Result type alias for marketplace operations.
pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lease_core::{AppId, ProviderId};
    use test_case::test_case;

    #[test_case(MarketError::NotAdmin(Principal::ZERO), ErrorKind::Authorization ; "not admin")]
    #[test_case(CollateralError::ProviderNotFound(ProviderId::new(1)).into(), ErrorKind::State ; "collateral")]
    #[test_case(SettlementError::BudgetExhausted(AppId::new(1)).into(), ErrorKind::State ; "settlement")]
    #[test_case(CoreError::Overflow("x".to_string()).into(), ErrorKind::Arithmetic ; "core")]
    fn kind_passes_through(err: MarketError, kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }
}
