//! Error types for lease-collateral.

use lease_core::{Amount, CoreError, ErrorKind, MachineId, Principal, ProviderId, Timestamp};
use thiserror::Error;

/// Errors that can occur in collateral operations.
#[derive(Debug, Error)]
pub enum CollateralError {
    /// Caller does not control the provider.
    #[error("{caller} does not control {provider}")]
    NotController {
        /// Target provider.
        provider: ProviderId,
        /// Offending caller.
        caller: Principal,
    },

    /// Caller does not own the provider's identity.
    #[error("{caller} does not own {provider}")]
    NotOwner {
        /// Target provider.
        provider: ProviderId,
        /// Offending caller.
        caller: Principal,
    },

    /// Caller is not the ledger administrator.
    #[error("{0} is not the collateral admin")]
    NotAdmin(Principal),

    /// Provider does not exist.
    #[error("provider not found: {0}")]
    ProviderNotFound(ProviderId),

    /// Machine slot does not exist.
    #[error("machine {machine} not found for {provider}")]
    MachineNotFound {
        /// Provider.
        provider: ProviderId,
        /// Machine.
        machine: MachineId,
    },

    /// Provider has been slashed and is frozen.
    #[error("{0} is slashed")]
    ProviderSlashed(ProviderId),

    /// Operation needs an active machine.
    #[error("machine {machine} of {provider} is not active")]
    MachineNotActive {
        /// Provider.
        provider: ProviderId,
        /// Machine.
        machine: MachineId,
    },

    /// Operation needs a removed machine.
    #[error("machine {machine} of {provider} is still active")]
    MachineStillActive {
        /// Provider.
        provider: ProviderId,
        /// Machine.
        machine: MachineId,
    },

    /// Stake of this machine was already returned.
    #[error("withdrawal for machine {machine} of {provider} already processed")]
    AlreadyWithdrawn {
        /// Provider.
        provider: ProviderId,
        /// Machine.
        machine: MachineId,
    },

    /// Withdrawal lock has not expired.
    #[error("stake locked until {unlock_time} (now {now})")]
    WithdrawalLocked {
        /// Earliest withdrawal time.
        unlock_time: Timestamp,
        /// Time of the attempt.
        now: Timestamp,
    },

    /// An upgrade lowered a declared resource.
    #[error("resource downgrade on {field}: {current} -> {requested}")]
    ResourceDowngrade {
        /// Resource field.
        field: &'static str,
        /// Current value.
        current: u64,
        /// Requested value.
        requested: u64,
    },

    /// An upgrade would require less stake than is held.
    #[error("required stake {required} is below current stake {current}")]
    StakeDecrease {
        /// Stake currently held.
        current: Amount,
        /// Stake the new spec requires.
        required: Amount,
    },

    /// Slash larger than the machine's stake.
    #[error("slash of {requested} exceeds machine stake {stake}")]
    SlashExceedsStake {
        /// Machine stake.
        stake: Amount,
        /// Requested slash.
        requested: Amount,
    },

    /// Sweep larger than the slashed pool.
    #[error("sweep of {requested} exceeds slashed pool {available}")]
    SweepExceedsPool {
        /// Slashed value held.
        available: Amount,
        /// Requested sweep.
        requested: Amount,
    },

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Error from a collaborator or primitive.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CollateralError {
    /// Maps the error onto the ledger failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotController { .. } | Self::NotOwner { .. } | Self::NotAdmin(_) => {
                ErrorKind::Authorization
            }
            Self::ProviderNotFound(_)
            | Self::MachineNotFound { .. }
            | Self::ProviderSlashed(_)
            | Self::MachineNotActive { .. }
            | Self::MachineStillActive { .. }
            | Self::AlreadyWithdrawn { .. }
            | Self::WithdrawalLocked { .. }
            | Self::InvalidConfig(_) => ErrorKind::State,
            Self::ResourceDowngrade { .. }
            | Self::StakeDecrease { .. }
            | Self::SlashExceedsStake { .. }
            | Self::SweepExceedsPool { .. } => ErrorKind::Arithmetic,
            Self::Core(e) => e.kind(),
        }
    }
}

/// Result type alias for collateral operations.
pub type Result<T> = std::result::Result<T, CollateralError>;
