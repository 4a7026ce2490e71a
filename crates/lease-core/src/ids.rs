//! Typed identifiers.
//!
//! Every table in the ledger is keyed by one of these ids. Records refer to
//! each other through ids only, never through references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An account address: providers, app owners, operators, verifiers, vaults.
pub type Principal = alloy_primitives::Address;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw id.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw id.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

numeric_id!(
    /// Non-fungible ownership token id, the anchor of provider identity.
    IdentityId,
    "identity"
);

numeric_id!(
    /// Provider id.
    ProviderId,
    "provider"
);

numeric_id!(
    /// Index of a machine within its provider's machine list.
    MachineId,
    "machine"
);

numeric_id!(
    /// Application id, assigned sequentially from 1.
    AppId,
    "app"
);

impl MachineId {
    /// The machine's slot in its provider's list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A fungible asset, identified by its symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Creates an asset id from a symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Returns the symbol.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
