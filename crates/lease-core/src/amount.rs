//! Token amount type.
//!
//! Amounts are whole base units of whatever asset they denominate. Every
//! arithmetic operation is checked; the ledger never wraps or saturates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::CoreError;

/// Denominator for per-mille rates (fees are expressed as parts per thousand).
pub const PER_MILLE: u128 = 1_000;

/// A non-negative token amount in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    /// Zero amount constant.
    pub const ZERO: Self = Self(0);

    /// Maximum representable amount.
    pub const MAX: Self = Self(u128::MAX);

    /// Creates an amount from base units.
    #[must_use]
    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    /// Returns the amount in base units.
    #[must_use]
    pub const fn units(self) -> u128 {
        self.0
    }

    /// Checked addition. Returns `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. Returns `None` on underflow.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked multiplication by a scalar. Returns `None` on overflow.
    #[must_use]
    pub const fn checked_mul(self, rhs: u128) -> Option<Self> {
        match self.0.checked_mul(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked division by a scalar. Returns `None` if divisor is zero.
    #[must_use]
    pub const fn checked_div(self, rhs: u128) -> Option<Self> {
        match self.0.checked_div(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// `floor(self * rate / 1000)`.
    #[must_use]
    pub const fn per_mille(self, rate: u16) -> Option<Self> {
        match self.0.checked_mul(rate as u128) {
            Some(v) => Some(Self(v / PER_MILLE)),
            None => None,
        }
    }

    /// Returns true if this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Addition that reports overflow as an arithmetic error.
    pub fn try_add(self, rhs: Self) -> Result<Self, CoreError> {
        self.checked_add(rhs)
            .ok_or_else(|| CoreError::Overflow(format!("{self} + {rhs}")))
    }

    /// Subtraction that reports underflow as an arithmetic error.
    pub fn try_sub(self, rhs: Self) -> Result<Self, CoreError> {
        self.checked_sub(rhs)
            .ok_or_else(|| CoreError::Overflow(format!("{self} - {rhs}")))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidAmount(format!("invalid amount: {s:?}")));
        }
        s.parse::<u128>()
            .map(Self)
            .map_err(|e| CoreError::InvalidAmount(e.to_string()))
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
            Repr::Number(n) => Ok(Self::from(n)),
        }
    }
}
