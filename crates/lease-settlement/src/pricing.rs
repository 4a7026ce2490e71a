//! App price tables and reward formulas.

use lease_attestation::UsageReport;
use lease_core::{Amount, CoreError};
use serde::{Deserialize, Serialize};

/// Usage counters are reported in units of `1 / UNITS_PER_GB` per priced unit.
pub const UNITS_PER_GB: u128 = 1_000_000_000;

/// Per-resource prices of an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable {
    /// Per reported CPU unit.
    pub per_cpu: Amount,
    /// Per GPU unit-second, in GB units.
    pub per_gpu: Amount,
    /// Per memory GB-second.
    pub per_memory_gb: Amount,
    /// Per storage GB-second.
    pub per_storage_gb: Amount,
    /// Per GB transferred.
    pub per_bandwidth_gb: Amount,
}

/// Turns a usage report into a gross reward.
pub trait RewardFormula {
    /// Gross reward for `usage` at `prices`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Overflow`] if the reward does not fit an amount.
    fn compute(&self, usage: &UsageReport, prices: &PriceTable) -> Result<Amount, CoreError>;
}

/// `floor(x * duration / 1e9) * price` for time-weighted resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplyFirst;

/// `floor(x / 1e9) * duration * price` for time-weighted resources.
///
/// Truncates before scaling by duration, so it never pays more than
/// [`MultiplyFirst`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DivideFirst;

impl RewardFormula for MultiplyFirst {
    fn compute(&self, usage: &UsageReport, prices: &PriceTable) -> Result<Amount, CoreError> {
        let duration = u128::from(usage.duration);
        let weighted = |used: u64| u128::from(used) * duration / UNITS_PER_GB;
        sum(usage, prices, weighted)
    }
}

impl RewardFormula for DivideFirst {
    fn compute(&self, usage: &UsageReport, prices: &PriceTable) -> Result<Amount, CoreError> {
        let duration = u128::from(usage.duration);
        let weighted = |used: u64| u128::from(used) / UNITS_PER_GB * duration;
        sum(usage, prices, weighted)
    }
}

/// Terms shared by every formula version; only the time weighting differs.
fn sum(
    usage: &UsageReport,
    prices: &PriceTable,
    weighted: impl Fn(u64) -> u128,
) -> Result<Amount, CoreError> {
    let bandwidth_gb = (u128::from(usage.used_upload_bytes)
        + u128::from(usage.used_download_bytes))
        / UNITS_PER_GB;

    [
        ("bandwidth", prices.per_bandwidth_gb, bandwidth_gb),
        ("cpu", prices.per_cpu, u128::from(usage.used_cpu)),
        ("memory", prices.per_memory_gb, weighted(usage.used_memory)),
        ("storage", prices.per_storage_gb, weighted(usage.used_storage)),
        ("gpu", prices.per_gpu, weighted(usage.used_gpu)),
    ]
    .into_iter()
    .try_fold(Amount::ZERO, |total, (resource, price, quantity)| {
        price
            .checked_mul(quantity)
            .and_then(|term| total.checked_add(term))
            .ok_or_else(|| CoreError::Overflow(format!("{resource} reward term")))
    })
}

/// Selectable reward formula versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaVersion {
    /// [`MultiplyFirst`].
    #[default]
    MultiplyFirst,
    /// [`DivideFirst`].
    DivideFirst,
}

impl FormulaVersion {
    /// Returns the version name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MultiplyFirst => "multiply_first",
            Self::DivideFirst => "divide_first",
        }
    }
}

impl std::fmt::Display for FormulaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RewardFormula for FormulaVersion {
    fn compute(&self, usage: &UsageReport, prices: &PriceTable) -> Result<Amount, CoreError> {
        match self {
            Self::MultiplyFirst => MultiplyFirst.compute(usage, prices),
            Self::DivideFirst => DivideFirst.compute(usage, prices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lease_core::{AppId, ProviderId};
    use proptest::prelude::*;
    use test_case::test_case;

    const GB: u64 = 1_000_000_000;

    fn usage() -> UsageReport {
        UsageReport::new(ProviderId::new(1), AppId::new(1), "peer")
    }

    fn prices() -> PriceTable {
        PriceTable {
            per_cpu: Amount::new(1),
            per_gpu: Amount::new(50),
            per_memory_gb: Amount::new(3),
            per_storage_gb: Amount::new(2),
            per_bandwidth_gb: Amount::new(7),
        }
    }

    #[test]
    fn cpu_is_not_time_weighted() {
        let report = usage().with_cpu(500).with_duration(3600);
        let prices = PriceTable {
            per_cpu: Amount::new(1),
            ..PriceTable::default()
        };
        assert_eq!(MultiplyFirst.compute(&report, &prices).unwrap(), Amount::new(500));
        assert_eq!(DivideFirst.compute(&report, &prices).unwrap(), Amount::new(500));
    }

    #[test]
    fn bandwidth_sums_before_truncating() {
        let report = usage().with_bandwidth(GB / 2, GB / 2);
        assert_eq!(MultiplyFirst.compute(&report, &prices()).unwrap(), Amount::new(7));
    }

    #[test_case(FormulaVersion::MultiplyFirst, 5; "multiply first keeps fractions")]
    #[test_case(FormulaVersion::DivideFirst, 0; "divide first truncates early")]
    fn truncation_order(version: FormulaVersion, expected: u128) {
        // half a GB of memory for 10 seconds
        let report = usage().with_memory(GB / 2).with_duration(10);
        let prices = PriceTable {
            per_memory_gb: Amount::new(1),
            ..PriceTable::default()
        };
        assert_eq!(version.compute(&report, &prices).unwrap(), Amount::new(expected));
    }

    #[test]
    fn full_formula() {
        let report = usage()
            .with_cpu(4)
            .with_gpu(2 * GB)
            .with_memory(8 * GB)
            .with_storage(GB)
            .with_bandwidth(3 * GB, GB)
            .with_duration(60);
        // 4*7 + 4*1 + 480*3 + 60*2 + 120*50
        let expected = 28 + 4 + 1440 + 120 + 6000;
        assert_eq!(MultiplyFirst.compute(&report, &prices()).unwrap(), Amount::new(expected));
        assert_eq!(DivideFirst.compute(&report, &prices()).unwrap(), Amount::new(expected));
    }

    #[test]
    fn overflow_is_reported() {
        let report = usage().with_cpu(2);
        let prices = PriceTable {
            per_cpu: Amount::MAX,
            ..PriceTable::default()
        };
        assert!(MultiplyFirst.compute(&report, &prices).is_err());
    }

    #[test]
    fn default_version_is_multiply_first() {
        assert_eq!(FormulaVersion::default(), FormulaVersion::MultiplyFirst);
        assert_eq!(FormulaVersion::DivideFirst.to_string(), "divide_first");
    }

    proptest! {
        #[test]
        fn divide_first_never_pays_more(
            mem in 0u64..100 * GB,
            storage in 0u64..100 * GB,
            gpu in 0u64..8 * GB,
            duration in 0u64..86_400,
        ) {
            let report = usage()
                .with_memory(mem)
                .with_storage(storage)
                .with_gpu(gpu)
                .with_duration(duration);
            let multiply = MultiplyFirst.compute(&report, &prices()).unwrap();
            let divide = DivideFirst.compute(&report, &prices()).unwrap();
            prop_assert!(divide <= multiply);
        }
    }
}
