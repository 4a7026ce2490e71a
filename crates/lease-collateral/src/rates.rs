//! Stake pricing of declared hardware.

use lease_core::{Amount, CoreError};
use serde::{Deserialize, Serialize};

use crate::machine::ResourceSpec;

/// Memory rates are per GB while memory is declared in MB.
const MB_PER_GB: u128 = 1024;

/// Per-resource stake rates.
///
/// Required stake for a machine is
///
/// ```text
/// base + cpu*cpu_rate + gpu*gpu_rate + floor(memory_mb*memory_rate/1024)
///      + disk*disk_rate + upload*upload_rate + download*download_rate
/// ```
///
/// CPU speed and GPU memory are recorded but not priced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakeRateTable {
    /// Flat stake per machine.
    pub base_stake_amount: Amount,
    /// Per CPU core.
    pub cpu_rate: Amount,
    /// Per GPU unit.
    pub gpu_rate: Amount,
    /// Per GB of memory.
    pub memory_rate: Amount,
    /// Per GB of disk.
    pub disk_rate: Amount,
    /// Per Mbit/s upload.
    pub upload_rate: Amount,
    /// Per Mbit/s download.
    pub download_rate: Amount,
}

impl StakeRateTable {
    /// Stake required to offer `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Overflow`] if the stake does not fit an amount.
    pub fn calc_stake(&self, spec: &ResourceSpec) -> Result<Amount, CoreError> {
        let memory = self
            .memory_rate
            .checked_mul(u128::from(spec.memory_mb))
            .and_then(|v| v.checked_div(MB_PER_GB))
            .ok_or_else(|| overflow("memory"))?;

        [
            term(self.cpu_rate, spec.cpu_cores, "cpu")?,
            term(self.gpu_rate, spec.gpu_cores, "gpu")?,
            memory,
            term(self.disk_rate, spec.disk_gb, "disk")?,
            term(self.upload_rate, spec.upload_speed, "upload")?,
            term(self.download_rate, spec.download_speed, "download")?,
        ]
        .into_iter()
        .try_fold(self.base_stake_amount, Amount::try_add)
    }
}

fn term(rate: Amount, quantity: u64, resource: &str) -> Result<Amount, CoreError> {
    rate.checked_mul(u128::from(quantity))
        .ok_or_else(|| overflow(resource))
}

fn overflow(resource: &str) -> CoreError {
    CoreError::Overflow(format!("{resource} stake term"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn scenario_rates() -> StakeRateTable {
        StakeRateTable {
            base_stake_amount: Amount::new(500),
            cpu_rate: Amount::new(100),
            gpu_rate: Amount::ZERO,
            memory_rate: Amount::new(20),
            disk_rate: Amount::new(2),
            upload_rate: Amount::new(10),
            download_rate: Amount::new(5),
        }
    }

    fn scenario_spec() -> ResourceSpec {
        ResourceSpec {
            cpu_cores: 4,
            memory_mb: 8192,
            disk_gb: 100,
            upload_speed: 50,
            download_speed: 50,
            ..ResourceSpec::default()
        }
    }

    #[test]
    fn reference_machine_requires_2010() {
        let stake = scenario_rates().calc_stake(&scenario_spec()).unwrap();
        assert_eq!(stake, Amount::new(2010));
    }

    #[test_case(51, 0; "truncates to zero")]
    #[test_case(1023, 19; "just under a gigabyte")]
    #[test_case(1024, 20; "one gigabyte")]
    #[test_case(1535, 29; "truncates fractional gigabytes")]
    #[test_case(8192, 160; "eight gigabytes")]
    fn memory_truncates_per_gigabyte(memory_mb: u64, expected: u128) {
        let rates = StakeRateTable {
            memory_rate: Amount::new(20),
            ..StakeRateTable::default()
        };
        let spec = ResourceSpec {
            memory_mb,
            ..ResourceSpec::default()
        };
        assert_eq!(rates.calc_stake(&spec).unwrap(), Amount::new(expected));
    }

    #[test]
    fn unpriced_fields_do_not_matter() {
        let mut spec = scenario_spec();
        spec.cpu_speed = 4_000;
        spec.gpu_memory = 80_000;
        assert_eq!(scenario_rates().calc_stake(&spec).unwrap(), Amount::new(2010));
    }

    #[test]
    fn overflow_is_reported() {
        let rates = StakeRateTable {
            cpu_rate: Amount::MAX,
            ..StakeRateTable::default()
        };
        let spec = ResourceSpec {
            cpu_cores: 2,
            ..ResourceSpec::default()
        };
        assert!(matches!(rates.calc_stake(&spec), Err(CoreError::Overflow(_))));
    }

    proptest! {
        #[test]
        fn stake_is_monotonic_in_resources(
            cpu in 0u64..1_000,
            mem in 0u64..1_000_000,
            extra_cpu in 0u64..100,
            extra_mem in 0u64..100_000,
        ) {
            let rates = scenario_rates();
            let small = ResourceSpec { cpu_cores: cpu, memory_mb: mem, ..ResourceSpec::default() };
            let large = ResourceSpec {
                cpu_cores: cpu + extra_cpu,
                memory_mb: mem + extra_mem,
                ..ResourceSpec::default()
            };
            prop_assert!(rates.calc_stake(&small).unwrap() <= rates.calc_stake(&large).unwrap());
        }

        #[test]
        fn stake_matches_closed_form(
            cpu in 0u64..10_000,
            gpu in 0u64..64,
            mem in 0u64..10_000_000,
            disk in 0u64..100_000,
            up in 0u64..100_000,
            down in 0u64..100_000,
        ) {
            let rates = StakeRateTable { gpu_rate: Amount::new(7_000), ..scenario_rates() };
            let spec = ResourceSpec {
                cpu_cores: cpu,
                gpu_cores: gpu,
                memory_mb: mem,
                disk_gb: disk,
                upload_speed: up,
                download_speed: down,
                ..ResourceSpec::default()
            };
            let expected = 500
                + u128::from(cpu) * 100
                + u128::from(gpu) * 7_000
                + u128::from(mem) * 20 / 1024
                + u128::from(disk) * 2
                + u128::from(up) * 10
                + u128::from(down) * 5;
            prop_assert_eq!(rates.calc_stake(&spec).unwrap(), Amount::new(expected));
        }
    }
}
