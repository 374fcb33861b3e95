// sampler-core/src/sampling/partition.rs

use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

/// What to do with the `N mod P` samples that do not divide evenly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemainderPolicy {
    /// Every worker gets exactly `floor(N / P)` samples; the trailing
    /// `N mod P` positions of the ordering are not read that epoch.
    #[default]
    Drop,
    /// The first `N mod P` workers get one extra sample each.
    Distribute,
}

/// Remainder handling used unless a run asks for something else.
pub const DEFAULT_REMAINDER_POLICY: RemainderPolicy = RemainderPolicy::Drop;

impl FromStr for RemainderPolicy {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "drop" => Ok(RemainderPolicy::Drop),
            "distribute" => Ok(RemainderPolicy::Distribute),
            _ => Err(RuntimeError::config(format!(
                "unknown remainder policy: '{s}'. Expected 'drop' or 'distribute'"
            ))),
        }
    }
}

/// A contiguous window of the global ordering owned by one worker for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardDescriptor {
    /// Number of ordering positions in the window.
    pub count: u64,
    /// First ordering position of the window.
    pub offset: u64,
}

impl ShardDescriptor {
    /// One past the last ordering position of the window.
    pub fn end(&self) -> u64 {
        self.offset + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The window as a range of ordering positions.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.end()
    }
}

/// Computes the shard of `worker_id` with the default drop-remainder policy.
///
/// `count = floor(total / workers)` and `offset = worker_id * count`.
///
/// # Errors
///
/// Returns an error if `workers` is zero or `worker_id >= workers`.
pub fn partition(total: u64, workers: u32, worker_id: u32) -> Result<ShardDescriptor> {
    partition_with(total, workers, worker_id, DEFAULT_REMAINDER_POLICY)
}

/// Computes the shard of `worker_id` under an explicit remainder policy.
///
/// Windows of workers `0..workers` are pairwise disjoint and laid out back to
/// back from position 0.
///
/// # Errors
///
/// Returns an error if `workers` is zero or `worker_id >= workers`.
pub fn partition_with(
    total: u64,
    workers: u32,
    worker_id: u32,
    policy: RemainderPolicy,
) -> Result<ShardDescriptor> {
    if workers == 0 {
        return Err(RuntimeError::config("number of workers must be greater than 0"));
    }
    if worker_id >= workers {
        return Err(RuntimeError::invalid_worker(worker_id, workers));
    }

    let p = u64::from(workers);
    let w = u64::from(worker_id);
    let base = total / p;

    let shard = match policy {
        RemainderPolicy::Drop => ShardDescriptor {
            count: base,
            offset: w * base,
        },
        RemainderPolicy::Distribute => {
            let remainder = total % p;
            let extra = u64::from(w < remainder);
            ShardDescriptor {
                count: base + extra,
                offset: w * base + w.min(remainder),
            }
        }
    };

    Ok(shard)
}

/// Number of ordering positions no worker reads in an epoch.
pub fn excluded_samples(total: u64, workers: u32, policy: RemainderPolicy) -> u64 {
    match (policy, workers) {
        (_, 0) => total,
        (RemainderPolicy::Drop, p) => total % u64::from(p),
        (RemainderPolicy::Distribute, _) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_shards(total: u64, workers: u32, policy: RemainderPolicy) -> Vec<ShardDescriptor> {
        (0..workers)
            .map(|w| partition_with(total, workers, w, policy).unwrap())
            .collect()
    }

    #[test]
    fn test_even_split() {
        let shards = all_shards(100, 4, RemainderPolicy::Drop);
        for (w, shard) in shards.iter().enumerate() {
            assert_eq!(shard.count, 25);
            assert_eq!(shard.offset, 25 * w as u64);
        }
    }

    #[test]
    fn test_drop_remainder_scenario() {
        // 17 samples over 3 workers: 5 each, positions 15 and 16 never assigned
        let shards = all_shards(17, 3, RemainderPolicy::Drop);
        let counts: Vec<u64> = shards.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![5, 5, 5]);
        assert_eq!(shards.last().unwrap().end(), 15);
        assert_eq!(excluded_samples(17, 3, RemainderPolicy::Drop), 2);
    }

    #[test]
    fn test_disjoint_and_equal_under_drop() {
        for total in 0..60u64 {
            for workers in 1..12u32 {
                let shards = all_shards(total, workers, RemainderPolicy::Drop);
                let expected = total / u64::from(workers);

                let mut covered = vec![false; total as usize];
                for shard in &shards {
                    assert_eq!(shard.count, expected, "N={total} P={workers}");
                    for pos in shard.range() {
                        assert!(!covered[pos as usize], "overlap at {pos}");
                        covered[pos as usize] = true;
                    }
                }

                let union = covered.iter().filter(|&&c| c).count() as u64;
                assert_eq!(union, u64::from(workers) * expected);
                // Only the trailing remainder positions stay uncovered
                assert!(covered[..union as usize].iter().all(|&c| c));
            }
        }
    }

    #[test]
    fn test_distribute_covers_everything() {
        for total in 0..60u64 {
            for workers in 1..12u32 {
                let shards = all_shards(total, workers, RemainderPolicy::Distribute);

                let mut next = 0;
                for shard in &shards {
                    assert_eq!(shard.offset, next, "gap or overlap N={total} P={workers}");
                    next = shard.end();
                }
                assert_eq!(next, total);

                let max = shards.iter().map(|s| s.count).max().unwrap();
                let min = shards.iter().map(|s| s.count).min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_more_workers_than_samples() {
        let shard = partition(3, 8, 5).unwrap();
        assert!(shard.is_empty());
        assert_eq!(shard.offset, 0);
    }

    #[test]
    fn test_zero_workers() {
        assert!(partition(10, 0, 0).is_err());
    }

    #[test]
    fn test_worker_out_of_range() {
        let err = partition(10, 4, 4).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidWorker { worker_id: 4, workers: 4 }));
    }

    #[test]
    fn test_remainder_policy_parse() {
        assert_eq!("drop".parse::<RemainderPolicy>().unwrap(), RemainderPolicy::Drop);
        assert_eq!(
            "Distribute".parse::<RemainderPolicy>().unwrap(),
            RemainderPolicy::Distribute
        );
        assert!("round".parse::<RemainderPolicy>().is_err());
        assert_eq!(DEFAULT_REMAINDER_POLICY, RemainderPolicy::Drop);
    }
}
