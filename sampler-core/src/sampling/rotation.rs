// sampler-core/src/sampling/rotation.rs

/// Which shard a worker reads in a given epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochContext {
    pub epoch: u64,
    /// Physical worker id (rank in the group).
    pub worker_id: u32,
    /// Worker id handed to the partitioner for this epoch.
    pub effective_worker_id: u32,
}

/// Rotated worker id for an epoch: `(worker_id + epoch * rank_shift) mod workers`.
///
/// A `rank_shift` of zero disables rotation. Negative shifts rotate the other
/// way. For fixed `epoch` and `rank_shift` the mapping is a bijection on
/// `0..workers`.
pub fn effective_worker_id(epoch: u64, worker_id: u32, workers: u32, rank_shift: i64) -> u32 {
    debug_assert!(workers > 0, "workers must be positive");
    if workers == 0 {
        return worker_id;
    }

    let rotated = i128::from(worker_id) + i128::from(epoch) * i128::from(rank_shift);
    // rem_euclid keeps the result in 0..workers for negative shifts
    rotated.rem_euclid(i128::from(workers)) as u32
}

/// Per-worker helper that stamps out an [`EpochContext`] for each epoch.
#[derive(Debug, Clone, Copy)]
pub struct EpochRotator {
    worker_id: u32,
    workers: u32,
    rank_shift: i64,
}

impl EpochRotator {
    pub fn new(worker_id: u32, workers: u32, rank_shift: i64) -> Self {
        Self {
            worker_id,
            workers,
            rank_shift,
        }
    }

    pub fn context(&self, epoch: u64) -> EpochContext {
        EpochContext {
            epoch,
            worker_id: self.worker_id,
            effective_worker_id: effective_worker_id(
                epoch,
                self.worker_id,
                self.workers,
                self.rank_shift,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_scenario() {
        let worker0: Vec<u32> = (0..4).map(|e| effective_worker_id(e, 0, 4, 1)).collect();
        let worker2: Vec<u32> = (0..4).map(|e| effective_worker_id(e, 2, 4, 1)).collect();
        assert_eq!(worker0, vec![0, 1, 2, 3]);
        assert_eq!(worker2, vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_zero_shift_is_identity() {
        for epoch in 0..10 {
            for w in 0..6 {
                assert_eq!(effective_worker_id(epoch, w, 6, 0), w);
            }
        }
    }

    #[test]
    fn test_bijection() {
        for workers in 1..9u32 {
            for epoch in 0..12u64 {
                for shift in -5..6i64 {
                    let mut seen = vec![false; workers as usize];
                    for w in 0..workers {
                        let id = effective_worker_id(epoch, w, workers, shift);
                        assert!(id < workers);
                        assert!(!seen[id as usize], "collision P={workers} e={epoch} r={shift}");
                        seen[id as usize] = true;
                    }
                }
            }
        }
    }

    #[test]
    fn test_negative_shift() {
        let ids: Vec<u32> = (0..4).map(|e| effective_worker_id(e, 0, 4, -1)).collect();
        assert_eq!(ids, vec![0, 3, 2, 1]);
    }

    #[test]
    fn test_large_epoch_does_not_overflow() {
        let id = effective_worker_id(u64::MAX, 3, 7, i64::MAX);
        assert!(id < 7);
    }

    #[test]
    fn test_rotator_context() {
        let rotator = EpochRotator::new(1, 3, 2);
        let ctx = rotator.context(2);
        assert_eq!(ctx.epoch, 2);
        assert_eq!(ctx.worker_id, 1);
        assert_eq!(ctx.effective_worker_id, (1 + 2 * 2) % 3);
    }
}
