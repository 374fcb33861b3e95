// sampler-core/src/group.rs

//! Worker group membership and epoch-boundary synchronization.
//!
//! Workers never talk to each other while reading. The only cross-worker
//! interaction is the optional barrier at the end of each epoch, and the
//! collective abort that releases every peer when one worker fails, so no
//! worker waits forever at a barrier a failed peer will never reach.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::error::{Result, RuntimeError};

/// One participant's view of the worker group.
pub trait WorkerGroup: Send + Sync {
    /// This worker's id, in `0..size()`.
    fn rank(&self) -> u32;

    /// Number of workers in the group.
    fn size(&self) -> u32;

    /// Blocks until every worker has reached the barrier.
    ///
    /// # Errors
    ///
    /// Returns `Aborted` if any worker aborted the group before the barrier
    /// completed.
    fn barrier(&self) -> Result<()>;

    /// Aborts the whole group. Every current and future `barrier` call fails.
    fn abort(&self, reason: &str);

    /// Whether this worker prints group-wide reports.
    fn is_reporter(&self) -> bool {
        self.rank() == 0
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: u32,
    generation: u64,
    aborted: Option<String>,
}

#[derive(Debug)]
struct Shared {
    size: u32,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        // A panicking peer must not wedge the others; the state stays usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A group of workers living in one process, typically one per thread.
pub struct LocalGroup;

impl LocalGroup {
    /// Creates the members of a group of `size` workers, ordered by rank.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero.
    pub fn new(size: u32) -> Result<Vec<LocalMember>> {
        if size == 0 {
            return Err(RuntimeError::config("worker group size must be greater than 0"));
        }

        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
        });

        Ok((0..size)
            .map(|rank| LocalMember {
                rank,
                shared: shared.clone(),
            })
            .collect())
    }

    /// A group with a single member.
    pub fn solo() -> LocalMember {
        let shared = Arc::new(Shared {
            size: 1,
            state: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
        });
        LocalMember { rank: 0, shared }
    }
}

/// One member of a [`LocalGroup`].
#[derive(Debug, Clone)]
pub struct LocalMember {
    rank: u32,
    shared: Arc<Shared>,
}

impl LocalMember {
    /// The abort reason, if the group has been aborted.
    pub fn abort_reason(&self) -> Option<String> {
        self.shared.lock().aborted.clone()
    }
}

impl WorkerGroup for LocalMember {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.shared.size
    }

    fn barrier(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if let Some(reason) = &state.aborted {
            return Err(RuntimeError::aborted(reason.clone()));
        }

        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.arrived = 0;
            state.generation += 1;
            self.shared.cvar.notify_all();
            return Ok(());
        }

        let generation = state.generation;
        while state.generation == generation && state.aborted.is_none() {
            state = self
                .shared
                .cvar
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }

        if state.generation != generation {
            return Ok(());
        }
        let reason = state.aborted.clone().unwrap_or_default();
        Err(RuntimeError::aborted(reason))
    }

    fn abort(&self, reason: &str) {
        let mut state = self.shared.lock();
        if state.aborted.is_none() {
            tracing::warn!(rank = self.rank, reason, "aborting worker group");
            state.aborted = Some(format!("worker {}: {reason}", self.rank));
        }
        self.shared.cvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn test_ranks_and_size() {
        let members = LocalGroup::new(3).unwrap();
        let ranks: Vec<u32> = members.iter().map(|m| m.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert!(members.iter().all(|m| m.size() == 3));
        assert!(members[0].is_reporter());
        assert!(!members[1].is_reporter());
    }

    #[test]
    fn test_zero_size() {
        assert!(LocalGroup::new(0).is_err());
    }

    #[test]
    fn test_solo_barrier_never_blocks() {
        let solo = LocalGroup::solo();
        for _ in 0..3 {
            solo.barrier().unwrap();
        }
    }

    #[test]
    fn test_barrier_orders_phases() {
        let members = LocalGroup::new(4).unwrap();
        let counter = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = members
            .into_iter()
            .map(|member| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for phase in 0..5u32 {
                        counter.fetch_add(1, Ordering::SeqCst);
                        member.barrier().unwrap();
                        // Everyone finished this phase before anyone continues
                        assert!(counter.load(Ordering::SeqCst) >= (phase + 1) * 4);
                        member.barrier().unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_abort_releases_waiters() {
        let mut members = LocalGroup::new(3).unwrap();
        let failing = members.pop().unwrap();

        let handles: Vec<_> = members
            .into_iter()
            .map(|member| thread::spawn(move || member.barrier()))
            .collect();

        failing.abort("read failed");

        for handle in handles {
            let err = handle.join().unwrap().unwrap_err();
            assert!(err.is_aborted());
            assert!(err.to_string().contains("read failed"));
        }
        assert!(failing.barrier().is_err());
        assert!(failing.abort_reason().unwrap().contains("worker 2"));
    }

    #[test]
    fn test_first_abort_reason_wins() {
        let members = LocalGroup::new(2).unwrap();
        members[0].abort("first");
        members[1].abort("second");
        assert!(members[1].abort_reason().unwrap().contains("first"));
    }
}
