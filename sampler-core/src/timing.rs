// sampler-core/src/timing.rs

//! Named interval timing.
//!
//! A [`TimingTable`] receives start/stop events for named intervals and keeps
//! count, total, min and max per name. It is purely observational.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Aggregate of every completed occurrence of one named interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalStats {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl IntervalStats {
    fn single(elapsed: Duration) -> Self {
        Self {
            count: 1,
            total: elapsed,
            min: elapsed,
            max: elapsed,
        }
    }

    fn add(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    fn merge(&mut self, other: &IntervalStats) {
        self.count += other.count;
        self.total += other.total;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Mean duration of one occurrence.
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total.div_f64(self.count as f64)
    }
}

#[derive(Debug, Default, Clone)]
pub struct TimingTable {
    intervals: BTreeMap<String, IntervalStats>,
    open: HashMap<String, Instant>,
}

impl TimingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of an interval. Restarting an open interval resets it.
    pub fn start(&mut self, name: &str) {
        self.open.insert(name.to_string(), Instant::now());
    }

    /// Closes an interval and returns its duration.
    ///
    /// Stopping an interval that was never started is ignored.
    pub fn stop(&mut self, name: &str) -> Option<Duration> {
        let started = self.open.remove(name)?;
        let elapsed = started.elapsed();
        self.record(name, elapsed);
        Some(elapsed)
    }

    /// Adds an already measured occurrence.
    pub fn record(&mut self, name: &str, elapsed: Duration) {
        match self.intervals.get_mut(name) {
            Some(stats) => stats.add(elapsed),
            None => {
                self.intervals
                    .insert(name.to_string(), IntervalStats::single(elapsed));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&IntervalStats> {
        self.intervals.get(name)
    }

    /// Intervals ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IntervalStats)> {
        self.intervals.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Folds another table's completed intervals into this one.
    pub fn merge(&mut self, other: &TimingTable) {
        for (name, stats) in other.iter() {
            match self.intervals.get_mut(name) {
                Some(existing) => existing.merge(stats),
                None => {
                    self.intervals.insert(name.to_string(), *stats);
                }
            }
        }
    }

    /// Logs one line per interval.
    pub fn log_summary(&self) {
        for (name, stats) in self.iter() {
            tracing::info!(
                "{:<10} count={:<6} total={:>10.4}s mean={:>10.6}s min={:>10.6}s max={:>10.6}s",
                name,
                stats.count,
                stats.total.as_secs_f64(),
                stats.mean().as_secs_f64(),
                stats.min.as_secs_f64(),
                stats.max.as_secs_f64(),
            );
        }
    }
}
