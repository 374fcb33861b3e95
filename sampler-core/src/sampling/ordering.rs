// sampler-core/src/sampling/ordering.rs

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::SampleIndex;

/// The global order in which samples are visited.
///
/// Starts as the identity `[0, 1, ..., N-1]`. Each call to [`shuffle`]
/// permutes the whole sequence using a generator seeded once at construction,
/// so a fixed seed yields the same sequence of permutations on every worker
/// and in every run.
///
/// [`shuffle`]: IndexOrdering::shuffle
pub struct IndexOrdering {
    indices: Vec<SampleIndex>,
    rng: StdRng,
    shuffles: u64,
}

impl IndexOrdering {
    /// Creates the identity ordering over `num_samples` samples.
    pub fn identity(num_samples: u64, seed: u64) -> Self {
        Self {
            indices: (0..num_samples).collect(),
            rng: StdRng::seed_from_u64(seed),
            shuffles: 0,
        }
    }

    /// Applies a uniformly random permutation to the whole ordering in place.
    pub fn shuffle(&mut self) {
        self.indices.shuffle(&mut self.rng);
        self.shuffles += 1;
    }

    /// Returns the current ordering.
    pub fn as_slice(&self) -> &[SampleIndex] {
        &self.indices
    }

    /// Number of samples in the ordering.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// How many times the ordering has been shuffled.
    pub fn shuffle_count(&self) -> u64 {
        self.shuffles
    }
}

impl std::fmt::Debug for IndexOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexOrdering")
            .field("len", &self.indices.len())
            .field("shuffles", &self.shuffles)
            .finish()
    }
}
