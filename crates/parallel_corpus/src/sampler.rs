use crate::index::BucketIndex;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Picks the next bucket to drain, weighted by how many pairs each bucket
/// still holds.
///
/// # Algorithm
/// 1. `total = Σ count(bucket)` over all live buckets.
/// 2. Draw `r ~ Uniform[0, total)`.
/// 3. Walk buckets in ascending key order, accumulating counts; the bucket
///    whose range `[acc, acc + count)` contains `r` is selected.
///
/// A bucket holding 300 of 1000 remaining pairs is chosen with probability
/// 0.3. Since drained buckets shrink (and vanish at zero), repeated draws
/// approximate a global shuffle while every batch still comes from a single
/// length bucket.
///
/// # Seed Handling
/// Each epoch derives its own RNG as `base_seed + epoch`, the same scheme the
/// index samplers use:
/// - Fixed seed -> identical bucket order every run
/// - New epoch  -> fresh order, still reproducible
///
/// # Example
/// ```ignore
/// let mut sampler = BucketSampler::new(42, epoch);
/// while let Some(key) = sampler.select(&index) {
///     // drain a batch from `key`
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BucketSampler {
    rng: StdRng,
}

impl BucketSampler {
    pub fn new(base_seed: u64, epoch: usize) -> Self {
        Self {
            rng: Self::derive_rng_for_epoch(base_seed, epoch),
        }
    }

    /// Derives a deterministic random number generator for the given epoch
    #[inline]
    fn derive_rng_for_epoch(base_seed: u64, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(base_seed.wrapping_add(epoch as u64))
    }

    /// Returns the key of the selected bucket, or `None` once the index is
    /// drained.
    pub fn select(&mut self, index: &BucketIndex) -> Option<u64> {
        let total = index.total();
        if total == 0 {
            return None;
        }
        let r = self.rng.random_range(0..total);
        select_by_cumulative_count(index.counts(), r)
    }
}

/// Returns the key whose cumulative count range contains `r`.
pub fn select_by_cumulative_count(
    counts: impl IntoIterator<Item = (u64, usize)>,
    r: usize,
) -> Option<u64> {
    let mut acc = 0;
    for (key, count) in counts {
        if r < acc + count {
            return Some(key);
        }
        acc += count;
    }
    None
}
