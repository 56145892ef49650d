//! Random row sampling.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// RNG for sampling: reproducible when seeded, entropy-seeded otherwise.
pub fn sampling_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Keep each item independently with probability `fraction`.
///
/// The expected sample size is `fraction * items.len()`. Fractions outside
/// `0.0..=1.0` are clamped; NaN keeps nothing.
pub fn bernoulli<T: Clone, R: Rng>(items: &[T], fraction: f64, rng: &mut R) -> Vec<T> {
    let p = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    if p >= 1.0 {
        return items.to_vec();
    }
    if p <= 0.0 {
        return Vec::new();
    }
    items
        .iter()
        .filter(|_| rng.gen_bool(p))
        .cloned()
        .collect()
}

/// Fixed-size uniform sample over a stream of unknown length (Algorithm R).
#[derive(Debug)]
pub struct Reservoir<T> {
    capacity: usize,
    seen: u64,
    items: Vec<T>,
    rng: ChaCha8Rng,
}

impl<T> Reservoir<T> {
    /// Create an empty reservoir holding at most `capacity` items.
    pub fn new(capacity: usize, seed: Option<u64>) -> Self {
        Self {
            capacity,
            seen: 0,
            items: Vec::with_capacity(capacity.min(1 << 20)),
            rng: sampling_rng(seed),
        }
    }

    /// Offer one item to the reservoir.
    pub fn offer(&mut self, item: T) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        if self.capacity == 0 {
            return;
        }
        let slot = self.rng.gen_range(0..self.seen);
        if slot < self.capacity as u64 {
            self.items[slot as usize] = item;
        }
    }

    /// Number of items offered so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take the sampled items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Extend<T> for Reservoir<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.offer(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bernoulli_bounds() {
        let items: Vec<u32> = (0..100).collect();
        let mut rng = sampling_rng(Some(1));
        assert_eq!(bernoulli(&items, 1.0, &mut rng).len(), 100);
        assert!(bernoulli(&items, 0.0, &mut rng).is_empty());
        assert!(bernoulli(&items, f64::NAN, &mut rng).is_empty());
    }

    #[test]
    fn test_bernoulli_seeded_is_reproducible() {
        let items: Vec<u32> = (0..1_000).collect();
        let a = bernoulli(&items, 0.3, &mut sampling_rng(Some(9)));
        let b = bernoulli(&items, 0.3, &mut sampling_rng(Some(9)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_bernoulli_expected_size() {
        let items: Vec<u32> = (0..100_000).collect();
        let sample = bernoulli(&items, 0.1, &mut sampling_rng(Some(3)));
        let n = sample.len() as f64;
        assert!((9_000.0..=11_000.0).contains(&n), "sample size {n}");
    }

    #[test]
    fn test_reservoir_exact_size() {
        let mut reservoir = Reservoir::new(50, Some(5));
        reservoir.extend(0..10_000u32);
        assert_eq!(reservoir.len(), 50);
        assert_eq!(reservoir.seen(), 10_000);

        let mut items = reservoir.into_items();
        items.sort_unstable();
        items.dedup();
        assert_eq!(items.len(), 50);
    }

    #[test]
    fn test_reservoir_short_stream_keeps_all() {
        let mut reservoir = Reservoir::new(50, None);
        reservoir.extend(0..10u32);
        assert_eq!(reservoir.into_items(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_capacity() {
        let mut reservoir = Reservoir::new(0, Some(1));
        reservoir.extend(0..10u32);
        assert!(reservoir.is_empty());
    }
}
