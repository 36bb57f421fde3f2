//! Random sources for serials and key generation.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_core::{CryptoRngCore, OsRng};

/// Hands out a cryptographically secure generator for one operation.
///
/// Implementations are shared process-wide behind an `Arc` and are used from
/// blocking worker threads, so they must be `Send + Sync` and need no outside
/// locking.
pub trait RandomSource: Send + Sync {
    fn rng(&self) -> Box<dyn CryptoRngCore + Send>;
}

/// Operating system entropy. The production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn rng(&self) -> Box<dyn CryptoRngCore + Send> {
        Box::new(OsRng)
    }
}

/// Deterministic source for tests.
///
/// Every call to [`RandomSource::rng`] returns a fresh `StdRng` seeded from
/// the base seed and a call counter, so concurrent operations never share a
/// stream and a test run is reproducible.
#[derive(Debug)]
pub struct SeededRandom {
    seed: u64,
    counter: AtomicU64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(0),
        }
    }
}

impl RandomSource for SeededRandom {
    fn rng(&self) -> Box<dyn CryptoRngCore + Send> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Box::new(StdRng::seed_from_u64(
            self.seed ^ n.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        ))
    }
}
