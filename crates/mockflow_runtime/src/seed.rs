//! Seed management for workload tasks.
//!
//! Every task owns its own generator. With [`SeedSource::Entropy`] each one
//! is seeded from the operating system; with [`SeedSource::Fixed`] the
//! stream for a task is derived from the base seed, its creation index and
//! its name, so a run can be replayed.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;

/// Source of per-task seeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedSource {
    /// Fresh entropy for every task
    #[default]
    Entropy,
    /// Reproducible streams derived from a base seed
    Fixed(u64),
}

impl SeedSource {
    /// Derive the seed for one task, if reproducible
    #[must_use]
    pub fn derive(&self, index: u64, name: &str) -> Option<u64> {
        match self {
            Self::Entropy => None,
            Self::Fixed(base) => {
                let mut hasher = fnv::FnvHasher::default();
                hasher.write_u64(*base);
                hasher.write_u64(index);
                hasher.write(name.as_bytes());
                Some(hasher.finish())
            }
        }
    }

    /// Create the generator for one task
    #[must_use]
    pub fn rng(&self, index: u64, name: &str) -> ChaCha8Rng {
        match self.derive(index, name) {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Check whether streams are reproducible
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}
