//! CPU-bound busy work.
//!
//! A deliberately slow prime search. Every candidate is tested by trial
//! division against all smaller integers, and the list of primes found so
//! far is reallocated and copied each time it grows. Cost is a smooth,
//! strictly increasing function of the iteration count, which is what
//! calibration needs. Do not optimize it.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-visible sink so the search cannot be elided
static SINK: AtomicU64 = AtomicU64::new(0);

/// Burn CPU for `iterations` candidate integers
///
/// Returns the number of primes found, including the seed prime 2.
pub fn burn(iterations: u64) -> usize {
    let mut primes: Vec<u64> = vec![2];
    let mut candidate: u64 = 2;

    for _ in 0..iterations {
        candidate += 1;

        let mut is_prime = true;
        let mut divisor = 2;
        while divisor < candidate && is_prime {
            if black_box(candidate) % divisor == 0 {
                is_prime = false;
            }
            divisor += 1;
        }

        if is_prime {
            let mut grown = Vec::with_capacity(primes.len() + 1);
            grown.extend_from_slice(&primes);
            grown.push(candidate);
            primes = grown;
        }
    }

    let hits = primes.iter().filter(|&&p| p == 4).count() as u64;
    SINK.fetch_add(black_box(hits), Ordering::Relaxed);
    black_box(primes.len())
}

/// Value accumulated by every [`burn`] call so far
#[must_use]
pub fn sink() -> u64 {
    SINK.load(Ordering::Relaxed)
}
