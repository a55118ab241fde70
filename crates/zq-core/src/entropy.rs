#![forbid(unsafe_code)]

//! Randomness and nonce providers.
//!
//! Both are injected so the claim pipeline can run with fixed sequences in
//! tests while production draws from the operating system.

use ethers::types::U256;
use rand::rngs::OsRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out a fresh RNG per claim.
pub trait RngProvider: Send + Sync {
    fn rng(&self) -> ChaCha20Rng;
}

/// ChaCha20 seeded from the OS per call. Bonus draws cannot be predicted from
/// earlier responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSeededRng;

impl RngProvider for OsSeededRng {
    fn rng(&self) -> ChaCha20Rng {
        ChaCha20Rng::from_entropy()
    }
}

/// Same seed every call: every claim sees an identical random sequence.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeedRng(pub u64);

impl RngProvider for FixedSeedRng {
    fn rng(&self) -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(self.0)
    }
}

/// Source of attestation nonces. Every value handed out must be distinct.
pub trait NonceSource: Send + Sync {
    fn next_nonce(&self) -> U256;
}

/// 128 bits from the OS CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNonceSource;

impl NonceSource for RandomNonceSource {
    fn next_nonce(&self) -> U256 {
        let raw: u128 = OsRng.gen();
        U256::from(raw)
    }
}

/// Monotonic counter.
#[derive(Debug)]
pub struct CounterNonceSource {
    next: AtomicU64,
}

impl CounterNonceSource {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl NonceSource for CounterNonceSource {
    fn next_nonce(&self) -> U256 {
        U256::from(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
