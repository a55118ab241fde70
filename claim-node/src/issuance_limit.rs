#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

use crate::config::LimitsConfig;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use zq_core::{Address, TimeSource};

/// Buckets beyond this count make the limiter eligible for a sweep of fully
/// refilled entries.
const SWEEP_THRESHOLD: usize = 10_000;

/// At most one sweep per interval, however many buckets are live.
const SWEEP_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Recommended Retry-After in seconds when denied.
    pub retry_after_secs: u64,
}

impl Decision {
    const ALLOW: Self = Self {
        allowed: true,
        retry_after_secs: 0,
    };
}

#[derive(Debug)]
struct Bucket {
    tokens_scaled: u128,
    last_ms: u64,
}

/// The recipient in a claim body is not authenticated, so a bucket belongs to
/// the pair (client IP, recipient). Another client naming the same recipient
/// draws from its own bucket.
type BucketKey = (IpAddr, Address);

#[derive(Default)]
struct Buckets {
    map: HashMap<BucketKey, Bucket>,
    last_sweep_ms: Option<u64>,
}

/// Token bucket per (client, recipient) in front of signing.
///
/// - Per-process only (not distributed).
/// - Integer-only fixed-point arithmetic, no jitter.
/// - The on-chain nonce and daily quota remain authoritative; this only
///   keeps a single client from farming attestations for one wallet.
pub struct IssuanceLimiter {
    cfg: LimitsConfig,
    time: Arc<dyn TimeSource>,
    buckets: Mutex<Buckets>,
}

impl IssuanceLimiter {
    const SCALE: u128 = 1_000_000;

    pub fn new(cfg: LimitsConfig, time: Arc<dyn TimeSource>) -> Self {
        Self {
            cfg,
            time,
            buckets: Mutex::new(Buckets::default()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    fn capacity(&self) -> u128 {
        u128::from(self.cfg.burst.max(1)) * Self::SCALE
    }

    fn rate_per_ms(&self) -> u128 {
        let rate_per_min = u128::from(self.cfg.refill_per_minute.max(1));
        // Floor at 1 so the retry computation never divides by zero.
        (rate_per_min * Self::SCALE / 60_000).max(1)
    }

    /// Take one issuance token for `recipient` on behalf of `client`.
    pub fn check(&self, client: IpAddr, recipient: Address) -> Decision {
        if !self.cfg.enabled {
            return Decision::ALLOW;
        }

        let cap = self.capacity();
        let rate_per_ms = self.rate_per_ms();
        let now = self.time.now_millis();

        let mut guard = self
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        let sweep_due = state
            .last_sweep_ms
            .map_or(true, |last| now.saturating_sub(last) >= SWEEP_INTERVAL_MS);
        if state.map.len() >= SWEEP_THRESHOLD && sweep_due {
            state.map.retain(|_, b| {
                let refill = u128::from(now.saturating_sub(b.last_ms)) * rate_per_ms;
                b.tokens_scaled.saturating_add(refill) < cap
            });
            state.last_sweep_ms = Some(now);
        }

        let b = state
            .map
            .entry((client, recipient))
            .or_insert_with(|| Bucket {
                tokens_scaled: cap,
                last_ms: now,
            });

        let elapsed = now.saturating_sub(b.last_ms);
        if elapsed > 0 {
            let refill = u128::from(elapsed) * rate_per_ms;
            b.tokens_scaled = b.tokens_scaled.saturating_add(refill).min(cap);
            b.last_ms = now;
        }

        if b.tokens_scaled >= Self::SCALE {
            b.tokens_scaled -= Self::SCALE;
            Decision::ALLOW
        } else {
            let missing = Self::SCALE - b.tokens_scaled;
            let wait_ms = missing.div_ceil(rate_per_ms);
            let retry_after_secs = u64::try_from(wait_ms.div_ceil(1000).max(1)).unwrap_or(u64::MAX);
            Decision {
                allowed: false,
                retry_after_secs,
            }
        }
    }

    /// Number of (client, recipient) pairs currently tracked.
    pub fn tracked(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .len()
    }
}
