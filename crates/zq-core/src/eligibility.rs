#![forbid(unsafe_code)]

//! Pass ownership check.
//!
//! Eligibility is always re-read from the registry; a lookup failure is
//! reported as such and never folded into "eligible" or "not eligible".

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Transport-level failure after the client's retry budget.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    /// The node answered with a JSON-RPC error (e.g. the call reverted).
    #[error("registry rejected query: {0}")]
    Rejected(String),
    #[error("malformed registry response: {0}")]
    Malformed(String),
}

/// Read-only ERC-1155 style balance lookup.
#[async_trait]
pub trait PassRegistry: Send + Sync {
    async fn balance_of(&self, owner: Address, id: U256) -> Result<U256, RegistryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EligibilityError {
    #[error("eligibility lookup failed: {0}")]
    Unavailable(#[from] RegistryError),
}

#[derive(Clone)]
pub struct EligibilityVerifier {
    registry: Arc<dyn PassRegistry>,
    pass_id: U256,
}

impl EligibilityVerifier {
    pub fn new(registry: Arc<dyn PassRegistry>, pass_id: U256) -> Self {
        Self { registry, pass_id }
    }

    pub fn pass_id(&self) -> U256 {
        self.pass_id
    }

    /// `Ok(true)` iff `owner` holds at least one pass.
    pub async fn check_eligibility(&self, owner: Address) -> Result<bool, EligibilityError> {
        let balance = self.registry.balance_of(owner, self.pass_id).await?;
        debug!(owner = ?owner, %balance, "pass balance");
        Ok(!balance.is_zero())
    }
}

/// Deterministic in-memory registry for tests and offline runs.
#[derive(Debug, Default)]
pub struct MockPassRegistry {
    balances: Mutex<HashMap<(Address, U256), U256>>,
    failure: Mutex<Option<RegistryError>>,
    calls: AtomicUsize,
}

impl MockPassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, owner: Address, id: U256, balance: U256) {
        self.balances
            .lock()
            .expect("mutex poisoned")
            .insert((owner, id), balance);
    }

    /// Every subsequent lookup fails with `err` until cleared with `None`.
    pub fn set_failure(&self, err: Option<RegistryError>) {
        *self.failure.lock().expect("mutex poisoned") = err;
    }

    /// Number of `balance_of` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PassRegistry for MockPassRegistry {
    async fn balance_of(&self, owner: Address, id: U256) -> Result<U256, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().expect("mutex poisoned").clone() {
            return Err(err);
        }
        Ok(self
            .balances
            .lock()
            .expect("mutex poisoned")
            .get(&(owner, id))
            .copied()
            .unwrap_or_default())
    }
}
