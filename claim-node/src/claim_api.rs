#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

//! Claim orchestration: validate → eligibility → allocate → encode → sign.

use crate::config::{ClaimNodeConfig, ConfigError};
use crate::issuance_limit::IssuanceLimiter;
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use zq_core::{
    checksum, parse_address, AllocationError, AttestationSigner, ClaimAttestation,
    EligibilityVerifier, NonceSource, OsSeededRng, RandomNonceSource, RewardAllocator,
    RngProvider, SystemTimeSource, TimeSource,
};
use zq_rpc::{Erc1155PassRegistry, EthRpcClient};

const MSG_BAD_JSON: &str = "Invalid JSON in request body";
const MSG_BAD_FIELDS: &str = "Missing or invalid userAddress or score";
const MSG_BAD_SCORE: &str = "Score must be greater than 0 to claim";
const MSG_SCORE_CAP: &str = "Score exceeds the per-claim maximum";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequestV1 {
    pub user_address: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponseV1 {
    /// `0x`-prefixed ABI encoding the contract's `claim` takes as `databytes`.
    pub databytes: String,
    pub v: u8,
    pub r: String,
    pub s: String,
    pub reward_token_symbol: String,
    /// Bonus amount in whole tokens, fixed number of fractional digits.
    pub reward_token_amount: String,
    #[serde(rename = "amountZQT")]
    pub amount_zqt: u64,
    pub reward_token_address: String,
    /// Unix seconds after which the contract rejects the claim.
    pub deadline: u64,
    /// Decimal string; may exceed JSON's safe integer range.
    pub nonce: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {detail}")]
    Validation {
        reason: &'static str,
        detail: String,
    },
    #[error("recipient holds no pass")]
    Ineligible,
    #[error("issuance limit reached, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("claim service is not configured")]
    Configuration,
    #[error("eligibility lookup failed: {0}")]
    Infrastructure(String),
    #[error("claim signing failed: {0}")]
    Signing(String),
}

impl ApiError {
    fn validation(reason: &'static str, detail: impl ToString) -> Self {
        Self::Validation {
            reason,
            detail: detail.to_string(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Ineligible => 403,
            Self::RateLimited { .. } => 429,
            Self::Configuration | Self::Infrastructure(_) | Self::Signing(_) => 500,
        }
    }

    pub fn public_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "INVALID_INPUT",
            Self::Ineligible => "FORBIDDEN",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Configuration => "CONFIGURATION",
            Self::Infrastructure(_) => "UNAVAILABLE",
            Self::Signing(_) => "INTERNAL",
        }
    }

    /// Fixed, client-safe text. Internal detail stays in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Validation { reason, .. } => *reason,
            Self::Ineligible => "You need to mint Zero Quest Pass to play & claim",
            Self::RateLimited { .. } => "Too many claims for this address, try again later",
            Self::Configuration => "Claim service is not configured",
            Self::Infrastructure(_) => "Could not verify pass ownership, try again later",
            Self::Signing(_) => "Could not create claim signature",
        }
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "invalid",
            Self::Ineligible => "ineligible",
            Self::RateLimited { .. } => "rate_limited",
            Self::Configuration => "unconfigured",
            Self::Infrastructure(_) => "unavailable",
            Self::Signing(_) => "internal",
        }
    }
}

/// Strict body parse shared by the configured and the degraded paths.
pub fn parse_request(body: &[u8]) -> Result<ClaimRequestV1, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ApiError::validation(MSG_BAD_JSON, e))?;
    serde_json::from_value(value).map_err(|e| ApiError::validation(MSG_BAD_FIELDS, e))
}

/// Record a claim rejected before the service could run (e.g. unconfigured).
pub fn record_rejection(err: &ApiError) {
    metrics::CLAIMS_TOTAL
        .with_label_values(&[err.outcome_label()])
        .inc();
    metrics::CLAIM_STAGE_FAILURES_TOTAL
        .with_label_values(&[ClaimStage::Received.as_str()])
        .inc();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStage {
    Received,
    Validated,
    EligibilityChecked,
    Allocated,
    Encoded,
    Signed,
    Responded,
}

impl ClaimStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::EligibilityChecked => "eligibility_checked",
            Self::Allocated => "allocated",
            Self::Encoded => "encoded",
            Self::Signed => "signed",
            Self::Responded => "responded",
        }
    }
}

pub struct ClaimApi {
    verifier: EligibilityVerifier,
    allocator: RewardAllocator,
    signer: AttestationSigner,
    claim_ttl_secs: u64,
    rng: Arc<dyn RngProvider>,
    nonces: Arc<dyn NonceSource>,
    time: Arc<dyn TimeSource>,
    limiter: Option<IssuanceLimiter>,
}

impl ClaimApi {
    /// Production randomness, nonces and clock; no issuance limiter.
    pub fn new(
        verifier: EligibilityVerifier,
        allocator: RewardAllocator,
        signer: AttestationSigner,
        claim_ttl_secs: u64,
    ) -> Self {
        Self {
            verifier,
            allocator,
            signer,
            claim_ttl_secs,
            rng: Arc::new(OsSeededRng),
            nonces: Arc::new(RandomNonceSource),
            time: Arc::new(SystemTimeSource),
            limiter: None,
        }
    }

    pub fn from_config(cfg: &ClaimNodeConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let client = EthRpcClient::new(cfg.chain.clone())
            .map_err(|e| ConfigError::invalid("chain", e))?;
        let registry = Erc1155PassRegistry::new(client, cfg.pass_contract()?);
        let verifier = EligibilityVerifier::new(Arc::new(registry), cfg.pass_id());

        let api = Self::new(
            verifier,
            cfg.allocator()?,
            cfg.signer()?,
            cfg.rewards.claim_ttl_secs,
        );
        Ok(if cfg.limits.enabled {
            api.with_limiter(IssuanceLimiter::new(
                cfg.limits.clone(),
                Arc::new(SystemTimeSource),
            ))
        } else {
            api
        })
    }

    pub fn with_rng(mut self, rng: Arc<dyn RngProvider>) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_nonces(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn with_time(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    pub fn with_limiter(mut self, limiter: IssuanceLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn signer_address(&self) -> zq_core::Address {
        self.signer.address()
    }

    /// `client` is the peer address of the connection; it scopes the issuance
    /// limiter and is never signed.
    pub async fn submit_claim(
        &self,
        client: IpAddr,
        body: &[u8],
    ) -> Result<ClaimResponseV1, ApiError> {
        let mut stage = ClaimStage::Received;
        let result = self.run_stages(client, body, &mut stage).await;

        match &result {
            Ok(_) => {
                metrics::CLAIMS_TOTAL.with_label_values(&["signed"]).inc();
            }
            Err(err) => {
                metrics::CLAIMS_TOTAL
                    .with_label_values(&[err.outcome_label()])
                    .inc();
                metrics::CLAIM_STAGE_FAILURES_TOTAL
                    .with_label_values(&[stage.as_str()])
                    .inc();
                match err {
                    ApiError::Infrastructure(_) | ApiError::Signing(_) => {
                        error!(event = "claim_failed", stage = stage.as_str(), code = err.public_code(), error = %err);
                    }
                    _ => {
                        warn!(event = "claim_rejected", stage = stage.as_str(), code = err.public_code(), error = %err);
                    }
                }
            }
        }
        result
    }

    /// `stage` tracks the last stage reached, for failure attribution.
    async fn run_stages(
        &self,
        client: IpAddr,
        body: &[u8],
        stage: &mut ClaimStage,
    ) -> Result<ClaimResponseV1, ApiError> {
        let req = parse_request(body)?;
        let recipient = parse_address(&req.user_address)
            .map_err(|e| ApiError::validation(MSG_BAD_FIELDS, e))?;
        let score = self
            .allocator
            .validate_score(req.score)
            .map_err(|e| match e {
                AllocationError::ScoreAboveCap { .. } => ApiError::validation(MSG_SCORE_CAP, e),
                _ => ApiError::validation(MSG_BAD_SCORE, e),
            })?;
        *stage = ClaimStage::Validated;

        if let Some(limiter) = &self.limiter {
            let decision = limiter.check(client, recipient);
            if !decision.allowed {
                return Err(ApiError::RateLimited {
                    retry_after_secs: decision.retry_after_secs,
                });
            }
        }

        let eligible = match self.verifier.check_eligibility(recipient).await {
            Ok(eligible) => eligible,
            Err(e) => {
                metrics::ELIGIBILITY_LOOKUPS_TOTAL
                    .with_label_values(&["error"])
                    .inc();
                return Err(ApiError::Infrastructure(e.to_string()));
            }
        };
        let label = if eligible { "eligible" } else { "ineligible" };
        metrics::ELIGIBILITY_LOOKUPS_TOTAL
            .with_label_values(&[label])
            .inc();
        if !eligible {
            return Err(ApiError::Ineligible);
        }
        *stage = ClaimStage::EligibilityChecked;

        let mut rng = self.rng.rng();
        let allocation = self
            .allocator
            .allocate(req.score, &mut rng)
            .map_err(|e| ApiError::Signing(e.to_string()))?;
        *stage = ClaimStage::Allocated;

        let deadline = self
            .time
            .now_secs()
            .checked_add(self.claim_ttl_secs)
            .ok_or_else(|| ApiError::Signing("deadline overflows u64".to_string()))?;
        let claim = ClaimAttestation {
            recipient,
            primary_amount: allocation.primary_amount,
            bonus_token: allocation.bonus_token.address,
            bonus_amount: allocation.bonus_amount,
            expiry: deadline,
            nonce: self.nonces.next_nonce(),
        };
        let databytes = claim.encode();
        *stage = ClaimStage::Encoded;

        let sig = self
            .signer
            .sign(&databytes)
            .map_err(|e| ApiError::Signing(e.to_string()))?;
        *stage = ClaimStage::Signed;

        let resp = ClaimResponseV1 {
            databytes: format!("0x{}", hex::encode(&databytes)),
            v: sig.v,
            r: sig.r_hex(),
            s: sig.s_hex(),
            reward_token_symbol: allocation.bonus_token.symbol.clone(),
            reward_token_amount: allocation.bonus_display,
            amount_zqt: score,
            reward_token_address: checksum(&allocation.bonus_token.address),
            deadline,
            nonce: claim.nonce.to_string(),
        };
        *stage = ClaimStage::Responded;
        info!(
            event = "claim_signed",
            recipient = %checksum(&recipient),
            amount = resp.amount_zqt,
            bonus_symbol = %resp.reward_token_symbol,
            bonus_amount = %resp.reward_token_amount,
            deadline = resp.deadline,
            nonce = %resp.nonce
        );
        Ok(resp)
    }
}
