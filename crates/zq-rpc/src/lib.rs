#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_sign_loss)]

//! Minimal Ethereum JSON-RPC client.
//!
//! Only what the claim signer needs: `eth_call` against `latest` and
//! `eth_chainId` for readiness. Requests carry a hard timeout and a bounded,
//! deterministic retry budget for transient failures.

mod pass_registry;

pub use pass_registry::{balance_of_calldata, Erc1155PassRegistry, BALANCE_OF_SIGNATURE};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ethers::types::Address;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for the chain RPC client.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,
}

fn default_timeout_ms() -> u64 {
    RpcConfig::DEFAULT_TIMEOUT_MS
}

fn default_retry_max() -> u32 {
    RpcConfig::DEFAULT_RETRY_MAX
}

impl RpcConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 3_000;
    pub const DEFAULT_RETRY_MAX: u32 = 3;

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            retry_max: Self::DEFAULT_RETRY_MAX,
        }
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status} body={body}")]
    HttpStatus { status: u16, body: String },
    #[error("json-rpc error {code}: {message}")]
    JsonRpc { code: i64, message: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl RpcError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::HttpStatus { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            Self::Config(_) | Self::JsonRpc { .. } | Self::Decode(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

pub struct EthRpcClient {
    cfg: RpcConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl EthRpcClient {
    pub fn new(cfg: RpcConfig) -> Result<Self, RpcError> {
        if cfg.url.trim().is_empty() {
            return Err(RpcError::Config("rpc url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| RpcError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            cfg,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Read-only contract call at block `latest`. Returns the raw return data.
    pub async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let params = serde_json::json!([
            {
                "to": format!("{to:?}"),
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);
        let raw: String = self.request("eth_call", &params).await?;
        decode_hex_data(&raw)
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let raw: String = self.request("eth_chainId", &serde_json::json!([])).await?;
        let digits = raw.trim_start_matches("0x");
        u64::from_str_radix(digits, 16)
            .map_err(|e| RpcError::Decode(format!("invalid chain id {raw:?}: {e}")))
    }

    async fn request<T>(&self, method: &'static str, params: &serde_json::Value) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        let attempts = self.cfg.retry_max.max(1);
        for attempt in 1..=attempts {
            let body = JsonRpcRequest {
                jsonrpc: "2.0",
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                method,
                params,
            };
            // The URL often embeds a provider API key; it is never logged.
            debug!(method, attempt, "sending json-rpc request");
            let resp = match self.client.post(&self.cfg.url).json(&body).send().await {
                Ok(resp) => resp,
                Err(err) => {
                    let err = map_reqwest_error(err);
                    warn!(method, attempt, error = %err, "request error");
                    if attempt == attempts || !err.is_transient() {
                        return Err(err);
                    }
                    backoff(method, attempt).await;
                    continue;
                }
            };

            match Self::map_response(method, resp).await {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    if attempt == attempts || !err.is_transient() {
                        return Err(err);
                    }
                    backoff(method, attempt).await;
                }
            }
        }

        Err(RpcError::Config(
            "retry loop exhausted unexpectedly".to_string(),
        ))
    }

    async fn map_response<T>(method: &'static str, resp: reqwest::Response) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RpcError::Network(e.without_url().to_string()))?;
        if !status.is_success() {
            warn!(method, status = status.as_u16(), "non-success status");
            return Err(RpcError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: JsonRpcResponse<T> =
            serde_json::from_str(&body).map_err(|e| RpcError::Decode(format!("{e}")))?;
        if let Some(err) = parsed.error {
            warn!(method, code = err.code, message = %err.message, "json-rpc error");
            return Err(RpcError::JsonRpc {
                code: err.code,
                message: err.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| RpcError::Decode("response has neither result nor error".to_string()))
    }
}

fn decode_hex_data(raw: &str) -> Result<Vec<u8>, RpcError> {
    let body = raw
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Decode(format!("expected 0x-prefixed data, got {raw:?}")))?;
    hex::decode(body).map_err(|e| RpcError::Decode(format!("invalid hex data: {e}")))
}

fn map_reqwest_error(err: reqwest::Error) -> RpcError {
    let err = err.without_url();
    if err.is_body() || err.is_decode() {
        return RpcError::Decode(err.to_string());
    }
    RpcError::Network(err.to_string())
}

async fn backoff(method: &str, attempt: u32) {
    let delay_ms = backoff_delay_ms(attempt);
    warn!(method, attempt, delay_ms, "retrying after backoff");
    sleep(Duration::from_millis(delay_ms)).await;
}

fn backoff_delay_ms(attempt: u32) -> u64 {
    // Exponential backoff capped at 2s, deterministic (no jitter).
    let exp = attempt.saturating_sub(1);
    let base = 100u64.saturating_mul(2u64.saturating_pow(exp));
    base.min(2_000)
}
