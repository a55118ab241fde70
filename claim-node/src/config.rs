#![forbid(unsafe_code)]

//! TOML configuration with `env:VAR` references.
//!
//! References are resolved leniently: an unset variable is recorded and
//! replaced by an empty string so the rest of the file (bind address,
//! logging) stays usable. [`ClaimNodeConfig::validate`] then fails closed on
//! any missing value.

use crate::logging::LogFormat;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use zq_core::{
    checksum, parse_address, Address, AttestationSigner, BonusToken, RewardAllocator, U256,
    DEFAULT_DISPLAY_DECIMALS, DEFAULT_MAX_PRIMARY_AMOUNT,
};
use zq_rpc::RpcConfig;

/// Configuration used when no file is given: every secret comes from the
/// environment.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/claim-node.example.toml");

pub const DEFAULT_PASS_CONTRACT: &str = "0x656bc95b9E2f713184129629C1c3dFbeB67aCc59";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("invalid env: reference at {key} (empty var name)")]
    EmptyEnvRef { key: String },
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimNodeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub chain: RpcConfig,
    #[serde(default)]
    pub pass: PassConfig,
    pub signer: SignerConfig,
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(skip)]
    missing_env: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassConfig {
    #[serde(default = "default_pass_contract")]
    pub contract: String,
    #[serde(default = "default_pass_token_id")]
    pub token_id: u64,
}

fn default_pass_contract() -> String {
    DEFAULT_PASS_CONTRACT.to_string()
}

fn default_pass_token_id() -> u64 {
    1
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            contract: default_pass_contract(),
            token_id: default_pass_token_id(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct SignerConfig {
    pub private_key: String,
    #[serde(default)]
    pub expected_address: Option<String>,
}

impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.private_key.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("SignerConfig")
            .field("private_key", &key)
            .field("expected_address", &self.expected_address)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardsConfig {
    #[serde(default = "default_primary_symbol")]
    pub primary_symbol: String,
    #[serde(default = "default_max_primary_amount")]
    pub max_primary_amount: u64,
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
    #[serde(default = "default_display_decimals")]
    pub display_decimals: u32,
    pub bonus: Vec<BonusTokenConfig>,
}

fn default_primary_symbol() -> String {
    "ZQT".to_string()
}

fn default_max_primary_amount() -> u64 {
    DEFAULT_MAX_PRIMARY_AMOUNT
}

fn default_claim_ttl_secs() -> u64 {
    60
}

fn default_display_decimals() -> u32 {
    DEFAULT_DISPLAY_DECIMALS
}

/// Bonus candidate; `min`/`max` are whole-token decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct BonusTokenConfig {
    pub symbol: String,
    pub address: String,
    #[serde(default = "default_token_decimals")]
    pub decimals: u32,
    pub min: String,
    pub max: String,
}

fn default_token_decimals() -> u32 {
    18
}

impl BonusTokenConfig {
    fn to_bonus_token(&self, index: usize) -> Result<BonusToken, ConfigError> {
        let address = parse_address(&self.address)
            .map_err(|e| ConfigError::invalid(format!("rewards.bonus[{index}].address"), e))?;
        BonusToken::from_decimal_bounds(
            self.symbol.trim(),
            address,
            self.decimals,
            &self.min,
            &self.max,
        )
        .map_err(|e| ConfigError::invalid(format!("rewards.bonus[{index}]"), e))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_limits_enabled")]
    pub enabled: bool,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_refill_per_minute")]
    pub refill_per_minute: u32,
}

fn default_limits_enabled() -> bool {
    true
}

fn default_burst() -> u32 {
    5
}

fn default_refill_per_minute() -> u32 {
    5
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            enabled: default_limits_enabled(),
            burst: default_burst(),
            refill_per_minute: default_refill_per_minute(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl LoggingConfig {
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.format
            .parse()
            .map_err(|e: String| ConfigError::invalid("logging.format", e))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Replace every `"env:NAME"` string in place. Returns the names that were
/// unset or empty, in traversal order.
fn resolve_env_refs<F>(v: &mut toml::Value, lookup: &F) -> Result<Vec<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    fn walk<F>(
        v: &mut toml::Value,
        key: &str,
        lookup: &F,
        missing: &mut Vec<String>,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match v {
            toml::Value::String(s) => {
                if let Some(var) = s.strip_prefix("env:") {
                    let var = var.trim().to_string();
                    if var.is_empty() {
                        return Err(ConfigError::EmptyEnvRef {
                            key: key.to_string(),
                        });
                    }
                    match lookup(&var).filter(|val| !val.trim().is_empty()) {
                        Some(val) => *s = val,
                        None => {
                            if !missing.contains(&var) {
                                missing.push(var);
                            }
                            s.clear();
                        }
                    }
                }
            }
            toml::Value::Array(arr) => {
                for (i, x) in arr.iter_mut().enumerate() {
                    walk(x, &format!("{key}[{i}]"), lookup, missing)?;
                }
            }
            toml::Value::Table(map) => {
                for (k, x) in map.iter_mut() {
                    let child = if key.is_empty() {
                        k.clone()
                    } else {
                        format!("{key}.{k}")
                    };
                    walk(x, &child, lookup, missing)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    let mut missing = Vec::new();
    walk(v, "", lookup, &mut missing)?;
    Ok(missing)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<ClaimNodeConfig, ConfigError> {
    let path = path.as_ref();
    let origin = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: origin.clone(),
        source,
    })?;
    load_config_str(&raw, &origin, |var| std::env::var(var).ok())
}

/// Load [`DEFAULT_CONFIG_TOML`] against the process environment.
pub fn load_default_config() -> Result<ClaimNodeConfig, ConfigError> {
    load_config_str(DEFAULT_CONFIG_TOML, "<built-in>", |var| {
        std::env::var(var).ok()
    })
}

pub fn load_config_str<F>(raw: &str, origin: &str, lookup: F) -> Result<ClaimNodeConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut parsed: toml::Value = toml::from_str(raw).map_err(|e| ConfigError::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    })?;
    let missing_env = resolve_env_refs(&mut parsed, &lookup)?;
    let mut cfg = parsed
        .try_into::<ClaimNodeConfig>()
        .map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
    cfg.missing_env = missing_env;
    Ok(cfg)
}

impl ClaimNodeConfig {
    /// Environment variables referenced by the config but not set.
    pub fn missing_env(&self) -> &[String] {
        &self.missing_env
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.missing_env.is_empty() {
            return Err(ConfigError::MissingEnv(self.missing_env.clone()));
        }

        if self.chain.url.trim().is_empty() {
            return Err(ConfigError::invalid("chain.url", "is empty"));
        }
        if self.chain.retry_max == 0 {
            return Err(ConfigError::invalid("chain.retry_max", "must be >= 1"));
        }
        if self.chain.timeout_ms == 0 {
            return Err(ConfigError::invalid("chain.timeout_ms", "must be >= 1"));
        }
        if self.rewards.claim_ttl_secs == 0 {
            return Err(ConfigError::invalid("rewards.claim_ttl_secs", "must be >= 1"));
        }
        if self.limits.enabled && (self.limits.burst == 0 || self.limits.refill_per_minute == 0) {
            return Err(ConfigError::invalid(
                "limits",
                "burst and refill_per_minute must be >= 1 when enabled",
            ));
        }
        self.logging.log_format()?;

        self.pass_contract()?;
        self.allocator()?;
        self.signer()?;
        Ok(())
    }

    pub fn pass_contract(&self) -> Result<Address, ConfigError> {
        parse_address(&self.pass.contract).map_err(|e| ConfigError::invalid("pass.contract", e))
    }

    pub fn pass_id(&self) -> U256 {
        U256::from(self.pass.token_id)
    }

    pub fn allocator(&self) -> Result<RewardAllocator, ConfigError> {
        let rewards = &self.rewards;
        let tokens = rewards
            .bonus
            .iter()
            .enumerate()
            .map(|(i, b)| b.to_bonus_token(i))
            .collect::<Result<Vec<_>, _>>()?;
        let tokens: [BonusToken; 2] = tokens.try_into().map_err(|v: Vec<BonusToken>| {
            ConfigError::invalid(
                "rewards.bonus",
                format!("exactly two bonus tokens are required, got {}", v.len()),
            )
        })?;
        RewardAllocator::new(
            rewards.primary_symbol.trim(),
            rewards.max_primary_amount,
            rewards.display_decimals,
            tokens,
        )
        .map_err(|e| ConfigError::invalid("rewards", e))
    }

    /// Load the signing key and, when configured, check it derives the
    /// expected address.
    pub fn signer(&self) -> Result<AttestationSigner, ConfigError> {
        let signer = AttestationSigner::from_private_key(&self.signer.private_key)
            .map_err(|e| ConfigError::invalid("signer.private_key", e))?;
        let expected = self
            .signer
            .expected_address
            .as_deref()
            .filter(|s| !s.trim().is_empty());
        if let Some(expected) = expected {
            let expected = parse_address(expected)
                .map_err(|e| ConfigError::invalid("signer.expected_address", e))?;
            if expected != signer.address() {
                return Err(ConfigError::invalid(
                    "signer.expected_address",
                    format!(
                        "key derives {}, expected {}",
                        checksum(&signer.address()),
                        checksum(&expected)
                    ),
                ));
            }
        }
        Ok(signer)
    }
}
