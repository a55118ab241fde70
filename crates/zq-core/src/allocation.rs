#![forbid(unsafe_code)]

//! Score → reward mapping.
//!
//! - Primary amount: identity on the score (no randomness), capped.
//! - Bonus token: fair coin flip between exactly two configured tokens.
//! - Bonus amount: uniform over the token's `[min, max)` interval, quantized
//!   to the display precision so the signed amount and the amount shown to
//!   the player are the same number.

use ethers::types::{Address, U256};
use ethers::utils::{format_units, parse_units};
use rand::Rng;
use thiserror::Error;

/// Upper bound on a single claim's primary amount unless configured otherwise.
pub const DEFAULT_MAX_PRIMARY_AMOUNT: u64 = 10_000;

/// Fractional digits kept in `rewardTokenAmount`.
pub const DEFAULT_DISPLAY_DECIMALS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("score must be greater than 0, got {0}")]
    InvalidScore(i64),
    #[error("score {score} exceeds per-claim cap {cap}")]
    ScoreAboveCap { score: u64, cap: u64 },
    #[error("per-claim cap must be greater than 0")]
    ZeroCap,
    #[error("invalid bonus token {symbol}: {reason}")]
    InvalidBonus { symbol: String, reason: String },
    #[error("unit conversion failed: {0}")]
    Units(String),
}

/// A bonus candidate. `min`/`max` are in the token's base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusToken {
    pub symbol: String,
    pub address: Address,
    pub decimals: u32,
    pub min: U256,
    pub max: U256,
}

impl BonusToken {
    /// Build from whole-token decimal strings, e.g. `("0.05", "0.1")`.
    pub fn from_decimal_bounds(
        symbol: impl Into<String>,
        address: Address,
        decimals: u32,
        min: &str,
        max: &str,
    ) -> Result<Self, AllocationError> {
        let symbol = symbol.into();
        let min = parse_token_amount(&symbol, min, decimals)?;
        let max = parse_token_amount(&symbol, max, decimals)?;
        Ok(Self {
            symbol,
            address,
            decimals,
            min,
            max,
        })
    }
}

fn parse_token_amount(symbol: &str, raw: &str, decimals: u32) -> Result<U256, AllocationError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('-') {
        return Err(AllocationError::InvalidBonus {
            symbol: symbol.to_string(),
            reason: format!("amount must be a non-negative decimal, got {raw:?}"),
        });
    }
    let parsed = parse_units(raw, decimals).map_err(|e| AllocationError::InvalidBonus {
        symbol: symbol.to_string(),
        reason: format!("cannot parse {raw:?}: {e}"),
    })?;
    Ok(parsed.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardAllocation {
    pub primary_symbol: String,
    pub primary_amount: U256,
    pub bonus_token: BonusToken,
    pub bonus_amount: U256,
    /// `bonus_amount` rendered with the configured number of fractional digits.
    pub bonus_display: String,
}

/// Precomputed draw schedule: the bonus is `quantum * k` for
/// `k in first_step..first_step + step_count`.
#[derive(Debug, Clone)]
struct BonusSchedule {
    token: BonusToken,
    quantum: U256,
    first_step: u128,
    step_count: u128,
}

impl BonusSchedule {
    fn new(token: BonusToken, display_decimals: u32) -> Result<Self, AllocationError> {
        let invalid = |reason: String| AllocationError::InvalidBonus {
            symbol: token.symbol.clone(),
            reason,
        };
        if token.symbol.trim().is_empty() {
            return Err(invalid("symbol is empty".to_string()));
        }
        if token.address == Address::zero() {
            return Err(invalid("address is zero".to_string()));
        }
        if token.min >= token.max {
            return Err(invalid(format!(
                "min {} must be below max {}",
                token.min, token.max
            )));
        }

        let shift = token.decimals.saturating_sub(display_decimals);
        let quantum = U256::exp10(usize::try_from(shift).unwrap_or(usize::MAX));
        if !(token.min % quantum).is_zero() || !(token.max % quantum).is_zero() {
            return Err(invalid(format!(
                "bounds must have at most {display_decimals} fractional digits"
            )));
        }

        let first_step =
            to_u128(token.min / quantum).ok_or_else(|| invalid("min too large".to_string()))?;
        let last_step =
            to_u128(token.max / quantum).ok_or_else(|| invalid("max too large".to_string()))?;

        Ok(Self {
            token,
            quantum,
            first_step,
            step_count: last_step - first_step,
        })
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let step = self.first_step + rng.gen_range(0..self.step_count);
        U256::from(step) * self.quantum
    }
}

fn to_u128(v: U256) -> Option<u128> {
    if v > U256::from(u128::MAX) {
        None
    } else {
        Some(v.as_u128())
    }
}

/// Render a base-unit amount with `display_decimals` fractional digits
/// (truncated, never rounded up past the interval's upper bound).
pub fn display_amount(
    amount: U256,
    decimals: u32,
    display_decimals: u32,
) -> Result<String, AllocationError> {
    let full = format_units(amount, decimals).map_err(|e| AllocationError::Units(e.to_string()))?;
    let keep = usize::try_from(display_decimals).unwrap_or(usize::MAX);
    Ok(match full.split_once('.') {
        Some((whole, frac)) if keep > 0 => {
            let mut frac: String = frac.chars().take(keep).collect();
            while frac.len() < keep {
                frac.push('0');
            }
            format!("{whole}.{frac}")
        }
        Some((whole, _)) => whole.to_string(),
        None if keep > 0 => format!("{full}.{}", "0".repeat(keep)),
        None => full,
    })
}

#[derive(Debug, Clone)]
pub struct RewardAllocator {
    primary_symbol: String,
    max_primary_amount: u64,
    display_decimals: u32,
    bonus: [BonusSchedule; 2],
}

impl RewardAllocator {
    pub fn new(
        primary_symbol: impl Into<String>,
        max_primary_amount: u64,
        display_decimals: u32,
        bonus: [BonusToken; 2],
    ) -> Result<Self, AllocationError> {
        if max_primary_amount == 0 {
            return Err(AllocationError::ZeroCap);
        }
        let [first, second] = bonus;
        if first.address == second.address {
            return Err(AllocationError::InvalidBonus {
                symbol: second.symbol,
                reason: "both bonus tokens share one address".to_string(),
            });
        }
        Ok(Self {
            primary_symbol: primary_symbol.into(),
            max_primary_amount,
            display_decimals,
            bonus: [
                BonusSchedule::new(first, display_decimals)?,
                BonusSchedule::new(second, display_decimals)?,
            ],
        })
    }

    pub fn primary_symbol(&self) -> &str {
        &self.primary_symbol
    }

    pub fn max_primary_amount(&self) -> u64 {
        self.max_primary_amount
    }

    pub fn bonus_tokens(&self) -> [&BonusToken; 2] {
        [&self.bonus[0].token, &self.bonus[1].token]
    }

    /// Check a raw score without drawing anything.
    pub fn validate_score(&self, score: i64) -> Result<u64, AllocationError> {
        if score <= 0 {
            return Err(AllocationError::InvalidScore(score));
        }
        let score = u64::try_from(score).map_err(|_| AllocationError::InvalidScore(score))?;
        if score > self.max_primary_amount {
            return Err(AllocationError::ScoreAboveCap {
                score,
                cap: self.max_primary_amount,
            });
        }
        Ok(score)
    }

    pub fn allocate<R: Rng + ?Sized>(
        &self,
        score: i64,
        rng: &mut R,
    ) -> Result<RewardAllocation, AllocationError> {
        let primary = self.validate_score(score)?;

        let schedule = if rng.gen::<bool>() {
            &self.bonus[0]
        } else {
            &self.bonus[1]
        };
        let bonus_amount = schedule.draw(rng);
        let bonus_display =
            display_amount(bonus_amount, schedule.token.decimals, self.display_decimals)?;

        Ok(RewardAllocation {
            primary_symbol: self.primary_symbol.clone(),
            primary_amount: U256::from(primary),
            bonus_token: schedule.token.clone(),
            bonus_amount,
            bonus_display,
        })
    }
}
