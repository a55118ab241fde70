#![forbid(unsafe_code)]

//! Claim attestation and its on-chain byte layout.
//!
//! Exact rule: `databytes = abi.encode(address recipient, uint256 amountZQT,
//! address bonusToken, uint256 bonusAmount, uint256 deadline, uint256 nonce)`.
//! Six 32-byte words, addresses left-padded with 12 zero bytes, integers
//! big-endian. The game contract `abi.decode`s the same tuple, so any change
//! here breaks every signature silently.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, U256};
use thiserror::Error;

/// 6 fields × 32-byte words.
pub const ENCODED_CLAIM_LEN: usize = 6 * 32;

const CLAIM_LAYOUT: [ParamType; 6] = [
    ParamType::Address,
    ParamType::Uint(256),
    ParamType::Address,
    ParamType::Uint(256),
    ParamType::Uint(256),
    ParamType::Uint(256),
];

/// Word indices that carry addresses.
const ADDRESS_WORDS: [usize; 2] = [0, 2];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationError {
    #[error("encoded claim must be {ENCODED_CLAIM_LEN} bytes, got {0}")]
    Length(usize),
    #[error("word {0} is not a canonically padded address")]
    AddressPadding(usize),
    #[error("deadline does not fit in 64 bits")]
    DeadlineOverflow,
    #[error("abi decode failed: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAttestation {
    pub recipient: Address,
    pub primary_amount: U256,
    pub bonus_token: Address,
    pub bonus_amount: U256,
    /// Unix seconds after which the contract refuses the claim.
    pub expiry: u64,
    pub nonce: U256,
}

impl ClaimAttestation {
    pub fn encode(&self) -> Vec<u8> {
        abi::encode(&[
            Token::Address(self.recipient),
            Token::Uint(self.primary_amount),
            Token::Address(self.bonus_token),
            Token::Uint(self.bonus_amount),
            Token::Uint(U256::from(self.expiry)),
            Token::Uint(self.nonce),
        ])
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AttestationError> {
        if bytes.len() != ENCODED_CLAIM_LEN {
            return Err(AttestationError::Length(bytes.len()));
        }
        for word in ADDRESS_WORDS {
            let start = word * 32;
            if bytes[start..start + 12].iter().any(|b| *b != 0) {
                return Err(AttestationError::AddressPadding(word));
            }
        }

        let tokens =
            abi::decode(&CLAIM_LAYOUT, bytes).map_err(|e| AttestationError::Decode(e.to_string()))?;
        let [recipient, primary, bonus_token, bonus_amount, expiry, nonce]: [Token; 6] = tokens
            .try_into()
            .map_err(|_| AttestationError::Decode("expected 6 tokens".to_string()))?;

        let expiry = uint(expiry)?;
        if expiry > U256::from(u64::MAX) {
            return Err(AttestationError::DeadlineOverflow);
        }

        Ok(Self {
            recipient: address(recipient)?,
            primary_amount: uint(primary)?,
            bonus_token: address(bonus_token)?,
            bonus_amount: uint(bonus_amount)?,
            expiry: expiry.as_u64(),
            nonce: uint(nonce)?,
        })
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs > self.expiry
    }
}

fn uint(token: Token) -> Result<U256, AttestationError> {
    token
        .into_uint()
        .ok_or_else(|| AttestationError::Decode("expected uint256".to_string()))
}

fn address(token: Token) -> Result<Address, AttestationError> {
    token
        .into_address()
        .ok_or_else(|| AttestationError::Decode("expected address".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClaimAttestation {
        ClaimAttestation {
            recipient: Address::repeat_byte(0xab),
            primary_amount: U256::from(150u64),
            bonus_token: Address::repeat_byte(0xcd),
            bonus_amount: U256::exp10(17),
            expiry: 1_700_000_060,
            nonce: U256::from(u128::MAX),
        }
    }

    #[test]
    fn encode_is_deterministic_and_fixed_width() {
        let a = sample().encode();
        let b = sample().encode();
        assert_eq!(a, b);
        assert_eq!(a.len(), ENCODED_CLAIM_LEN);
    }

    #[test]
    fn decode_inverts_encode() {
        let claim = sample();
        assert_eq!(ClaimAttestation::decode(&claim.encode()).unwrap(), claim);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let mut bytes = sample().encode();
        bytes.push(0);
        assert_eq!(
            ClaimAttestation::decode(&bytes),
            Err(AttestationError::Length(ENCODED_CLAIM_LEN + 1))
        );
        assert_eq!(
            ClaimAttestation::decode(&bytes[..64]),
            Err(AttestationError::Length(64))
        );
    }

    #[test]
    fn decode_rejects_dirty_address_padding() {
        let mut bytes = sample().encode();
        bytes[64] = 1; // high byte of the bonus token word
        assert_eq!(
            ClaimAttestation::decode(&bytes),
            Err(AttestationError::AddressPadding(2))
        );
    }

    #[test]
    fn decode_rejects_oversized_deadline() {
        let mut bytes = sample().encode();
        bytes[4 * 32] = 1;
        assert_eq!(
            ClaimAttestation::decode(&bytes),
            Err(AttestationError::DeadlineOverflow)
        );
    }

    #[test]
    fn expiry_is_inclusive() {
        let claim = sample();
        assert!(!claim.is_expired(claim.expiry));
        assert!(claim.is_expired(claim.expiry + 1));
    }
}
