#![forbid(unsafe_code)]

//! Signing scheme: secp256k1 ECDSA over `keccak256(databytes)`.
//!
//! The digest is signed raw (no EIP-191 prefix); the game contract recovers
//! with `ecrecover(keccak256(databytes), v, r, s)` and compares the result to
//! its configured `Signer()`.

use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::keccak256;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    #[error("signing failed: {0}")]
    Crypto(String),
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("signature recovery failed: {0}")]
    Recovery(String),
}

pub fn claim_digest(encoded: &[u8]) -> H256 {
    H256::from(keccak256(encoded))
}

/// `{v, r, s}` as the contract's `claim(bytes, uint8, bytes32, bytes32)` takes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSignature {
    /// 27 or 28.
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl ClaimSignature {
    fn from_ethers(sig: &Signature) -> Result<Self, SigningError> {
        let v = u8::try_from(sig.v)
            .map_err(|_| SigningError::Malformed(format!("v out of range: {}", sig.v)))?;
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        sig.r.to_big_endian(&mut r);
        sig.s.to_big_endian(&mut s);
        Ok(Self { v, r, s })
    }

    fn to_ethers(self) -> Signature {
        Signature {
            r: U256::from_big_endian(&self.r),
            s: U256::from_big_endian(&self.s),
            v: u64::from(self.v),
        }
    }

    /// Parse the `v`/`r`/`s` triple as the claim endpoint returns it.
    pub fn from_parts(v: u8, r_hex: &str, s_hex: &str) -> Result<Self, SigningError> {
        if v != 27 && v != 28 {
            return Err(SigningError::Malformed(format!("v must be 27 or 28, got {v}")));
        }
        Ok(Self {
            v,
            r: word_from_hex("r", r_hex)?,
            s: word_from_hex("s", s_hex)?,
        })
    }

    pub fn r_hex(&self) -> String {
        format!("0x{}", hex::encode(self.r))
    }

    pub fn s_hex(&self) -> String {
        format!("0x{}", hex::encode(self.s))
    }
}

fn word_from_hex(name: &str, raw: &str) -> Result<[u8; 32], SigningError> {
    let body = raw.trim().trim_start_matches("0x");
    let bytes = hex::decode(body).map_err(|e| SigningError::Malformed(format!("{name}: {e}")))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        SigningError::Malformed(format!("{name}: expected 32 bytes, got {}", bytes.len()))
    })
}

/// Holds the process signing key. Loaded once at startup.
pub struct AttestationSigner {
    wallet: LocalWallet,
}

impl fmt::Debug for AttestationSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl AttestationSigner {
    /// Parse a hex secp256k1 private key (with or without `0x`).
    ///
    /// Errors never echo the input.
    pub fn from_private_key(raw: &str) -> Result<Self, SigningError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(SigningError::SignerUnavailable(
                "signing key is empty".to_string(),
            ));
        }
        let key = key
            .strip_prefix("0x")
            .or_else(|| key.strip_prefix("0X"))
            .unwrap_or(key);
        let wallet = key.parse::<LocalWallet>().map_err(|_| {
            SigningError::SignerUnavailable(
                "signing key is not a valid secp256k1 private key".to_string(),
            )
        })?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn sign(&self, encoded: &[u8]) -> Result<ClaimSignature, SigningError> {
        let sig = self
            .wallet
            .sign_hash(claim_digest(encoded))
            .map_err(|e| SigningError::Crypto(e.to_string()))?;
        ClaimSignature::from_ethers(&sig)
    }
}

/// Recover the address that signed `encoded`.
pub fn recover_signer(encoded: &[u8], sig: &ClaimSignature) -> Result<Address, SigningError> {
    sig.to_ethers()
        .recover(claim_digest(encoded))
        .map_err(|e| SigningError::Recovery(e.to_string()))
}
