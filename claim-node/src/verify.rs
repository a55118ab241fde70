#![forbid(unsafe_code)]

//! Offline inspection of a signed claim, for user-reported failures.

use thiserror::Error;
use zq_core::{
    recover_signer, Address, AttestationError, ClaimAttestation, ClaimSignature, SigningError,
};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("databytes is not valid hex: {0}")]
    Hex(String),
    #[error(transparent)]
    Attestation(#[from] AttestationError),
    #[error(transparent)]
    Signature(#[from] SigningError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub claim: ClaimAttestation,
    pub signer: Address,
    pub expired: bool,
}

pub fn verify_claim(
    databytes: &str,
    sig: &ClaimSignature,
    now_secs: u64,
) -> Result<VerifyReport, VerifyError> {
    let trimmed = databytes.trim();
    let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let raw = hex::decode(body).map_err(|e| VerifyError::Hex(e.to_string()))?;
    let claim = ClaimAttestation::decode(&raw)?;
    let signer = recover_signer(&raw, sig)?;
    Ok(VerifyReport {
        expired: claim.is_expired(now_secs),
        claim,
        signer,
    })
}
