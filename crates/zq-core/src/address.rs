#![forbid(unsafe_code)]

use ethers::types::Address;
use ethers::utils::to_checksum;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be 40 hex characters, got {0}")]
    BadLength(usize),
    #[error("address contains non-hex characters")]
    NotHex,
    #[error("address fails EIP-55 checksum")]
    BadChecksum,
    #[error("zero address is not allowed")]
    Zero,
}

/// Parse a `0x`-prefixed 20-byte address.
///
/// All-lowercase and all-uppercase hex are accepted as-is. Mixed case is
/// treated as an EIP-55 checksum and must match exactly. The zero address is
/// rejected: it can neither hold a pass nor receive tokens.
pub fn parse_address(raw: &str) -> Result<Address, AddressError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(AddressError::Empty);
    }
    let Some(body) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
        return Err(AddressError::MissingPrefix);
    };
    if body.len() != 40 {
        return Err(AddressError::BadLength(body.len()));
    }
    let bytes = hex::decode(body).map_err(|_| AddressError::NotHex)?;
    let addr = Address::from_slice(&bytes);

    let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper && checksum(&addr)[2..] != *body {
        return Err(AddressError::BadChecksum);
    }

    if addr == Address::zero() {
        return Err(AddressError::Zero);
    }
    Ok(addr)
}

/// EIP-55 mixed-case rendering (`0x`-prefixed).
pub fn checksum(addr: &Address) -> String {
    to_checksum(addr, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VITALIK: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    #[test]
    fn accepts_checksummed_and_single_case() {
        let a = parse_address(VITALIK).unwrap();
        let b = parse_address(&VITALIK.to_lowercase()).unwrap();
        let c = parse_address(&format!("0x{}", VITALIK[2..].to_uppercase())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(checksum(&a), VITALIK);
    }

    #[test]
    fn rejects_bad_checksum() {
        // Flip the case of one letter.
        let bad = VITALIK.replacen("dA", "Da", 1);
        assert_eq!(parse_address(&bad), Err(AddressError::BadChecksum));
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert_eq!(parse_address(""), Err(AddressError::Empty));
        assert_eq!(parse_address("   "), Err(AddressError::Empty));
        assert_eq!(
            parse_address("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045"),
            Err(AddressError::MissingPrefix)
        );
        assert_eq!(parse_address("0x1234"), Err(AddressError::BadLength(4)));
        assert_eq!(
            parse_address("0xzz8da6bf26964af9d7eed9e03e53415d37aa9604"),
            Err(AddressError::NotHex)
        );
        assert_eq!(
            parse_address("0x0000000000000000000000000000000000000000"),
            Err(AddressError::Zero)
        );
    }
}
