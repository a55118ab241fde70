#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

//! Zero Quest claim attestation protocol.
//!
//! A claim flows through four stages, each owned by one module:
//!
//! 1. [`eligibility`]: the recipient must hold a pass (ERC-1155 balance > 0).
//! 2. [`allocation`]: the score maps 1:1 to the primary token, and a bonus
//!    token/amount is drawn at random from two configured candidates.
//! 3. [`attestation`]: the six claim fields are ABI-encoded exactly as the
//!    game contract decodes them.
//! 4. [`signer`]: `keccak256(databytes)` is signed with the process key so the
//!    contract can `ecrecover` it against its authorized signer.

pub mod address;
pub mod allocation;
pub mod attestation;
pub mod clock;
pub mod eligibility;
pub mod entropy;
pub mod signer;

pub use address::{checksum, parse_address, AddressError};
pub use allocation::{
    AllocationError, BonusToken, RewardAllocation, RewardAllocator, DEFAULT_DISPLAY_DECIMALS,
    DEFAULT_MAX_PRIMARY_AMOUNT,
};
pub use attestation::{AttestationError, ClaimAttestation, ENCODED_CLAIM_LEN};
pub use clock::{FixedTimeSource, SystemTimeSource, TimeSource};
pub use eligibility::{
    EligibilityError, EligibilityVerifier, MockPassRegistry, PassRegistry, RegistryError,
};
pub use entropy::{
    CounterNonceSource, FixedSeedRng, NonceSource, OsSeededRng, RandomNonceSource, RngProvider,
};
pub use signer::{claim_digest, recover_signer, AttestationSigner, ClaimSignature, SigningError};

pub use ethers::types::{Address, H256, U256};
