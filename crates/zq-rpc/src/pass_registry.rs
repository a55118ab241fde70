use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, U256};
use ethers::utils::id;
use zq_core::{PassRegistry, RegistryError};

use crate::{EthRpcClient, RpcError};

pub const BALANCE_OF_SIGNATURE: &str = "balanceOf(address,uint256)";

/// Calldata for ERC-1155 `balanceOf(owner, token_id)`.
pub fn balance_of_calldata(owner: Address, token_id: U256) -> Vec<u8> {
    let mut data = id(BALANCE_OF_SIGNATURE).to_vec();
    data.extend_from_slice(&abi::encode(&[Token::Address(owner), Token::Uint(token_id)]));
    data
}

fn decode_balance(raw: &[u8]) -> Result<U256, RegistryError> {
    // An empty result usually means the address holds no contract code.
    if raw.len() != 32 {
        return Err(RegistryError::Malformed(format!(
            "expected a single 32-byte word, got {} bytes",
            raw.len()
        )));
    }
    let mut tokens = abi::decode(&[ParamType::Uint(256)], raw)
        .map_err(|e| RegistryError::Malformed(e.to_string()))?;
    match tokens.pop() {
        Some(Token::Uint(balance)) => Ok(balance),
        other => Err(RegistryError::Malformed(format!(
            "unexpected token {other:?}"
        ))),
    }
}

impl From<RpcError> for RegistryError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::JsonRpc { .. } => RegistryError::Rejected(err.to_string()),
            RpcError::Decode(_) => RegistryError::Malformed(err.to_string()),
            RpcError::Config(_) | RpcError::Network(_) | RpcError::HttpStatus { .. } => {
                RegistryError::Unavailable(err.to_string())
            }
        }
    }
}

/// Pass registry backed by an on-chain ERC-1155 contract.
pub struct Erc1155PassRegistry {
    client: EthRpcClient,
    contract: Address,
}

impl Erc1155PassRegistry {
    pub fn new(client: EthRpcClient, contract: Address) -> Self {
        Self { client, contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn client(&self) -> &EthRpcClient {
        &self.client
    }
}

#[async_trait]
impl PassRegistry for Erc1155PassRegistry {
    async fn balance_of(&self, owner: Address, token_id: U256) -> Result<U256, RegistryError> {
        let calldata = balance_of_calldata(owner, token_id);
        let raw = self.client.eth_call(self.contract, &calldata).await?;
        decode_balance(&raw)
    }
}
