use std::time::Duration;

use alloy::{
    network::{EthereumWallet, ReceiptResponse, TransactionBuilder},
    primitives::{Address, B256, Bytes},
    providers::{PendingTransactionConfig, Provider, ProviderBuilder},
    rpc::{client::RpcClient, types::TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::{http::reqwest::Url, layers::RetryBackoffLayer},
};
use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::validate_private_key;
use crate::error::{Error as CrateError, Result as CrateResult};

/// Failures reported by the chain node or the transport in front of it
#[derive(Debug, Error)]
pub enum ChainError {
    /// Node unreachable, malformed response, retries exhausted
    #[error("transport error: {0}")]
    Transport(String),
    /// The node refused the transaction or call
    #[error("rejected by node: {0}")]
    Rejected(String),
    /// The transaction was not confirmed in time
    #[error("timed out after {0:?} waiting for confirmation")]
    Timeout(Duration),
}

/// A contract creation to submit
#[derive(Debug, Clone)]
pub struct CreationRequest {
    /// Bytecode followed by ABI encoded constructor arguments
    pub init_code: Bytes,
    /// Fixed legacy gas price in wei; fillers estimate fees when absent
    pub gas_price: Option<u128>,
}

/// What the node reports once a creation transaction is confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub contract_address: Option<Address>,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// The RPC surface the orchestrator and reader need.
///
/// Implemented over HTTP by [`RpcCaller`]; tests substitute an in-memory chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Sign and broadcast a creation transaction, returning its hash
    async fn send_creation(
        &self,
        signer: &PrivateKeySigner,
        request: CreationRequest,
    ) -> Result<B256, ChainError>;

    /// Block until the transaction has the required confirmations
    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<CreationReceipt, ChainError>;

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError>;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;
}

/// Parse a credential into a local signer.
///
/// Never touches the network, so a bad credential fails before anything is sent.
pub fn signer_from_key(private_key: &Zeroizing<String>) -> CrateResult<PrivateKeySigner> {
    let clean_key = validate_private_key(private_key.as_str())?;
    clean_key
        .parse::<PrivateKeySigner>()
        .map_err(|e| CrateError::config(format!("Failed to parse private key: {}", e)))
}

/// Retry policy for transient transport failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 1000,
        }
    }
}

/// Compute units per second budget handed to the retry layer
const COMPUTE_UNITS_PER_SECOND: u64 = 100;

/// Handles contract calls via Alloy over HTTP
pub struct RpcCaller {
    url: Url,
    retry: RetryPolicy,
}

impl RpcCaller {
    pub fn new(rpc_url: &str, retry: RetryPolicy) -> CrateResult<Self> {
        let url = rpc_url
            .parse::<Url>()
            .map_err(|e| CrateError::config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;

        Ok(Self { url, retry })
    }

    fn client(&self) -> RpcClient {
        let retry_layer = RetryBackoffLayer::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            COMPUTE_UNITS_PER_SECOND,
        );

        RpcClient::builder()
            .layer(retry_layer)
            .http(self.url.clone())
    }

    fn provider(&self) -> impl Provider {
        ProviderBuilder::new().connect_client(self.client())
    }
}

#[async_trait]
impl ChainClient for RpcCaller {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider()
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))
    }

    async fn send_creation(
        &self,
        signer: &PrivateKeySigner,
        request: CreationRequest,
    ) -> Result<B256, ChainError> {
        let wallet = EthereumWallet::from(signer.clone());

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_client(self.client());

        let mut tx = TransactionRequest::default().with_deploy_code(request.init_code);
        if let Some(gas_price) = request.gas_price {
            tx = tx.with_gas_price(gas_price);
        }

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::Rejected(e.to_string()))?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<CreationReceipt, ChainError> {
        let provider = self.provider();

        let config =
            PendingTransactionConfig::new(tx_hash).with_required_confirmations(confirmations);

        let confirmed = async {
            provider
                .watch_pending_transaction(config)
                .await
                .map_err(|e| ChainError::Transport(format!("Transaction watch failed: {}", e)))?
                .await
                .map_err(|e| ChainError::Transport(format!("Failed to confirm transaction: {}", e)))
        };

        tokio::time::timeout(timeout, confirmed)
            .await
            .map_err(|_| ChainError::Timeout(timeout))??;

        let receipt = provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .ok_or_else(|| {
                ChainError::Transport(format!("No receipt for confirmed transaction {}", tx_hash))
            })?;

        Ok(CreationReceipt {
            tx_hash,
            success: receipt.status(),
            contract_address: receipt.contract_address(),
            block_number: receipt.block_number(),
            gas_used: receipt.gas_used(),
        })
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        self.provider()
            .get_code_at(address)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::default().to(to).input(data.into());

        self.provider().call(tx).await.map_err(|e| {
            // error responses carry a JSON-RPC code; anything else is the transport
            if e.as_error_resp().is_some() {
                ChainError::Rejected(e.to_string())
            } else {
                ChainError::Transport(e.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_from_key() {
        let key = Zeroizing::new(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
        );
        let signer = signer_from_key(&key).unwrap();
        assert_eq!(
            signer.address().to_checksum(None),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );

        let err = signer_from_key(&Zeroizing::new("not-a-key".to_string())).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_rpc_url() {
        assert!(RpcCaller::new("not a url", RetryPolicy::default()).is_err());
        assert!(RpcCaller::new("https://rpc.sepolia-api.lisk.com", RetryPolicy::default()).is_ok());
    }
}
