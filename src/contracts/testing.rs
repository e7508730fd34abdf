//! In-memory chain used by the orchestrator and reader tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, B256, Bytes, keccak256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use zeroize::Zeroizing;

use super::caller::{ChainClient, ChainError, CreationReceipt, CreationRequest};

/// Anvil's first dev account
pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn dev_key() -> Zeroizing<String> {
    Zeroizing::new(DEV_KEY.to_string())
}

/// ABI of the marketplace contract as compiled from DeclanWork.sol
pub const DECLAN_WORK_ABI: &str = r#"[
    {"type":"constructor","inputs":[],"stateMutability":"nonpayable"},
    {"type":"function","name":"noOfFreelancers","inputs":[],
     "outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
    {"type":"function","name":"noOfGigOwners","inputs":[],
     "outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
    {"type":"function","name":"noOfCreatedGigs","inputs":[],
     "outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
    {"type":"function","name":"freelancers","inputs":[{"name":"","type":"address"}],
     "outputs":[{"name":"name","type":"string"},{"name":"wallet","type":"address"},
                {"name":"completedGigs","type":"uint256"}],"stateMutability":"view"},
    {"type":"function","name":"gigOwners","inputs":[{"name":"","type":"address"}],
     "outputs":[{"name":"name","type":"string"},{"name":"wallet","type":"address"}],
     "stateMutability":"view"},
    {"type":"function","name":"gigs","inputs":[{"name":"","type":"uint256"}],
     "outputs":[{"name":"id","type":"uint256"},{"name":"owner","type":"address"},
                {"name":"freelancer","type":"address"},{"name":"state","type":"uint8"}],
     "stateMutability":"view"},
    {"type":"function","name":"createGig","inputs":[{"name":"title","type":"string"}],
     "outputs":[],"stateMutability":"nonpayable"}
]"#;

pub fn declan_abi() -> JsonAbi {
    serde_json::from_str(DECLAN_WORK_ABI).unwrap()
}

#[derive(Default)]
struct FakeState {
    network_calls: usize,
    nonces: HashMap<Address, u64>,
    code: HashMap<Address, Bytes>,
    receipts: HashMap<B256, CreationReceipt>,
    responses: HashMap<(Address, Bytes), Bytes>,
    call_log: Vec<(Address, Bytes)>,
    revert_creations: bool,
    reject_sends: Option<String>,
    stalled: bool,
}

/// Chain with CREATE address derivation, per-account nonces and canned
/// `eth_call` responses
pub struct FakeChain {
    chain_id: u64,
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Constructors revert: receipts come back with a failed status
    pub fn reverting(self) -> Self {
        self.state.lock().unwrap().revert_creations = true;
        self
    }

    /// The node refuses every transaction with the given message
    pub fn rejecting(self, message: &str) -> Self {
        self.state.lock().unwrap().reject_sends = Some(message.to_string());
        self
    }

    /// Transactions are accepted but never confirmed
    pub fn stalled(self) -> Self {
        self.state.lock().unwrap().stalled = true;
        self
    }

    /// Every RPC made so far, of any kind
    pub fn network_calls(&self) -> usize {
        self.state.lock().unwrap().network_calls
    }

    pub fn call_log(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().call_log.clone()
    }

    pub fn set_code(&self, address: Address, code: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .code
            .insert(address, Bytes::copy_from_slice(code));
    }

    /// Make `function(args)` at `address` return `outputs`
    pub fn respond(
        &self,
        address: Address,
        function: &Function,
        args: &[DynSolValue],
        outputs: &[DynSolValue],
    ) {
        let calldata = Bytes::from(function.abi_encode_input(args).unwrap());
        let returned = Bytes::from(function.abi_encode_output(outputs).unwrap());
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((address, calldata), returned);
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.state.lock().unwrap().network_calls += 1;
        Ok(self.chain_id)
    }

    async fn send_creation(
        &self,
        signer: &PrivateKeySigner,
        request: CreationRequest,
    ) -> Result<B256, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;

        if let Some(message) = &state.reject_sends {
            return Err(ChainError::Rejected(message.clone()));
        }

        let sender = signer.address();
        let nonce = state.nonces.get(&sender).copied().unwrap_or_default();
        state.nonces.insert(sender, nonce + 1);

        let address = sender.create(nonce);
        let mut preimage = address.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = keccak256(preimage);

        let success = !state.revert_creations;
        if success {
            state.code.insert(address, request.init_code);
        }

        let block_number = state.receipts.len() as u64 + 1;
        state.receipts.insert(
            tx_hash,
            CreationReceipt {
                tx_hash,
                success,
                contract_address: success.then_some(address),
                block_number: Some(block_number),
                gas_used: 21_000,
            },
        );

        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        _confirmations: u64,
        timeout: Duration,
    ) -> Result<CreationReceipt, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;

        if state.stalled {
            return Err(ChainError::Timeout(timeout));
        }

        state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::Transport(format!("unknown transaction {}", tx_hash)))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        Ok(state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        state.call_log.push((to, data.clone()));

        // a call to an account without code succeeds with empty output
        if !state.code.contains_key(&to) {
            return Ok(Bytes::new());
        }

        state
            .responses
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| ChainError::Rejected("execution reverted".to_string()))
    }
}
