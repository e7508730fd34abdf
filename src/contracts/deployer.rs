use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::dyn_abi::JsonAbiExt;
use alloy::primitives::{Address, B256, Bytes};
use alloy::signers::local::PrivateKeySigner;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use super::abi::coerce_args;
use super::artifact::{Artifact, ArtifactStore};
use super::caller::{ChainClient, ChainError, CreationRequest, signer_from_key};
use super::deployment::{DeploymentRecord, DeploymentStore, SubmissionLock, future_id};
use crate::config::ModuleConfig;
use crate::error::{Error, Result};

/// Network-specific deployment parameters
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub network: String,
    /// Chain id the endpoint must report, when configured
    pub expected_chain_id: Option<u64>,
    pub gas_price: Option<u128>,
    pub confirmations: u64,
    pub confirmation_timeout: Duration,
    /// Directory for cross-process submission locks; in-process only when absent
    pub lock_dir: Option<PathBuf>,
}

/// A confirmed contract creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub contract_name: String,
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Outcome of deploying one module contract
#[derive(Debug, Clone)]
pub enum ModuleStep {
    Deployed(DeployedContract),
    /// Already recorded for this chain; left untouched
    Existing(DeploymentRecord),
}

/// Submits creation transactions and waits for them to be confirmed.
///
/// Credentials are handed in per call and validated before the first RPC.
/// Submissions through one deployer are serialized so nonces never collide.
pub struct Deployer {
    client: Arc<dyn ChainClient>,
    options: DeployOptions,
    submit: Mutex<()>,
}

impl Deployer {
    pub fn new(client: Arc<dyn ChainClient>, options: DeployOptions) -> Self {
        Self {
            client,
            options,
            submit: Mutex::new(()),
        }
    }

    /// Signer for a credential, or a configuration error naming the network.
    ///
    /// Touches nothing but the key, so callers can reject a missing or
    /// malformed credential before any RPC.
    pub fn signer(network: &str, credential: Option<&Zeroizing<String>>) -> Result<PrivateKeySigner> {
        let credential = credential.ok_or_else(|| {
            Error::config(format!(
                "No signing credential configured for network '{}'",
                network
            ))
        })?;
        signer_from_key(credential)
    }

    /// Deploy a single artifact and block until it is confirmed
    pub async fn deploy(
        &self,
        artifact: &Artifact,
        constructor_args: &[String],
        credential: Option<&Zeroizing<String>>,
    ) -> Result<DeployedContract> {
        let signer = Self::signer(&self.options.network, credential)?;

        let init_code = init_code(artifact, constructor_args)?;
        self.check_chain_id().await?;

        let _guard = self.submit.lock().await;
        let _lock = self.submission_lock(&signer).await?;

        self.submit_and_confirm(&artifact.contract_name, &signer, init_code)
            .await
    }

    /// Deploy every contract of a module that is not yet recorded.
    ///
    /// Contracts go out in declaration order and each record is persisted as
    /// soon as it is confirmed, so a failed run resumes where it stopped.
    /// Records are re-read once the submission lock is held, so a concurrent
    /// run never deploys the same contract twice.
    pub async fn deploy_module(
        &self,
        module_name: &str,
        module: &ModuleConfig,
        artifacts: &ArtifactStore,
        store: &mut DeploymentStore,
        credential: Option<&Zeroizing<String>>,
    ) -> Result<Vec<ModuleStep>> {
        if module.contracts.is_empty() {
            return Err(Error::config(format!(
                "Module '{}' declares no contracts",
                module_name
            )));
        }

        store.reload()?;
        let pending = module
            .contracts
            .iter()
            .any(|c| store.get(&future_id(module_name, &c.name)).is_none());

        // held for the whole run; recorded-only modules need no credential
        let session = if pending {
            let signer = Self::signer(&self.options.network, credential)?;
            self.check_chain_id().await?;
            let guard = self.submit.lock().await;
            let lock = self.submission_lock(&signer).await?;
            store.reload()?;
            Some((signer, guard, lock))
        } else {
            None
        };

        let mut addresses: HashMap<&str, Address> = HashMap::new();
        let mut steps = Vec::with_capacity(module.contracts.len());

        for contract in &module.contracts {
            let id = future_id(module_name, &contract.name);

            if let Some(existing) = store.get(&id) {
                tracing::warn!(
                    "{} already deployed at {} on {}, skipping",
                    id,
                    existing.address,
                    self.options.network
                );
                addresses.insert(contract.name.as_str(), existing.address);
                steps.push(ModuleStep::Existing(existing));
                continue;
            }

            let Some((signer, _, _)) = &session else {
                return Err(Error::deployment(format!(
                    "{} disappeared from {:?} during the run",
                    id,
                    store.path()
                )));
            };

            let args = resolve_references(&contract.args, &addresses)?;
            let artifact = artifacts.load(&contract.name)?;
            let init_code = init_code(&artifact, &args)?;
            let deployed = self
                .submit_and_confirm(&artifact.contract_name, signer, init_code)
                .await?;

            store
                .insert(&DeploymentRecord {
                    future_id: id.clone(),
                    contract_name: contract.name.clone(),
                    address: deployed.address,
                    network: self.options.network.clone(),
                })
                .map_err(|e| {
                    Error::deployment(format!(
                        "{} was deployed at {} (transaction {}) but not recorded: {}",
                        id, deployed.address, deployed.tx_hash, e
                    ))
                })?;

            addresses.insert(contract.name.as_str(), deployed.address);
            steps.push(ModuleStep::Deployed(deployed));
        }

        Ok(steps)
    }

    async fn check_chain_id(&self) -> Result<()> {
        let Some(expected) = self.options.expected_chain_id else {
            return Ok(());
        };

        let actual = self
            .client
            .chain_id()
            .await
            .map_err(|e| Error::deployment(e.to_string()))?;

        if actual != expected {
            return Err(Error::config(format!(
                "Network '{}' is configured for chain {} but the endpoint reports chain {}",
                self.options.network, expected, actual
            )));
        }
        Ok(())
    }

    /// Cross-process lock for the signer's account, when a lock dir is set
    async fn submission_lock(&self, signer: &PrivateKeySigner) -> Result<Option<SubmissionLock>> {
        match (&self.options.lock_dir, self.options.expected_chain_id) {
            (Some(dir), Some(chain_id)) => SubmissionLock::acquire(
                dir,
                chain_id,
                signer.address(),
                self.options.confirmation_timeout,
            )
            .await
            .map(Some),
            _ => Ok(None),
        }
    }

    /// Send and confirm one creation; the caller holds the submission locks
    async fn submit_and_confirm(
        &self,
        contract_name: &str,
        signer: &PrivateKeySigner,
        init_code: Bytes,
    ) -> Result<DeployedContract> {
        tracing::info!(
            "Deploying {} to {} from {}",
            contract_name,
            self.options.network,
            signer.address()
        );
        tracing::debug!("Init code length: {} bytes", init_code.len());

        let request = CreationRequest {
            init_code,
            gas_price: self.options.gas_price,
        };

        let tx_hash = self
            .client
            .send_creation(signer, request)
            .await
            .map_err(|e| Error::deployment(format!("{} was not accepted: {}", contract_name, e)))?;

        tracing::info!("Submitted {} in transaction {}", contract_name, tx_hash);

        let receipt = self
            .client
            .wait_for_receipt(
                tx_hash,
                self.options.confirmations,
                self.options.confirmation_timeout,
            )
            .await
            .map_err(|e| match e {
                ChainError::Timeout(_) => Error::deployment(format!(
                    "{} (transaction {}) was not confirmed: {}",
                    contract_name, tx_hash, e
                )),
                other => Error::deployment(other.to_string()),
            })?;

        if !receipt.success {
            return Err(Error::deployment(format!(
                "Constructor of {} reverted in transaction {}",
                contract_name, tx_hash
            )));
        }

        let address = receipt.contract_address.ok_or_else(|| {
            Error::deployment(format!(
                "Receipt for {} carries no contract address",
                tx_hash
            ))
        })?;

        let code = self
            .client
            .code_at(address)
            .await
            .map_err(|e| Error::deployment(e.to_string()))?;
        if code.is_empty() {
            return Err(Error::deployment(format!(
                "No code at {} after confirming {}",
                address, tx_hash
            )));
        }

        tracing::info!(
            "{} deployed at {} (block {:?}, gas used {})",
            contract_name,
            address,
            receipt.block_number,
            receipt.gas_used
        );

        Ok(DeployedContract {
            contract_name: contract_name.to_string(),
            address,
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
        })
    }
}

/// Creation bytecode followed by the ABI encoded constructor arguments
fn init_code(artifact: &Artifact, constructor_args: &[String]) -> Result<Bytes> {
    if artifact.bytecode.is_empty() {
        return Err(Error::deployment(format!(
            "{} has no creation bytecode (abstract contract or interface?)",
            artifact.contract_name
        )));
    }

    let mut code = artifact.bytecode.to_vec();

    match &artifact.abi.constructor {
        Some(constructor) => {
            let values = coerce_args(&constructor.inputs, constructor_args).map_err(|e| {
                Error::deployment(format!(
                    "Constructor arguments for {}: {}",
                    artifact.contract_name, e
                ))
            })?;
            let encoded = constructor
                .abi_encode_input(&values)
                .map_err(|e| Error::deployment(format!("Failed to encode arguments: {}", e)))?;
            code.extend(encoded);
        }
        None if !constructor_args.is_empty() => {
            return Err(Error::deployment(format!(
                "{} has no constructor but {} argument(s) were given",
                artifact.contract_name,
                constructor_args.len()
            )));
        }
        None => {}
    }

    Ok(Bytes::from(code))
}

/// Replace `@Contract` arguments with addresses deployed earlier in the module
fn resolve_references(args: &[String], deployed: &HashMap<&str, Address>) -> Result<Vec<String>> {
    args.iter()
        .map(|arg| match arg.strip_prefix('@') {
            Some(name) => deployed
                .get(name)
                .map(|address| address.to_checksum(None))
                .ok_or_else(|| {
                    Error::config(format!(
                        "Argument '{}' refers to a contract not deployed earlier in the module",
                        arg
                    ))
                }),
            None => Ok(arg.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::config::ContractConfig;
    use crate::contracts::abi::parse_abi_string;
    use crate::contracts::testing::{DECLAN_WORK_ABI, FakeChain, dev_key};

    fn options(chain_id: u64) -> DeployOptions {
        DeployOptions {
            network: "lisk".to_string(),
            expected_chain_id: Some(chain_id),
            gas_price: Some(1_000_000_000),
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(5),
            lock_dir: None,
        }
    }

    fn artifact() -> Artifact {
        Artifact {
            contract_name: "DeclanWork".to_string(),
            abi: parse_abi_string(DECLAN_WORK_ABI).unwrap(),
            bytecode: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]),
            path: PathBuf::from("artifacts/contracts/DeclanWork.sol/DeclanWork.json"),
            compiler: None,
        }
    }

    fn write_artifact(dir: &Path, name: &str, abi: &str) {
        let path = dir.join(format!("contracts/{0}.sol/{0}.json", name));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            path,
            format!(r#"{{"contractName":"{}","abi":{},"bytecode":"0x6080"}}"#, name, abi),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_deploying_twice_yields_distinct_addresses() {
        let chain = Arc::new(FakeChain::new(4202));
        let deployer = Deployer::new(chain.clone(), options(4202));
        let key = dev_key();

        let first = deployer.deploy(&artifact(), &[], Some(&key)).await.unwrap();
        let second = deployer.deploy(&artifact(), &[], Some(&key)).await.unwrap();

        assert_eq!(first.contract_name, "DeclanWork");
        assert_ne!(first.address, second.address);
        assert_ne!(first.tx_hash, second.tx_hash);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let chain = Arc::new(FakeChain::new(4202));
        let deployer = Deployer::new(chain.clone(), options(4202));

        let err = deployer.deploy(&artifact(), &[], None).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(chain.network_calls(), 0);

        let bad = Zeroizing::new("0xnotakey".to_string());
        let err = deployer.deploy(&artifact(), &[], Some(&bad)).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(chain.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_chain_id_mismatch() {
        let chain = Arc::new(FakeChain::new(1));
        let deployer = Deployer::new(chain, options(4202));

        let err = deployer
            .deploy(&artifact(), &[], Some(&dev_key()))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_network_rejection_is_deployment_error() {
        let chain = Arc::new(FakeChain::new(4202).rejecting("insufficient funds for gas"));
        let deployer = Deployer::new(chain, options(4202));

        let err = deployer
            .deploy(&artifact(), &[], Some(&dev_key()))
            .await
            .unwrap_err();
        assert!(err.is_deployment());
        assert!(err.to_string().contains("insufficient funds"));
    }

    #[tokio::test]
    async fn test_constructor_revert_is_deployment_error() {
        let chain = Arc::new(FakeChain::new(4202).reverting());
        let deployer = Deployer::new(chain, options(4202));

        let err = deployer
            .deploy(&artifact(), &[], Some(&dev_key()))
            .await
            .unwrap_err();
        assert!(err.is_deployment());
        assert!(err.to_string().contains("reverted"));
    }

    #[tokio::test]
    async fn test_confirmation_timeout() {
        let chain = Arc::new(FakeChain::new(4202).stalled());
        let deployer = Deployer::new(chain, options(4202));

        let err = deployer
            .deploy(&artifact(), &[], Some(&dev_key()))
            .await
            .unwrap_err();
        assert!(err.is_deployment());
        assert!(err.to_string().contains("not confirmed"));
    }

    #[tokio::test]
    async fn test_empty_bytecode_and_bad_args() {
        let deployer = Deployer::new(Arc::new(FakeChain::new(4202)), options(4202));

        let mut abstract_contract = artifact();
        abstract_contract.bytecode = Bytes::new();
        let err = deployer
            .deploy(&abstract_contract, &[], Some(&dev_key()))
            .await
            .unwrap_err();
        assert!(err.is_deployment());

        let err = deployer
            .deploy(&artifact(), &["unexpected".to_string()], Some(&dev_key()))
            .await
            .unwrap_err();
        assert!(err.is_deployment());
    }

    #[test]
    fn test_init_code_appends_constructor_args() {
        let mut with_ctor = artifact();
        with_ctor.abi = parse_abi_string(
            r#"[{"type":"constructor","inputs":[{"name":"fee","type":"uint256"}],"stateMutability":"nonpayable"}]"#,
        )
        .unwrap();

        let code = init_code(&with_ctor, &["5".to_string()]).unwrap();
        assert_eq!(code.len(), 5 + 32);
        assert_eq!(code[code.len() - 1], 5);
    }

    #[tokio::test]
    async fn test_deploy_module_records_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts_dir = dir.path().join("artifacts");
        write_artifact(&artifacts_dir, "DeclanWork", DECLAN_WORK_ABI);
        write_artifact(
            &artifacts_dir,
            "Escrow",
            r#"[{"type":"constructor","inputs":[{"name":"market","type":"address"}],"stateMutability":"nonpayable"}]"#,
        );

        let module = ModuleConfig {
            contracts: vec![
                ContractConfig {
                    name: "DeclanWork".to_string(),
                    args: vec![],
                },
                ContractConfig {
                    name: "Escrow".to_string(),
                    args: vec!["@DeclanWork".to_string()],
                },
            ],
        };

        let chain = Arc::new(FakeChain::new(4202));
        let deployer = Deployer::new(chain.clone(), options(4202));
        let artifacts = ArtifactStore::new(&artifacts_dir);
        let deployments_dir = dir.path().join("deployments");
        let mut store = DeploymentStore::open(&deployments_dir, 4202, "lisk").unwrap();

        let steps = deployer
            .deploy_module("DeclanModule", &module, &artifacts, &mut store, Some(&dev_key()))
            .await
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| matches!(s, ModuleStep::Deployed(_))));

        let market = store.get("DeclanModule#DeclanWork").unwrap().address;
        assert!(store.get("DeclanModule#Escrow").is_some());

        // second run finds both recorded and sends nothing
        let calls_before = chain.network_calls();
        let mut store = DeploymentStore::open(&deployments_dir, 4202, "lisk").unwrap();
        let steps = deployer
            .deploy_module("DeclanModule", &module, &artifacts, &mut store, Some(&dev_key()))
            .await
            .unwrap();
        assert!(steps.iter().all(|s| matches!(s, ModuleStep::Existing(_))));
        assert_eq!(chain.network_calls(), calls_before);
        assert_eq!(store.get("DeclanModule#DeclanWork").unwrap().address, market);
    }

    #[test]
    fn test_unresolved_reference() {
        let err = resolve_references(&["@Missing".to_string()], &HashMap::new()).unwrap_err();
        assert!(err.is_configuration());

        let mut deployed = HashMap::new();
        deployed.insert("DeclanWork", Address::repeat_byte(0x22));
        let args = resolve_references(&["@DeclanWork".to_string(), "7".to_string()], &deployed)
            .unwrap();
        assert_eq!(args[1], "7");
        assert_eq!(args[0].to_lowercase(), format!("0x{}", "22".repeat(20)));
    }

    #[tokio::test]
    async fn test_cross_process_lock_released_after_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(4202);
        opts.lock_dir = Some(dir.path().to_path_buf());

        let deployer = Deployer::new(Arc::new(FakeChain::new(4202)), opts);
        deployer
            .deploy(&artifact(), &[], Some(&dev_key()))
            .await
            .unwrap();
        // a second deploy can take the lock again
        deployer
            .deploy(&artifact(), &[], Some(&dev_key()))
            .await
            .unwrap();

        let account = Deployer::signer("lisk", Some(&dev_key())).unwrap().address();
        SubmissionLock::acquire(dir.path(), 4202, account, Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_module_run_sees_records_written_by_another_run() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts_dir = dir.path().join("artifacts");
        write_artifact(&artifacts_dir, "DeclanWork", DECLAN_WORK_ABI);
        let module = ModuleConfig {
            contracts: vec![ContractConfig {
                name: "DeclanWork".to_string(),
                args: vec![],
            }],
        };

        let deployments_dir = dir.path().join("deployments");
        let mut opts = options(4202);
        opts.lock_dir = Some(deployments_dir.clone());
        let chain = Arc::new(FakeChain::new(4202));
        let deployer = Deployer::new(chain.clone(), opts);
        let artifacts = ArtifactStore::new(&artifacts_dir);

        // both runs open their store before either has deployed
        let mut first = DeploymentStore::open(&deployments_dir, 4202, "lisk").unwrap();
        let mut second = DeploymentStore::open(&deployments_dir, 4202, "lisk").unwrap();

        deployer
            .deploy_module("DeclanModule", &module, &artifacts, &mut first, Some(&dev_key()))
            .await
            .unwrap();
        let calls_after_first = chain.network_calls();

        let steps = deployer
            .deploy_module("DeclanModule", &module, &artifacts, &mut second, None)
            .await
            .unwrap();
        assert!(matches!(steps[0], ModuleStep::Existing(_)));
        assert_eq!(chain.network_calls(), calls_after_first);
    }

    #[tokio::test]
    async fn test_module_with_pending_contract_needs_credential() {
        let dir = tempfile::tempdir().unwrap();
        let module = ModuleConfig {
            contracts: vec![ContractConfig {
                name: "DeclanWork".to_string(),
                args: vec![],
            }],
        };
        let chain = Arc::new(FakeChain::new(4202));
        let deployer = Deployer::new(chain.clone(), options(4202));
        let mut store = DeploymentStore::open(dir.path(), 4202, "lisk").unwrap();

        let err = deployer
            .deploy_module(
                "DeclanModule",
                &module,
                &ArtifactStore::new(dir.path()),
                &mut store,
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(chain.network_calls(), 0);
    }
}
