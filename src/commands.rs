use std::sync::Arc;
use std::time::Duration;

use dialoguer::{Confirm, Password};
use eyre::{Result, WrapErr, eyre};
use serde_json::json;

use crate::config::{AppConfig, NetworkConfig, WalletConfig, store_private_key};
use crate::contracts::{
    ArtifactStore, ChainClient, DeployOptions, Deployer, DeploymentStore, ModuleStep, Query,
    QueryResult, RetryPolicy, RpcCaller, StateReader, format_value, parse_contract_address,
};
use crate::error::Error;
use crate::project::Project;

/// Everything a project command needs
pub struct Context {
    pub project: Project,
    pub config: AppConfig,
}

impl Context {
    fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(&self.project.artifacts_dir).expecting(self.config.compiler.clone())
    }

    fn rpc_caller(&self, network: &NetworkConfig) -> Result<Arc<RpcCaller>> {
        let retry = RetryPolicy {
            max_retries: self.config.deploy.retries,
            initial_backoff_ms: self.config.deploy.backoff_ms,
        };
        Ok(Arc::new(RpcCaller::new(&network.rpc_url, retry)?))
    }
}

/// Where `read` finds the contract
pub enum ReadTarget {
    Address(String),
    /// Ignition future id of a recorded deployment
    Deployment(String),
}

pub async fn compile(ctx: &Context) -> Result<()> {
    crate::compile::compile(&ctx.project, &ctx.config.compiler).await?;
    println!("✓ Compiled {} ({})", ctx.project.name, ctx.project.project_type);
    Ok(())
}

pub async fn deploy(
    ctx: &Context,
    module_name: &str,
    network: Option<&str>,
    yes: bool,
    timeout: Option<u64>,
) -> Result<()> {
    let (network_name, network) = ctx.config.network(network)?;
    let module = ctx.config.modules.get(module_name).ok_or_else(|| {
        Error::config(format!("Module '{}' is not declared under [modules]", module_name))
    })?;

    let credential = match ctx.config.wallet_for(network) {
        Some(wallet) => ctx.config.resolve_wallet_key(wallet)?,
        None => None,
    };
    // no prompt and no RPC until the key is known to be usable
    let deployer_account = Deployer::signer(network_name, credential.as_ref())?.address();
    tracing::debug!("Deploying from {}", deployer_account);

    if !yes && !is_local(network) {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Deploy module {} to {}?",
                module_name, network_name
            ))
            .default(false)
            .interact()?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let client = ctx.rpc_caller(network)?;
    let chain_id = chain_id(network, client.as_ref()).await?;

    let options = DeployOptions {
        network: network_name.clone(),
        expected_chain_id: Some(chain_id),
        gas_price: network.gas_price.map(u128::from),
        confirmations: ctx.config.deploy.confirmations,
        confirmation_timeout: timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| ctx.config.deploy.confirmation_timeout()),
        lock_dir: Some(ctx.project.deployments_dir.clone()),
    };

    let deployer = Deployer::new(client, options);
    let mut store = DeploymentStore::open(&ctx.project.deployments_dir, chain_id, network_name)?;

    let steps = deployer
        .deploy_module(
            module_name,
            module,
            &ctx.artifacts(),
            &mut store,
            credential.as_ref(),
        )
        .await?;

    for step in steps {
        match step {
            ModuleStep::Deployed(deployed) => println!(
                "✓ {} deployed at {} (tx {}, block {})",
                deployed.contract_name,
                deployed.address,
                deployed.tx_hash,
                deployed
                    .block_number
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "pending".to_string())
            ),
            ModuleStep::Existing(record) => println!(
                "• {} already deployed at {}",
                record.contract_name, record.address
            ),
        }
    }
    println!("  Records: {}", store.path().display());

    Ok(())
}

pub async fn read(
    ctx: &Context,
    network: Option<&str>,
    contract: &str,
    target: ReadTarget,
    calls: &[String],
    json_output: bool,
) -> Result<()> {
    let (network_name, network) = ctx.config.network(network)?;

    let queries: Vec<Query> = if calls.is_empty() {
        ctx.config
            .queries
            .iter()
            .map(|q| q.call.parse::<Query>())
            .collect::<std::result::Result<_, _>>()?
    } else {
        calls
            .iter()
            .map(|c| c.parse::<Query>())
            .collect::<std::result::Result<_, _>>()?
    };
    if queries.is_empty() {
        return Err(Error::config("No calls given and no [[queries]] configured").into());
    }

    let client = ctx.rpc_caller(network)?;

    let address = match target {
        ReadTarget::Address(address) => parse_contract_address(&address)?,
        ReadTarget::Deployment(id) => {
            let chain_id = chain_id(network, client.as_ref()).await?;
            let store = DeploymentStore::open(&ctx.project.deployments_dir, chain_id, network_name)?;
            store
                .get(&id)
                .ok_or_else(|| {
                    Error::config(format!("No deployment '{}' recorded on {}", id, network_name))
                })?
                .address
        }
    };

    let artifact = ctx.artifacts().load(contract)?;
    tracing::debug!("Using ABI from {:?}", artifact.path);

    let reader = StateReader::new(client.as_ref(), &artifact.abi);
    let results = reader
        .read(address, &queries, |result| {
            if !json_output {
                print_result(result);
            }
        })
        .await?;

    if json_output {
        let entries: Vec<_> = results
            .iter()
            .map(|r| json!({ "call": r.query.to_string(), "result": r.to_json() }))
            .collect();
        let output = json!({
            "contract": contract,
            "address": address.to_checksum(None),
            "network": network_name,
            "results": entries,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

fn print_result(result: &QueryResult) {
    let named: Vec<&str> = result
        .function
        .outputs
        .iter()
        .map(|p| p.name.as_str())
        .filter(|n| !n.is_empty())
        .collect();

    if named.len() > 1 && named.len() == result.values.len() {
        println!("{}:", result.query);
        for (name, value) in named.iter().zip(&result.values) {
            println!("  {}: {}", name, format_value(value));
        }
    } else {
        println!("{}: {}", result.query, result.display_value());
    }
}

pub async fn deployments(ctx: &Context, network: Option<&str>) -> Result<()> {
    let (network_name, network) = ctx.config.network(network)?;
    let client = ctx.rpc_caller(network)?;
    let chain_id = chain_id(network, client.as_ref()).await?;

    let store = DeploymentStore::open(&ctx.project.deployments_dir, chain_id, network_name)?;
    let records = store.records();

    if records.is_empty() {
        println!("No deployments recorded on {} (chain {})", network_name, chain_id);
        return Ok(());
    }

    for record in records {
        println!("{:<40} {}", record.future_id, record.address);
    }
    Ok(())
}

pub fn networks(config: &AppConfig) -> Result<()> {
    if config.networks.is_empty() {
        println!("No networks configured.");
        return Ok(());
    }

    for (name, network) in &config.networks {
        println!(
            "{:<16} {:<48} chain {:<10} wallet {}",
            name,
            network.rpc_url,
            network
                .chain_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "?".to_string()),
            config.wallet_for(network).unwrap_or("-")
        );
    }
    Ok(())
}

pub fn wallet_set(config: &mut AppConfig, name: &str) -> Result<()> {
    println!("The key is stored in the system keychain and never written to config files.");

    let private_key = zeroize::Zeroizing::new(
        Password::new()
            .with_prompt(format!("Private key for '{}'", name))
            .interact()?,
    );

    let keychain_entry = format!("wallet_{}", name);
    store_private_key(&keychain_entry, &private_key)
        .wrap_err("Failed to store private key in keychain")?;

    config.wallets.insert(
        name.to_string(),
        WalletConfig {
            keychain: Some(keychain_entry),
            env_var: None,
            label: Some(format!("{} wallet", name)),
        },
    );
    config.save().wrap_err("Failed to save configuration")?;

    println!("✓ Wallet '{}' stored in system keychain", name);
    if let Some(path) = config.config_path() {
        println!("  Config: {}", path.display());
    }
    Ok(())
}

pub fn wallet_remove(config: &mut AppConfig, name: &str) -> Result<()> {
    let wallet = config
        .wallets
        .remove(name)
        .ok_or_else(|| eyre!("Wallet '{}' is not configured", name))?;

    if let Some(entry) = &wallet.keychain {
        crate::config::KeychainManager::new().delete(entry)?;
    }
    config.save().wrap_err("Failed to save configuration")?;

    println!("✓ Wallet '{}' removed", name);
    Ok(())
}

/// Configured chain id, or the one the endpoint reports
async fn chain_id(network: &NetworkConfig, client: &dyn ChainClient) -> Result<u64> {
    if let Some(id) = network.chain_id {
        return Ok(id);
    }

    client
        .chain_id()
        .await
        .map_err(|e| Error::query(format!("Failed to fetch chain id: {}", e)).into())
}

/// Local dev chains don't need a confirmation prompt
fn is_local(network: &NetworkConfig) -> bool {
    network.chain_id == Some(31337)
        || network.rpc_url.contains("localhost")
        || network.rpc_url.contains("127.0.0.1")
}
