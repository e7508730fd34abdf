use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::KeychainManager;
use crate::error::Error;

const CONFIG_DIR: &str = "declan";
const CONFIG_FILE: &str = "config.toml";
pub const PROJECT_CONFIG_FILE: &str = "declan.toml";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,

    #[serde(default)]
    pub wallets: BTreeMap<String, WalletConfig>,

    #[serde(default)]
    pub deploy: DeploySettings,

    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,

    #[serde(default)]
    pub queries: Vec<QueryConfig>,

    #[serde(default)]
    pub defaults: Option<Defaults>,

    #[serde(skip)]
    config_path: Option<PathBuf>,
}

/// Solidity compiler settings shared by the compile step and artifact checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub version: Option<String>,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub via_ir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_runs")]
    pub runs: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    /// Fixed legacy gas price in wei
    pub gas_price: Option<u64>,
    /// Wallet used for deployments on this network
    pub wallet: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Keychain entry holding the private key (e.g., "wallet_deployer")
    pub keychain: Option<String>,
    /// Environment variable containing private key
    pub env_var: Option<String>,
    /// Optional label for display
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

/// An ordered set of contracts deployed together
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractConfig {
    pub name: String,
    /// Constructor arguments; `@Name` refers to another contract of the module
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub call: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    pub network: Option<String>,
    pub wallet: Option<String>,
}

fn default_runs() -> u32 {
    200
}

fn default_confirmations() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retries() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            version: None,
            optimizer: OptimizerConfig::default(),
            via_ir: false,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            runs: default_runs(),
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            confirmations: default_confirmations(),
            confirmation_timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl DeploySettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration for a project.
    ///
    /// Order: explicit path, `declan.toml` in the project root, then the
    /// user-level config file. A missing user config yields an empty config.
    pub fn load(project_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let project_config = project_root.join(PROJECT_CONFIG_FILE);
        if project_config.exists() {
            tracing::info!("Using project config {:?}", project_config);
            return Self::load_from(&project_config);
        }

        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self {
                config_path: Some(config_path),
                ..Default::default()
            })
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: AppConfig = toml::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse config file: {:?}", path))?;

        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration back to the file it was loaded from
    pub fn save(&self) -> Result<()> {
        let path = self
            .config_path
            .clone()
            .or_else(|| Self::default_config_path().ok())
            .ok_or_else(|| eyre::eyre!("No config path available"))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).wrap_err("Failed to serialize config")?;

        fs::write(&path, content)
            .wrap_err_with(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_path
            .clone()
            .or_else(|| Self::default_config_path().ok())
    }

    fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre::eyre!("Could not determine config directory"))?;

        Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get a network by name, falling back to the default network
    pub fn network(&self, name: Option<&str>) -> crate::error::Result<(&String, &NetworkConfig)> {
        let name = name
            .or_else(|| self.defaults.as_ref().and_then(|d| d.network.as_deref()))
            .ok_or_else(|| Error::config("No network given and no default network configured"))?;

        let (name, network) = self
            .networks
            .get_key_value(name)
            .ok_or_else(|| Error::config(format!("Network '{}' is not configured", name)))?;

        if network.rpc_url.trim().is_empty() {
            return Err(Error::config(format!(
                "Network '{}' has no RPC endpoint",
                name
            )));
        }

        Ok((name, network))
    }

    /// Name of the wallet used on a network
    pub fn wallet_for<'a>(&'a self, network: &'a NetworkConfig) -> Option<&'a str> {
        network
            .wallet
            .as_deref()
            .or_else(|| self.defaults.as_ref().and_then(|d| d.wallet.as_deref()))
    }

    /// Resolve a wallet private key.
    ///
    /// Returns `Ok(None)` when the wallet is configured but its source holds no
    /// value, so the caller decides how a missing credential is reported.
    pub fn resolve_wallet_key(&self, name: &str) -> Result<Option<Zeroizing<String>>> {
        let wallet = match self.wallets.get(name) {
            Some(w) => w,
            None => return Ok(None),
        };

        if let Some(keychain_ref) = &wallet.keychain {
            let km = KeychainManager::new();
            km.get_zeroizing(keychain_ref)
        } else if let Some(env_var) = &wallet.env_var {
            Ok(std::env::var(env_var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Zeroizing::new))
        } else {
            Ok(None)
        }
    }
}
