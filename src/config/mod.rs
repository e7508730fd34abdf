mod keychain;
mod settings;

pub use keychain::{KeychainManager, store_private_key, validate_private_key};
pub use settings::{
    AppConfig, CompilerConfig, ContractConfig, ModuleConfig, NetworkConfig,
    OptimizerConfig, WalletConfig,
};
