mod abi;
mod address;
mod artifact;
mod caller;
mod deployer;
mod deployment;
mod reader;
#[cfg(test)]
mod testing;

pub use abi::format_value;
pub use address::parse_contract_address;
pub use artifact::{ArtifactStore, compiler_mismatches};
pub use caller::{ChainClient, RetryPolicy, RpcCaller};
pub use deployer::{DeployOptions, Deployer, ModuleStep};
pub use deployment::DeploymentStore;
pub use reader::{Query, QueryResult, StateReader};
