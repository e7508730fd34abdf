mod detector;
mod foundry;
mod hardhat;

pub use detector::detect;
pub use foundry::FoundryConfig;

use std::path::{Path, PathBuf};

use eyre::Result;
use serde::{Deserialize, Serialize};

use crate::config::CompilerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectType {
    Foundry,
    Hardhat,
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectType::Foundry => write!(f, "Foundry"),
            ProjectType::Hardhat => write!(f, "Hardhat"),
        }
    }
}

/// Layout of a contract project: where artifacts are built and where
/// deployment records are kept
#[derive(Debug, Clone)]
pub struct Project {
    pub project_type: ProjectType,
    pub root: PathBuf,
    pub name: String,
    pub artifacts_dir: PathBuf,
    pub deployments_dir: PathBuf,
    pub config: ProjectConfig,
}

#[derive(Debug, Clone)]
pub enum ProjectConfig {
    Foundry(FoundryConfig),
    Hardhat,
}

impl Project {
    pub fn new_foundry(path: &Path) -> Result<Self> {
        foundry::load_project(path)
    }

    pub fn new_hardhat(path: &Path) -> Result<Self> {
        hardhat::load_project(path)
    }

    /// Compiler settings declared by the toolchain's own config, if readable
    pub fn toolchain_compiler(&self) -> Option<CompilerConfig> {
        match &self.config {
            ProjectConfig::Foundry(config) => Some(config.compiler()),
            // hardhat.config.js is code, not data
            ProjectConfig::Hardhat => None,
        }
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}
