use std::collections::HashMap;
use std::fs;
use std::path::Path;

use eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};

use super::{Project, ProjectConfig, ProjectType, dir_name};
use crate::config::{CompilerConfig, OptimizerConfig};

/// Foundry configuration parsed from foundry.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoundryConfig {
    #[serde(default)]
    pub profile: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub out: Option<String>,
    pub solc: Option<String>,
    pub solc_version: Option<String>,
    pub optimizer: Option<bool>,
    pub optimizer_runs: Option<u32>,
    pub via_ir: Option<bool>,
}

impl FoundryConfig {
    pub fn default_profile(&self) -> &ProfileConfig {
        use std::sync::LazyLock;
        static DEFAULT: LazyLock<ProfileConfig> = LazyLock::new(ProfileConfig::default);
        self.profile.get("default").unwrap_or(&DEFAULT)
    }

    pub fn out_dir(&self) -> &str {
        self.default_profile().out.as_deref().unwrap_or("out")
    }

    /// Compiler settings as declared in the default profile
    pub fn compiler(&self) -> CompilerConfig {
        let profile = self.default_profile();
        let defaults = OptimizerConfig::default();
        CompilerConfig {
            version: profile
                .solc_version
                .clone()
                .or_else(|| profile.solc.clone()),
            optimizer: OptimizerConfig {
                enabled: profile.optimizer.unwrap_or(defaults.enabled),
                runs: profile.optimizer_runs.unwrap_or(defaults.runs),
            },
            via_ir: profile.via_ir.unwrap_or(false),
        }
    }
}

/// Load a Foundry project from the given path
pub fn load_project(path: &Path) -> Result<Project> {
    let config_path = path.join("foundry.toml");

    if !config_path.exists() {
        return Err(eyre!("foundry.toml not found at {:?}", path));
    }

    let config_content = fs::read_to_string(&config_path)
        .wrap_err_with(|| format!("Failed to read {:?}", config_path))?;

    let config: FoundryConfig =
        toml::from_str(&config_content).wrap_err("Failed to parse foundry.toml")?;

    Ok(Project {
        project_type: ProjectType::Foundry,
        root: path.to_path_buf(),
        name: dir_name(path),
        artifacts_dir: path.join(config.out_dir()),
        deployments_dir: path.join("deployments"),
        config: ProjectConfig::Foundry(config),
    })
}
