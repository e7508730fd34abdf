use std::path::Path;

use eyre::{Result, eyre};

use super::{Project, ProjectConfig, ProjectType, dir_name};

/// Load a Hardhat project from the given path.
///
/// Hardhat keeps artifacts under `artifacts/` and Ignition writes deployment
/// records under `ignition/deployments/`, so records written here are
/// interchangeable with `npx hardhat ignition deploy`.
pub fn load_project(path: &Path) -> Result<Project> {
    let config_js = path.join("hardhat.config.js");
    let config_ts = path.join("hardhat.config.ts");

    if !config_js.exists() && !config_ts.exists() {
        return Err(eyre!(
            "hardhat.config.js or hardhat.config.ts not found at {:?}",
            path
        ));
    }

    Ok(Project {
        project_type: ProjectType::Hardhat,
        root: path.to_path_buf(),
        name: dir_name(path),
        artifacts_dir: path.join("artifacts"),
        deployments_dir: path.join("ignition").join("deployments"),
        config: ProjectConfig::Hardhat,
    })
}
