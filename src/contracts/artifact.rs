use std::fs;
use std::path::{Path, PathBuf};

use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use serde_json::Value;

use super::abi::parse_abi;
use crate::config::{CompilerConfig, OptimizerConfig};
use crate::error::{Error, Result};

/// Compiled contract: creation bytecode plus ABI
#[derive(Debug, Clone)]
pub struct Artifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    pub path: PathBuf,
    /// Settings embedded by the compiler, when the artifact carries metadata
    pub compiler: Option<CompilerConfig>,
}

/// Finds artifacts by contract name below a build output directory.
///
/// Handles both layouts: Hardhat (`artifacts/contracts/<File>.sol/<Name>.json`,
/// bytecode as a hex string) and Foundry (`out/<File>.sol/<Name>.json`,
/// bytecode under `bytecode.object`).
pub struct ArtifactStore {
    artifacts_dir: PathBuf,
    expected_compiler: Option<CompilerConfig>,
}

impl ArtifactStore {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            expected_compiler: None,
        }
    }

    /// Warn when a loaded artifact was built with other compiler settings
    pub fn expecting(mut self, compiler: CompilerConfig) -> Self {
        self.expected_compiler = Some(compiler);
        self
    }

    /// Load the artifact for a contract
    pub fn load(&self, contract_name: &str) -> Result<Artifact> {
        let path = self.find(contract_name)?;
        let artifact = load_artifact(&path, contract_name)?;

        if let (Some(expected), Some(actual)) = (&self.expected_compiler, &artifact.compiler) {
            for mismatch in compiler_mismatches(expected, actual) {
                tracing::warn!("{} was built with {}", contract_name, mismatch);
            }
        }

        Ok(artifact)
    }

    fn find(&self, contract_name: &str) -> Result<PathBuf> {
        if !self.artifacts_dir.exists() {
            return Err(Error::deployment(format!(
                "Artifacts directory {:?} does not exist; compile the project first",
                self.artifacts_dir
            )));
        }

        let file_name = format!("{}.json", contract_name);
        let mut matches = Vec::new();
        collect_matches(&self.artifacts_dir, &file_name, &mut matches)?;

        match matches.len() {
            0 => Err(Error::deployment(format!(
                "No artifact found for contract '{}' in {:?}",
                contract_name, self.artifacts_dir
            ))),
            1 => Ok(matches.remove(0)),
            _ => {
                matches.sort();
                Err(Error::deployment(format!(
                    "Contract name '{}' is ambiguous: {:?}",
                    contract_name, matches
                )))
            }
        }
    }
}

fn collect_matches(dir: &Path, file_name: &str, matches: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::deployment(format!("Failed to read {:?}: {}", dir, e)))?;

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            // build-info holds solc input/output, not per-contract artifacts
            if path.file_name().is_some_and(|n| n == "build-info") {
                continue;
            }
            collect_matches(&path, file_name, matches)?;
        } else if path.file_name().is_some_and(|n| n == file_name) {
            matches.push(path);
        }
    }

    Ok(())
}

/// Parse a single artifact file
pub fn load_artifact(path: &Path, contract_name: &str) -> Result<Artifact> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::deployment(format!("Failed to read {:?}: {}", path, e)))?;

    let json: Value = serde_json::from_str(&content)
        .map_err(|e| Error::deployment(format!("Failed to parse {:?}: {}", path, e)))?;

    let abi = parse_abi(&json).map_err(|e| Error::deployment(format!("{:?}: {}", path, e)))?;

    let bytecode = parse_bytecode(&json)
        .map_err(|e| Error::deployment(format!("{} ({:?})", e, path)))?;

    let compiler = json.get("metadata").and_then(compiler_from_metadata);

    tracing::debug!(
        "Loaded artifact {} from {:?} ({} bytes of bytecode)",
        contract_name,
        path,
        bytecode.len()
    );

    Ok(Artifact {
        contract_name: contract_name.to_string(),
        abi,
        bytecode,
        path: path.to_path_buf(),
        compiler,
    })
}

fn parse_bytecode(json: &Value) -> std::result::Result<Bytes, String> {
    let raw = match json.get("bytecode") {
        Some(Value::String(s)) => s.as_str(),
        Some(obj @ Value::Object(_)) => obj
            .get("object")
            .and_then(|o| o.as_str())
            .ok_or("Artifact bytecode object has no 'object' field")?,
        Some(_) => return Err("Artifact bytecode has an unexpected shape".to_string()),
        None => return Err("Artifact has no bytecode".to_string()),
    };

    let hex_str = raw.strip_prefix("0x").unwrap_or(raw);

    // solc leaves __$<hash>$__ markers where library addresses must be linked
    if hex_str.contains("__") {
        return Err("Bytecode contains unlinked library references".to_string());
    }

    hex::decode(hex_str)
        .map(Bytes::from)
        .map_err(|e| format!("Invalid bytecode hex: {}", e))
}

/// Foundry embeds solc metadata either as an object or as its raw JSON string
fn compiler_from_metadata(metadata: &Value) -> Option<CompilerConfig> {
    let parsed;
    let metadata = match metadata {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).ok()?;
            &parsed
        }
        other => other,
    };

    let version = metadata
        .pointer("/compiler/version")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let settings = metadata.get("settings")?;
    let defaults = OptimizerConfig::default();

    Some(CompilerConfig {
        version,
        optimizer: OptimizerConfig {
            enabled: settings
                .pointer("/optimizer/enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.enabled),
            runs: settings
                .pointer("/optimizer/runs")
                .and_then(|v| v.as_u64())
                .map(|r| r as u32)
                .unwrap_or(defaults.runs),
        },
        via_ir: settings
            .get("viaIR")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    })
}

/// Differences between configured compiler settings and the ones an artifact
/// was built with. Versions match on prefix, since solc appends `+commit.<hash>`.
pub fn compiler_mismatches(expected: &CompilerConfig, actual: &CompilerConfig) -> Vec<String> {
    let mut mismatches = Vec::new();

    if let (Some(want), Some(have)) = (&expected.version, &actual.version) {
        if !have.starts_with(want.as_str()) {
            mismatches.push(format!("compiler version {} (expected {})", have, want));
        }
    }

    if expected.optimizer.enabled != actual.optimizer.enabled {
        mismatches.push(format!(
            "optimizer enabled={} (expected {})",
            actual.optimizer.enabled, expected.optimizer.enabled
        ));
    } else if expected.optimizer.enabled && expected.optimizer.runs != actual.optimizer.runs {
        mismatches.push(format!(
            "optimizer runs={} (expected {})",
            actual.optimizer.runs, expected.optimizer.runs
        ));
    }

    if expected.via_ir != actual.via_ir {
        mismatches.push(format!(
            "viaIR={} (expected {})",
            actual.via_ir, expected.via_ir
        ));
    }

    mismatches
}
