use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Address;
use fs2::FileExt;

use crate::error::{Error, Result};

const ADDRESSES_FILE: &str = "deployed_addresses.json";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Represents a deployed contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    /// Ignition future id, `<Module>#<Contract>`
    pub future_id: String,
    pub contract_name: String,
    pub address: Address,
    pub network: String,
}

pub fn future_id(module: &str, contract: &str) -> String {
    format!("{}#{}", module, contract)
}

/// Deployment records for one chain.
///
/// Stored as `<deployments>/chain-<id>/deployed_addresses.json`, the same file
/// Hardhat Ignition writes, so either tool can read the other's deployments.
/// Records are append-only: an existing entry is never replaced. Writers
/// merge with the file on disk under an exclusive lock, so several stores
/// open on the same chain never drop each other's records.
pub struct DeploymentStore {
    path: PathBuf,
    network: String,
    addresses: BTreeMap<String, Address>,
}

impl DeploymentStore {
    /// Open the store for a chain; a missing file means no deployments yet
    pub fn open(deployments_dir: &Path, chain_id: u64, network: &str) -> Result<Self> {
        let path = chain_dir(deployments_dir, chain_id).join(ADDRESSES_FILE);
        let addresses = read_addresses(&path)?;

        Ok(Self {
            path,
            network: network.to_string(),
            addresses,
        })
    }

    /// Pick up records written since the store was opened
    pub fn reload(&mut self) -> Result<()> {
        let on_disk = read_addresses(&self.path)?;
        self.addresses = merge(on_disk, &self.addresses);
        Ok(())
    }

    pub fn get(&self, future_id: &str) -> Option<DeploymentRecord> {
        self.addresses.get(future_id).map(|address| DeploymentRecord {
            future_id: future_id.to_string(),
            contract_name: contract_part(future_id).to_string(),
            address: *address,
            network: self.network.clone(),
        })
    }

    /// All records, sorted by future id
    pub fn records(&self) -> Vec<DeploymentRecord> {
        self.addresses
            .keys()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Add a record and persist the store.
    ///
    /// Re-inserting an identical record is a no-op; a different address under
    /// an existing id is refused. The in-memory view only changes once the
    /// file has been written.
    pub fn insert(&mut self, record: &DeploymentRecord) -> Result<()> {
        let _lock = self.lock()?;
        let mut addresses = merge(read_addresses(&self.path)?, &self.addresses);

        match addresses.get(&record.future_id) {
            Some(existing) if *existing == record.address => {
                self.addresses = addresses;
                return Ok(());
            }
            Some(existing) => {
                return Err(Error::deployment(format!(
                    "{} is already recorded at {} on {}",
                    record.future_id, existing, self.network
                )));
            }
            None => {}
        }

        addresses.insert(record.future_id.clone(), record.address);
        self.save(&addresses)?;
        self.addresses = addresses;

        tracing::info!(
            "Recorded {} at {} in {:?}",
            record.future_id,
            record.address,
            self.path
        );
        Ok(())
    }

    /// Exclusive lock guarding the read-merge-write of the records file;
    /// released when the returned handle is dropped
    fn lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::deployment(format!("Failed to create {:?}: {}", parent, e)))?;
        }

        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| Error::deployment(format!("Failed to open {:?}: {}", lock_path, e)))?;

        FileExt::lock_exclusive(&file)
            .map_err(|e| Error::deployment(format!("Failed to lock {:?}: {}", lock_path, e)))?;
        Ok(file)
    }

    fn save(&self, addresses: &BTreeMap<String, Address>) -> Result<()> {
        let content = serde_json::to_string_pretty(addresses)
            .map_err(|e| Error::deployment(format!("Failed to serialize records: {}", e)))?;

        // write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| Error::deployment(format!("Failed to write {:?}: {}", self.path, e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_addresses(path: &Path) -> Result<BTreeMap<String, Address>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("Failed to read {:?}: {}", path, e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config(format!("Failed to parse {:?}: {}", path, e)))
}

/// Records on disk win; entries only known in memory are kept
fn merge(
    mut on_disk: BTreeMap<String, Address>,
    in_memory: &BTreeMap<String, Address>,
) -> BTreeMap<String, Address> {
    for (id, address) in in_memory {
        on_disk.entry(id.clone()).or_insert(*address);
    }
    on_disk
}

fn chain_dir(deployments_dir: &Path, chain_id: u64) -> PathBuf {
    deployments_dir.join(format!("chain-{}", chain_id))
}

fn contract_part(future_id: &str) -> &str {
    future_id
        .split_once('#')
        .map(|(_, contract)| contract)
        .unwrap_or(future_id)
}

/// Exclusive right to submit transactions from one account on one chain.
///
/// Two concurrent runs would otherwise fetch the same pending nonce. The lock
/// is an advisory lock on `.submit-<account>.lock`, held through the open
/// file handle, so the OS releases it if the process dies.
#[derive(Debug)]
pub struct SubmissionLock {
    file: File,
    path: PathBuf,
}

impl SubmissionLock {
    /// Acquire the lock, waiting up to `wait` for another holder to release it
    pub async fn acquire(
        deployments_dir: &Path,
        chain_id: u64,
        account: Address,
        wait: Duration,
    ) -> Result<Self> {
        let dir = chain_dir(deployments_dir, chain_id);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::deployment(format!("Failed to create {:?}: {}", dir, e)))?;

        let path = dir.join(format!(".submit-{:x}.lock", account));
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::deployment(format!("Failed to open lock {:?}: {}", path, e)))?;
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    tracing::debug!("Acquired submission lock {:?}", path);
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(Error::deployment(format!(
                            "Another deployment from {} is in progress on chain {} (lock {:?})",
                            account, chain_id, path
                        )));
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(Error::deployment(format!(
                        "Failed to lock {:?}: {}",
                        path, e
                    )));
                }
            }
        }
    }
}

impl Drop for SubmissionLock {
    fn drop(&mut self) {
        // closing the handle would release it as well
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release submission lock {:?}: {}", self.path, e);
        }
    }
}
