use eyre::{Result, WrapErr};
use keyring::Entry;
use zeroize::Zeroizing;

use crate::error::Error;

const SERVICE_NAME: &str = "declan";

/// Deployer keys live in the OS keychain, never in config files
pub struct KeychainManager {
    service: String,
}

impl KeychainManager {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry = Entry::new(&self.service, key)
            .wrap_err_with(|| format!("Failed to create keychain entry for {}", key))?;

        entry
            .set_password(value)
            .wrap_err_with(|| format!("Failed to store secret for {}", key))?;

        tracing::info!("Stored secret in keychain: {}", key);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let entry = Entry::new(&self.service, key)
            .wrap_err_with(|| format!("Failed to access keychain entry for {}", key))?;

        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).wrap_err_with(|| format!("Failed to retrieve secret for {}", key)),
        }
    }

    /// Retrieve a secret wrapped so it is wiped from memory on drop
    pub fn get_zeroizing(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        self.get(key).map(|opt| opt.map(Zeroizing::new))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let entry = Entry::new(&self.service, key)
            .wrap_err_with(|| format!("Failed to access keychain entry for {}", key))?;

        match entry.delete_credential() {
            Ok(()) => {
                tracing::info!("Deleted secret from keychain: {}", key);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).wrap_err_with(|| format!("Failed to delete secret for {}", key)),
        }
    }
}

impl Default for KeychainManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that a private key is 32 bytes of hex, with or without 0x prefix.
/// Returns the key without prefix.
pub fn validate_private_key(key: &str) -> crate::error::Result<&str> {
    let trimmed = key.trim();
    let clean_key = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if clean_key.len() != 64 || !clean_key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::config(
            "Invalid private key format: expected 64 hex characters",
        ));
    }
    Ok(clean_key)
}

/// Store a private key securely under the given keychain entry
pub fn store_private_key(entry: &str, key: &str) -> Result<()> {
    let clean_key = validate_private_key(key)?;
    KeychainManager::new().set(entry, clean_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_private_key() {
        let key = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        assert_eq!(validate_private_key(key).unwrap(), key);
        assert_eq!(validate_private_key(&format!("0x{}", key)).unwrap(), key);

        assert!(validate_private_key("").unwrap_err().is_configuration());
        assert!(validate_private_key("0x1234").unwrap_err().is_configuration());
        assert!(
            validate_private_key(&key.replace('a', "z"))
                .unwrap_err()
                .is_configuration()
        );
    }

    // Requires keychain access and may prompt for permissions
    #[test]
    #[ignore]
    fn test_keychain_roundtrip() {
        let km = KeychainManager::new();
        let key = "test_declan_key";
        let value = "test_secret_value";

        km.set(key, value).unwrap();
        assert_eq!(km.get(key).unwrap(), Some(value.to_string()));

        km.delete(key).unwrap();
        assert_eq!(km.get(key).unwrap(), None);
    }
}
