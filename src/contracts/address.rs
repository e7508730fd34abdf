use alloy::primitives::Address;

use crate::error::{Error, Result};

/// Parse a user supplied contract address.
///
/// Template scripts often ship with placeholders such as
/// `0xYourDeployedContractAddress`; those, the zero address, and anything that
/// is not 20 bytes of hex are rejected so no call is ever made against them.
pub fn parse_contract_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::config("Contract address is empty"));
    }

    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::config(format!(
            "'{}' looks like a placeholder, not a contract address",
            trimmed
        )));
    }

    let address: Address = trimmed
        .parse()
        .map_err(|e| Error::config(format!("Invalid contract address '{}': {}", trimmed, e)))?;

    if address.is_zero() {
        return Err(Error::config("The zero address cannot host a contract"));
    }

    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_real_address() {
        let addr = parse_contract_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap();
        assert_eq!(
            addr.to_checksum(None),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );

        // lowercase and unprefixed forms are fine
        assert_eq!(
            parse_contract_address("5fbdb2315678afecb367f032d93f642f64180aa3").unwrap(),
            addr
        );
    }

    #[test]
    fn test_rejects_placeholders() {
        for input in [
            "",
            "   ",
            "0xYourDeployedContractAddress",
            "0xFreelancerAddress",
            "0x0000000000000000000000000000000000000000",
            "0x1234",
        ] {
            let err = parse_contract_address(input).unwrap_err();
            assert!(err.is_configuration(), "{:?} should be rejected", input);
        }
    }
}
