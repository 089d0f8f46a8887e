//! Deployer identity resolution.

use std::fmt;

use alloy_core::primitives::{Address, B256, Signature};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use serde::Serialize;

use crate::{DeployError, config::NetworkConfig};

/// A secret signing credential (hex-encoded private key).
///
/// Never printed: `Debug` is redacted and the credential is neither read
/// from nor written to configuration files.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn expose(&self) -> &str {
        self.0.trim()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl Serialize for Credential {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

/// Signing accounts available on a network.
///
/// There is at most one: the configured credential. An absent credential
/// yields an empty list.
pub fn signing_accounts(
    network_name: &str,
    network: &NetworkConfig,
) -> Result<Vec<PrivateKeySigner>, DeployError> {
    let Some(credential) = &network.private_key else {
        return Ok(vec![]);
    };

    let signer = credential
        .expose()
        .parse::<PrivateKeySigner>()
        .map_err(|e| DeployError::Identity {
            network: network_name.to_string(),
            reason: format!("invalid private key: {e}"),
        })?;

    Ok(vec![signer])
}

/// The account authorizing every deployment transaction of a run.
#[derive(Debug, Clone)]
pub struct DeployerIdentity {
    signer: PrivateKeySigner,
}

impl DeployerIdentity {
    /// Resolve the first signing account configured for the network.
    pub fn resolve(network_name: &str, network: &NetworkConfig) -> Result<Self, DeployError> {
        signing_accounts(network_name, network)?
            .into_iter()
            .next()
            .map(|signer| Self { signer })
            .ok_or_else(|| DeployError::Identity {
                network: network_name.to_string(),
                reason: "no signing credential configured (set PRIVATE_KEY)".to_string(),
            })
    }

    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a transaction signature hash.
    pub fn sign_hash(&self, hash: &B256) -> anyhow::Result<Signature> {
        Ok(self.signer.sign_hash_sync(hash)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // First default anvil/hardhat account.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn network(key: Option<&str>) -> NetworkConfig {
        NetworkConfig {
            private_key: key.map(Credential::new),
            ..NetworkConfig::somnia()
        }
    }

    #[test]
    fn test_resolve_identity() {
        let identity = DeployerIdentity::resolve("somnia", &network(Some(TEST_KEY))).unwrap();
        assert_eq!(identity.address(), TEST_ADDRESS.parse::<Address>().unwrap());
    }

    #[test]
    fn test_resolve_identity_without_0x_prefix() {
        let key = TEST_KEY.trim_start_matches("0x");
        let identity = DeployerIdentity::resolve("somnia", &network(Some(key))).unwrap();
        assert_eq!(identity.address(), TEST_ADDRESS.parse::<Address>().unwrap());
    }

    #[test]
    fn test_missing_credential_is_identity_error() {
        assert!(signing_accounts("somnia", &network(None)).unwrap().is_empty());

        let err = DeployerIdentity::resolve("somnia", &network(None)).unwrap_err();
        assert!(matches!(err, DeployError::Identity { ref network, .. } if network == "somnia"));
    }

    #[test]
    fn test_invalid_credential_is_identity_error() {
        let err = DeployerIdentity::resolve("somnia", &network(Some("0x1234"))).unwrap_err();
        assert!(matches!(err, DeployError::Identity { .. }));
    }

    #[test]
    fn test_credential_is_redacted() {
        let credential = Credential::new(TEST_KEY);
        assert!(!format!("{credential:?}").contains("ac0974"));
        assert_eq!(
            serde_json::to_string(&credential).unwrap(),
            "\"<redacted>\""
        );
    }
}
