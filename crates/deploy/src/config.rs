//! Deployment configuration.
//!
//! Configuration is layered: built-in defaults, then a TOML file
//! ([`CONFIG_FILENAME`] by default), then `SOMNIA_`-prefixed environment
//! variables (nested keys separated by `__`, e.g. `SOMNIA_TX__CONFIRMATIONS`).
//! The signing credential is never read from the file or the `SOMNIA_`
//! variables; it is attached by the caller from the `PRIVATE_KEY` secret.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    identity::Credential,
    plan::{CustomTokenParams, DeploymentPlan, LiquidityPoolParams},
};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Deploy.toml";

/// Prefix of the environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "SOMNIA_";

/// Name of the built-in network.
pub const DEFAULT_NETWORK: &str = "somnia";

/// RPC endpoint of the built-in network.
pub const SOMNIA_RPC_URL: &str = "https://dream-rpc.somnia.network";

/// A target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    pub url: Url,
    /// Expected chain id. When set, the endpoint must report the same id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip)]
    pub private_key: Option<Credential>,
}

impl NetworkConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            chain_id: None,
            private_key: None,
        }
    }

    /// The Somnia testnet.
    pub fn somnia() -> Self {
        Self::new(Url::parse(SOMNIA_RPC_URL).expect("valid built-in RPC URL"))
    }
}

/// Transaction submission and confirmation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    /// Number of blocks (including the inclusion block) before a deployment
    /// counts as confirmed.
    pub confirmations: u64,
    /// Maximum time to wait for a deployment to be confirmed, receipt and
    /// confirmation depth included.
    pub receipt_timeout_secs: u64,
    /// Interval between receipt polls.
    pub poll_interval_ms: u64,
    /// Gas limit as a percentage of the node's estimate.
    pub gas_multiplier_percent: u64,
}

impl TxConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            receipt_timeout_secs: 120,
            poll_interval_ms: 1_000,
            gas_multiplier_percent: 120,
        }
    }
}

/// Complete configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Name of the target network, a key of `networks`.
    pub network: String,
    /// Known networks by name.
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Directory holding the compilation artifacts.
    pub artifacts_dir: PathBuf,
    /// Directory the deployment records are written to.
    pub output_dir: PathBuf,
    /// Solidity version the artifacts were compiled with. Informational.
    pub solc_version: String,
    pub tx: TxConfig,
    pub custom_token: CustomTokenParams,
    pub liquidity_pool: LiquidityPoolParams,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            networks: BTreeMap::from([(DEFAULT_NETWORK.to_string(), NetworkConfig::somnia())]),
            artifacts_dir: PathBuf::from("artifacts"),
            output_dir: PathBuf::from("deployments"),
            solc_version: "0.8.28".to_string(),
            tx: TxConfig::default(),
            custom_token: CustomTokenParams::default(),
            liquidity_pool: LiquidityPoolParams::default(),
        }
    }
}

impl DeployConfig {
    /// Layered configuration sources, lowest priority first.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the configuration from `path` (or [`CONFIG_FILENAME`]) and the
    /// environment. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILENAME));
        let config: Self = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        tracing::debug!(path = %path.display(), network = %config.network, "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deploy config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// The configuration of the target network.
    pub fn active_network(&self) -> Result<&NetworkConfig> {
        self.networks.get(&self.network).with_context(|| {
            format!(
                "Unknown network `{}` (configured: {})",
                self.network,
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }

    /// Attach a signing credential to the target network.
    pub fn set_credential(&mut self, credential: Credential) -> Result<()> {
        let name = self.network.clone();
        self.networks
            .get_mut(&name)
            .with_context(|| format!("Unknown network `{name}`"))?
            .private_key = Some(credential);
        Ok(())
    }

    /// The deployment plan parameterized by this configuration.
    pub fn plan(&self) -> Result<DeploymentPlan, crate::DeployError> {
        DeploymentPlan::standard(&self.custom_token, &self.liquidity_pool)
    }
}
