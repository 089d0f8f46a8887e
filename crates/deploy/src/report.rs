//! Deployed contract handles and the record of a deployment run.

use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, TxHash};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Table, presets::UTF8_FULL};
use serde::{Deserialize, Serialize};

use crate::plan::ContractName;

/// Name of the record that always points to the most recent run.
pub const LATEST_FILENAME: &str = "latest.json";

/// A confirmed deployment. Never mutated after confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub name: ContractName,
    pub address: Address,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Outcome of a successful run, contracts in deployment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub network: String,
    pub chain_id: u64,
    pub deployer: Address,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub contracts: Vec<DeployedContract>,
}

impl DeploymentReport {
    /// Address of a deployed contract.
    pub fn address_of(&self, name: ContractName) -> Option<Address> {
        self.contracts
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.address)
    }

    /// Write the record to `<dir>/<network>/<timestamp>.json` and refresh
    /// `<dir>/<network>/latest.json`. Returns the timestamped path.
    ///
    /// Runs are not idempotent, so earlier records are kept: a record started
    /// in the same millisecond as an existing one gets a `-<n>` suffix.
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let network_dir = dir.join(&self.network);
        std::fs::create_dir_all(&network_dir).with_context(|| {
            format!(
                "Failed to create deployments directory {}",
                network_dir.display()
            )
        })?;

        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment report")?;

        let stem = self.started_at.format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let path = (0..)
            .map(|n| match n {
                0 => network_dir.join(format!("{stem}.json")),
                n => network_dir.join(format!("{stem}-{n}.json")),
            })
            .find(|path| !path.exists())
            .context("No free deployment record name")?;
        for target in [&path, &network_dir.join(LATEST_FILENAME)] {
            std::fs::write(target, &json)
                .with_context(|| format!("Failed to write deployment record {}", target.display()))?;
        }

        tracing::info!(path = %path.display(), "Deployment record saved");
        Ok(path)
    }

    /// Load a record written by [`DeploymentReport::save_to_dir`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))
    }

    /// Summary table of the deployed addresses.
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Contract", "Address", "Transaction", "Block"]);

        for contract in &self.contracts {
            table.add_row(vec![
                contract.name.to_string(),
                contract.address.to_string(),
                contract.tx_hash.to_string(),
                contract.block_number.to_string(),
            ]);
        }

        table
    }
}
