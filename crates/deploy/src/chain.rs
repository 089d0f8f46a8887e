//! Access to the target network.
//!
//! The sequencer talks to the network only through [`ChainClient`], which
//! splits a deployment into submission and confirmation. [`RpcChainClient`] is
//! the JSON-RPC implementation used against real networks.

use std::{future::Future, time::Duration};

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxHash, TxKind, U64, U256};
use alloy_eips::eip2718::Encodable2718;
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::json;
use tokio::{sync::OnceCell, time::Instant};

use crate::{config::TxConfig, identity::DeployerIdentity, rpc};

/// A creation transaction accepted by the network but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    pub tx_hash: TxHash,
    pub nonce: u64,
    /// The address derived from the deployer and nonce.
    pub expected_address: Address,
}

/// A finalized creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub address: Address,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Network operations needed to deploy contracts.
pub trait ChainClient: Send + Sync {
    /// The chain id reported by the network.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Sign and submit a contract creation transaction carrying `init_code`.
    fn submit_deployment(
        &self,
        identity: &DeployerIdentity,
        init_code: Bytes,
    ) -> impl Future<Output = Result<PendingDeployment>> + Send;

    /// Wait until the creation transaction is finalized.
    ///
    /// Fails if the transaction reverted, produced no contract, or was not
    /// confirmed in time.
    fn await_confirmation(
        &self,
        pending: &PendingDeployment,
    ) -> impl Future<Output = Result<Confirmation>> + Send;
}

/// Subset of a transaction receipt.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    contract_address: Option<Address>,
    block_number: Option<U64>,
    gas_used: U64,
}

/// [`ChainClient`] speaking Ethereum JSON-RPC over HTTP.
///
/// Transactions are EIP-155 legacy creation transactions signed locally with
/// the deployer identity.
pub struct RpcChainClient {
    http: reqwest::Client,
    url: String,
    tx: TxConfig,
    chain_id: OnceCell<u64>,
}

impl RpcChainClient {
    pub fn new(url: &url::Url, tx: TxConfig) -> Result<Self> {
        Ok(Self {
            http: rpc::create_client(rpc::DEFAULT_TIMEOUT)?,
            url: url.to_string(),
            tx,
            chain_id: OnceCell::new(),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.http, &self.url, method, params).await
    }

    /// Constant-interval polling that gives up once `deadline` has passed.
    fn polling(&self, deadline: Instant) -> ConstantBuilder {
        let interval = self.tx.poll_interval().max(Duration::from_millis(1));
        let remaining = deadline.saturating_duration_since(Instant::now());
        let attempts = remaining.as_millis() / interval.as_millis();
        ConstantBuilder::default()
            .with_delay(interval)
            .with_max_times(usize::try_from(attempts).unwrap_or(usize::MAX))
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Receipt> {
        let receipt: Option<Receipt> = self
            .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;
        receipt.with_context(|| format!("Transaction {tx_hash} is still pending"))
    }

    async fn block_number(&self) -> Result<u64> {
        let number: U64 = self.call("eth_blockNumber", vec![]).await?;
        Ok(number.to())
    }

    /// Wait until `block` is buried under the configured number of confirmations.
    async fn wait_for_depth(&self, block: u64, deadline: Instant) -> Result<()> {
        let required = self.tx.confirmations;
        if required <= 1 {
            return Ok(());
        }

        (|| async move {
            let latest = self.block_number().await?;
            let depth = (latest + 1).saturating_sub(block);
            if depth >= required {
                Ok(())
            } else {
                anyhow::bail!("Block {block} has {depth}/{required} confirmations")
            }
        })
        .retry(self.polling(deadline))
        .notify(|err, after| tracing::trace!(error = %err, ?after, "Waiting for confirmations"))
        .await
    }
}

impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let id: U64 = self
                    .call("eth_chainId", vec![])
                    .await
                    .context("Failed to fetch chain id")?;
                Ok::<_, anyhow::Error>(id.to())
            })
            .await
            .copied()
    }

    async fn submit_deployment(
        &self,
        identity: &DeployerIdentity,
        init_code: Bytes,
    ) -> Result<PendingDeployment> {
        let from = identity.address();
        let chain_id = self.chain_id().await?;

        let nonce: U64 = self
            .call("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await
            .context("Failed to fetch deployer nonce")?;
        let nonce: u64 = nonce.to();

        let gas_price: U256 = self
            .call("eth_gasPrice", vec![])
            .await
            .context("Failed to fetch gas price")?;

        let estimate: U64 = self
            .call(
                "eth_estimateGas",
                vec![json!({ "from": from, "data": &init_code })],
            )
            .await
            .context("Gas estimation failed (the constructor would revert)")?;
        let gas_limit = estimate
            .to::<u64>()
            .saturating_mul(self.tx.gas_multiplier_percent)
            / 100;

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: gas_price
                .try_into()
                .context("Gas price does not fit in 128 bits")?,
            gas_limit,
            to: TxKind::Create,
            value: U256::ZERO,
            input: init_code,
        };

        let signature = identity
            .sign_hash(&tx.signature_hash())
            .context("Failed to sign deployment transaction")?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let local_hash = *envelope.tx_hash();
        let raw = Bytes::from(envelope.encoded_2718());

        let tx_hash: B256 = self
            .call("eth_sendRawTransaction", vec![json!(raw)])
            .await
            .context("Network rejected the deployment transaction")?;

        if tx_hash != local_hash {
            tracing::warn!(%tx_hash, %local_hash, "Node returned an unexpected transaction hash");
        }

        tracing::debug!(%tx_hash, nonce, gas_limit, "Deployment transaction submitted");

        Ok(PendingDeployment {
            tx_hash,
            nonce,
            expected_address: from.create(nonce),
        })
    }

    async fn await_confirmation(&self, pending: &PendingDeployment) -> Result<Confirmation> {
        let tx_hash = pending.tx_hash;
        let deadline = Instant::now() + self.tx.receipt_timeout();

        let receipt = (|| async move { self.receipt(tx_hash).await })
            .retry(self.polling(deadline))
            .notify(|err, after| tracing::trace!(error = %err, ?after, "Receipt not available"))
            .await
            .with_context(|| {
                format!(
                    "Timed out after {}s waiting for transaction {tx_hash}",
                    self.tx.receipt_timeout_secs
                )
            })?;

        if receipt.status.is_some_and(|status| status.is_zero()) {
            anyhow::bail!("Transaction {tx_hash} reverted");
        }

        let address = receipt
            .contract_address
            .with_context(|| format!("Receipt of {tx_hash} carries no contract address"))?;
        if address != pending.expected_address {
            tracing::warn!(
                %address,
                expected = %pending.expected_address,
                "Contract deployed at an unexpected address"
            );
        }

        let block_number = receipt
            .block_number
            .with_context(|| format!("Receipt of {tx_hash} carries no block number"))?
            .to::<u64>();
        self.wait_for_depth(block_number, deadline)
            .await
            .with_context(|| {
                format!(
                    "Timed out after {}s waiting for {} confirmations of {tx_hash}",
                    self.tx.receipt_timeout_secs, self.tx.confirmations
                )
            })?;

        let code: Bytes = self
            .call("eth_getCode", vec![json!(address), json!("latest")])
            .await
            .context("Failed to fetch deployed code")?;
        if code.is_empty() {
            anyhow::bail!("No code at {address} after deployment");
        }

        Ok(Confirmation {
            address,
            block_number,
            gas_used: receipt.gas_used.to(),
        })
    }
}
