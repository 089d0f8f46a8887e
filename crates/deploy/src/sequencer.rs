//! The deployment sequencer.
//!
//! Deploys the descriptors of a [`DeploymentPlan`] one after the other. A step
//! starts only once the previous one is confirmed, so every `AddressOf`
//! argument can be substituted with a confirmed address. The first failure
//! aborts the run; contracts confirmed before it stay on-chain.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, TxHash};
use chrono::Utc;

use crate::{
    DeployError,
    artifact::ArtifactStore,
    chain::ChainClient,
    config::NetworkConfig,
    identity::DeployerIdentity,
    plan::{ContractName, DeploymentPlan, Descriptor},
    report::{DeployedContract, DeploymentReport},
};

/// Lifecycle of a single deployment.
///
/// `NotStarted -> Submitted -> Confirmed | Failed`. A step whose transaction
/// could not even be built moves straight from `NotStarted` to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeploymentState {
    #[default]
    NotStarted,
    Submitted {
        tx_hash: TxHash,
    },
    Confirmed(DeployedContract),
    Failed {
        reason: String,
    },
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed(_) | Self::Failed { .. })
    }

    fn submit(&mut self, tx_hash: TxHash) {
        debug_assert!(matches!(self, Self::NotStarted));
        *self = Self::Submitted { tx_hash };
    }

    fn confirm(&mut self, handle: DeployedContract) {
        debug_assert!(matches!(self, Self::Submitted { .. }));
        *self = Self::Confirmed(handle);
    }

    fn fail(&mut self, reason: String) {
        debug_assert!(!self.is_terminal());
        *self = Self::Failed { reason };
    }
}

/// Executes a deployment plan against a network.
pub struct Sequencer<C> {
    client: C,
    plan: DeploymentPlan,
    artifacts: ArtifactStore,
    states: Vec<(ContractName, DeploymentState)>,
}

impl<C: ChainClient> Sequencer<C> {
    pub fn new(client: C, plan: DeploymentPlan, artifacts: ArtifactStore) -> Self {
        let states = plan
            .iter()
            .map(|d| (d.name, DeploymentState::NotStarted))
            .collect();
        Self {
            client,
            plan,
            artifacts,
            states,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Per-contract lifecycle state, in plan order.
    pub fn states(&self) -> &[(ContractName, DeploymentState)] {
        &self.states
    }

    /// Resolve the deployer identity of `network` and deploy the plan.
    ///
    /// Fails with [`DeployError::Identity`] before anything is submitted when
    /// the network has no signing credential.
    pub async fn run(
        &mut self,
        network_name: &str,
        network: &NetworkConfig,
    ) -> Result<DeploymentReport, DeployError> {
        let identity = DeployerIdentity::resolve(network_name, network)?;
        self.deploy(network_name, network.chain_id, &identity).await
    }

    /// Deploy every descriptor of the plan in order with `identity`.
    pub async fn deploy(
        &mut self,
        network_name: &str,
        expected_chain_id: Option<u64>,
        identity: &DeployerIdentity,
    ) -> Result<DeploymentReport, DeployError> {
        let started_at = Utc::now();

        self.plan.validate()?;
        for descriptor in self.plan.iter() {
            self.artifacts.get(descriptor.name)?;
        }

        let chain_id = self
            .client
            .chain_id()
            .await
            .map_err(|e| DeployError::Network(format!("{e:#}")))?;
        if let Some(expected) = expected_chain_id.filter(|id| *id != chain_id) {
            return Err(DeployError::Network(format!(
                "`{network_name}` expects chain id {expected}, endpoint reports {chain_id}"
            )));
        }

        tracing::info!(
            deployer = %identity.address(),
            network = network_name,
            chain_id,
            "Deploying contracts with account: {}",
            identity.address()
        );

        let mut confirmed = BTreeMap::new();
        let mut contracts = Vec::with_capacity(self.plan.len());

        for index in 0..self.plan.len() {
            let descriptor = self.plan[index].clone();
            let handle = match self.deploy_one(index, &descriptor, identity, &confirmed).await {
                Ok(handle) => handle,
                Err(err) => {
                    self.states[index].1.fail(err.to_string());
                    tracing::error!(
                        contract = %descriptor.name,
                        remaining = self.plan.len() - index - 1,
                        "Deployment failed, aborting"
                    );
                    return Err(err);
                }
            };

            tracing::info!(
                contract = %handle.name,
                address = %handle.address,
                block = handle.block_number,
                "{} deployed to: {}",
                handle.name,
                handle.address
            );

            confirmed.insert(handle.name, handle.address);
            self.states[index].1.confirm(handle.clone());
            contracts.push(handle);
        }

        Ok(DeploymentReport {
            network: network_name.to_string(),
            chain_id,
            deployer: identity.address(),
            started_at,
            finished_at: Utc::now(),
            contracts,
        })
    }

    async fn deploy_one(
        &mut self,
        index: usize,
        descriptor: &Descriptor,
        identity: &DeployerIdentity,
        confirmed: &BTreeMap<ContractName, Address>,
    ) -> Result<DeployedContract, DeployError> {
        let name = descriptor.name;

        let args = descriptor.resolve_args(identity.address(), confirmed)?;
        let init_code = self.artifacts.get(name)?.init_code(&args)?;

        tracing::debug!(contract = %name, %descriptor, bytes = init_code.len(), "Submitting deployment");

        let pending = self
            .client
            .submit_deployment(identity, init_code)
            .await
            .map_err(|e| DeployError::deployment(name, format!("{e:#}")))?;
        self.states[index].1.submit(pending.tx_hash);

        tracing::info!(contract = %name, tx_hash = %pending.tx_hash, "Awaiting confirmation");

        let confirmation = self
            .client
            .await_confirmation(&pending)
            .await
            .map_err(|e| DeployError::deployment(name, format!("{e:#}")))?;

        if confirmation.address.is_zero() {
            return Err(DeployError::deployment(
                name,
                "network reported the zero address",
            ));
        }

        Ok(DeployedContract {
            name,
            address: confirmation.address,
            tx_hash: pending.tx_hash,
            block_number: confirmation.block_number,
            gas_used: confirmation.gas_used,
        })
    }
}
