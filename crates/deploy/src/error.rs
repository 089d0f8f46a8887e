//! Error taxonomy of a deployment run.

use crate::plan::ContractName;

/// Errors that abort a deployment run.
///
/// Nothing is recovered locally: every variant propagates to the caller, which
/// is expected to log it and exit with a non-zero status.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// No usable signing credential for the target network.
    #[error("no deployer identity for network `{network}`: {reason}")]
    Identity { network: String, reason: String },

    /// The target network cannot be used.
    #[error("network unavailable: {0}")]
    Network(String),

    /// The deployment plan violates the dependency ordering.
    #[error("invalid deployment plan: {0}")]
    Plan(String),

    /// A compilation artifact is missing or malformed.
    #[error("artifact for {contract} unusable: {reason}")]
    Artifact {
        contract: ContractName,
        reason: String,
    },

    /// The deployment of a contract was rejected, reverted or timed out.
    #[error("failed to deploy {contract}: {reason}")]
    Deployment {
        contract: ContractName,
        reason: String,
    },
}

impl DeployError {
    pub(crate) fn deployment(contract: ContractName, err: impl std::fmt::Display) -> Self {
        Self::Deployment {
            contract,
            reason: err.to_string(),
        }
    }

    /// The contract the error relates to, if any.
    pub fn contract(&self) -> Option<ContractName> {
        match self {
            Self::Artifact { contract, .. } | Self::Deployment { contract, .. } => Some(*contract),
            Self::Identity { .. } | Self::Network(_) | Self::Plan(_) => None,
        }
    }
}
