//! somnia-deploy - Deployment library for the Somnia token suite.
//!
//! This crate deploys the TokenFactory, CustomToken, LiquidityPool and
//! BurnChallenge contracts to a single network, in an order that respects the
//! addresses each constructor consumes.
//!
//! # Example
//!
//! ```no_run
//! use somnia_deploy::{ArtifactStore, DeployConfig, RpcChainClient, Sequencer};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DeployConfig::load(None)?;
//! let network = config.active_network()?;
//! let plan = config.plan()?;
//! let artifacts = ArtifactStore::load(&config.artifacts_dir, plan.names())?;
//! let client = RpcChainClient::new(&network.url, config.tx.clone())?;
//!
//! let report = Sequencer::new(client, plan, artifacts)
//!     .run(&config.network, network)
//!     .await?;
//! println!("{}", report.table());
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod chain;
pub mod config;
mod error;
pub mod identity;
pub mod plan;
pub mod report;
pub mod rpc;
pub mod sequencer;

pub use artifact::{Artifact, ArtifactStore};
pub use chain::{ChainClient, Confirmation, PendingDeployment, RpcChainClient};
pub use config::{CONFIG_FILENAME, DeployConfig, NetworkConfig, TxConfig};
pub use error::DeployError;
pub use identity::{Credential, DeployerIdentity};
pub use plan::{
    ArgValue, ConstructorArg, ContractName, CustomTokenParams, DeploymentPlan, Descriptor,
    LiquidityPoolParams,
};
pub use report::{DeployedContract, DeploymentReport};
pub use sequencer::{DeploymentState, Sequencer};
