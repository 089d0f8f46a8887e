use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, PartialEq, Eq, Subcommand, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Command {
    /// Deploy the token suite to the target network.
    Deploy,
    /// Print the deployment plan without touching the network.
    Plan,
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Parser)]
#[command(name = "somnia-deployer")]
#[command(
    author,
    version,
    about = "Deploy the TokenFactory, CustomToken, LiquidityPool and BurnChallenge contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SOMNIA_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file. Defaults to `Deploy.toml`.
    #[arg(short, long, alias = "conf", env = "SOMNIA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the target network, as declared in the configuration.
    #[arg(short, long, env = "SOMNIA_NETWORK")]
    pub network: Option<String>,

    /// Directory holding the compilation artifacts.
    #[arg(long, env = "SOMNIA_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// Directory the deployment records are written to.
    #[arg(short, long, alias = "out", env = "SOMNIA_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Hex-encoded private key of the deployer.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true, hide = true)]
    pub private_key: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The command to run, `deploy` when none is given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Deploy)
    }
}
