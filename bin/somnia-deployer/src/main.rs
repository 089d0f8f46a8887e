//! somnia-deployer deploys the Somnia token suite from compiled artifacts.

mod cli;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use somnia_deploy::{
    ArtifactStore, CONFIG_FILENAME, Credential, DeployConfig, DeployerIdentity,
    DeploymentPlan, DeploymentReport, RpcChainClient, Sequencer,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing `.env` file is fine, the environment may already be set.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));

    if let Command::Init { force } = cli.command() {
        return init(&config_path, force);
    }

    let config = load_config(&cli, &config_path)?;

    match cli.command() {
        Command::Plan => print_plan(&config),
        _ => deploy(&config).await,
    }
}

/// Load the configuration and apply the command line overrides.
fn load_config(cli: &Cli, path: &Path) -> Result<DeployConfig> {
    let mut config = DeployConfig::load(Some(path))?;

    if let Some(network) = &cli.network {
        config.network = network.clone();
    }
    if let Some(artifacts) = &cli.artifacts {
        config.artifacts_dir = artifacts.clone();
    }
    if let Some(output) = &cli.output {
        config.output_dir = output.clone();
    }
    if let Some(key) = &cli.private_key {
        config.set_credential(Credential::new(key.as_str()))?;
    }

    Ok(config)
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite it)",
            path.display()
        );
    }
    DeployConfig::default().save_to_file(path)
}

fn print_plan(config: &DeployConfig) -> Result<()> {
    let plan = config.plan()?;

    println!("Deployment plan for `{}`:", config.network);
    for (index, descriptor) in plan.iter().enumerate() {
        let dependencies: Vec<String> = descriptor
            .dependencies()
            .map(|name| name.to_string())
            .collect();
        if dependencies.is_empty() {
            println!("  {}. {descriptor}", index + 1);
        } else {
            println!(
                "  {}. {descriptor} (after {})",
                index + 1,
                dependencies.join(", ")
            );
        }
    }

    Ok(())
}

/// Everything a deployment needs before the first network call.
///
/// The identity is resolved first so a missing credential is reported before
/// any artifact is looked at.
fn prepare(config: &DeployConfig) -> Result<(DeployerIdentity, DeploymentPlan, ArtifactStore)> {
    let network = config.active_network()?;
    let identity = DeployerIdentity::resolve(&config.network, network)?;
    let plan = config.plan()?;
    let artifacts = ArtifactStore::load(&config.artifacts_dir, plan.names())?;
    Ok((identity, plan, artifacts))
}

async fn deploy(config: &DeployConfig) -> Result<()> {
    let (identity, plan, artifacts) = prepare(config)?;
    let network = config.active_network()?;
    let client = RpcChainClient::new(&network.url, config.tx.clone())
        .context("Failed to create RPC client")?;

    tracing::info!(
        network = %config.network,
        url = %network.url,
        artifacts = %config.artifacts_dir.display(),
        "Starting deployment..."
    );

    let report = Sequencer::new(client, plan, artifacts)
        .deploy(&config.network, network.chain_id, &identity)
        .await?;

    publish(&report, &config.output_dir);
    Ok(())
}

/// Print the summary, then persist the record. The contracts are already
/// deployed at this point, so a record that cannot be written is only logged.
fn publish(report: &DeploymentReport, output_dir: &Path) -> Option<PathBuf> {
    println!("{}", report.table());

    report
        .save_to_dir(output_dir)
        .inspect_err(|err| tracing::error!("Failed to save deployment record: {err:#}"))
        .ok()
}
