mod commands;
mod compile;
mod config;
mod contracts;
mod error;
mod project;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use eyre::eyre;

#[derive(Parser, Debug)]
#[command(name = "declan")]
#[command(about = "Deploy and query the DeclanWork marketplace contract")]
#[command(version)]
struct Cli {
    /// Path to the project directory
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Config file to use instead of declan.toml or the user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip project detection and force a specific project type
    #[arg(long, global = true, value_parser = ["foundry", "hardhat"])]
    project_type: Option<String>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build artifacts with the configured compiler settings
    Compile,

    /// Deploy a module's contracts to a network
    Deploy {
        /// Module name as declared under [modules]
        module: String,

        #[arg(long)]
        network: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Seconds to wait for each confirmation
        #[arg(long)]
        timeout: Option<u64>,

        /// Compile before deploying
        #[arg(long)]
        compile: bool,
    },

    /// Read contract state through view functions
    Read {
        #[arg(long)]
        network: Option<String>,

        /// Contract whose artifact provides the ABI
        #[arg(long)]
        contract: String,

        /// Address of the deployed contract
        #[arg(long, conflicts_with = "deployment", required_unless_present = "deployment")]
        address: Option<String>,

        /// Recorded deployment, e.g. DeclanModule#DeclanWork
        #[arg(long)]
        deployment: Option<String>,

        /// Call to make, e.g. "gigs(1)"; defaults to [[queries]] from the config
        #[arg(long = "call")]
        calls: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List deployments recorded for a network
    Deployments {
        #[arg(long)]
        network: Option<String>,
    },

    /// List configured networks
    Networks,

    /// Manage deployer keys in the system keychain
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
}

#[derive(Subcommand, Debug)]
enum WalletAction {
    /// Prompt for a private key and store it in the keychain
    Set { name: String },
    /// Delete a stored key and its config entry
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_path = cli.project.canonicalize().unwrap_or(cli.project);
    let mut config = config::AppConfig::load(&project_path, cli.config.as_deref())?;

    // these only touch configuration and work outside a project
    match &cli.command {
        Command::Networks => return commands::networks(&config),
        Command::Wallet { action } => {
            return match action {
                WalletAction::Set { name } => commands::wallet_set(&mut config, name),
                WalletAction::Remove { name } => commands::wallet_remove(&mut config, name),
            };
        }
        _ => {}
    }

    let project = match cli.project_type.as_deref() {
        Some("foundry") => project::Project::new_foundry(&project_path)?,
        Some("hardhat") => project::Project::new_hardhat(&project_path)?,
        _ => project::detect(&project_path)?,
    };
    let ctx = commands::Context { project, config };

    match cli.command {
        Command::Compile => commands::compile(&ctx).await,
        Command::Deploy {
            module,
            network,
            yes,
            timeout,
            compile,
        } => {
            if compile {
                commands::compile(&ctx).await?;
            }
            commands::deploy(&ctx, &module, network.as_deref(), yes, timeout).await
        }
        Command::Read {
            network,
            contract,
            address,
            deployment,
            calls,
            json,
        } => {
            let target = match (address, deployment) {
                (Some(address), _) => commands::ReadTarget::Address(address),
                (None, deployment) => commands::ReadTarget::Deployment(
                    deployment.ok_or_else(|| eyre!("Either --address or --deployment is required"))?,
                ),
            };
            commands::read(&ctx, network.as_deref(), &contract, target, &calls, json).await
        }
        Command::Deployments { network } => commands::deployments(&ctx, network.as_deref()).await,
        Command::Networks | Command::Wallet { .. } => Ok(()),
    }
}

/// Logs go to stderr so stdout carries only command output
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_filter = if verbose { "declan=debug" } else { "declan=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_read_requires_a_target() {
        assert!(Cli::try_parse_from(["declan", "read", "--contract", "DeclanWork"]).is_err());
        assert!(
            Cli::try_parse_from([
                "declan",
                "read",
                "--contract",
                "DeclanWork",
                "--address",
                "0x5FbDB2315678afecb367f032d93F642f64180aa3",
                "--deployment",
                "DeclanModule#DeclanWork",
            ])
            .is_err()
        );

        let cli = Cli::try_parse_from([
            "declan",
            "read",
            "--network",
            "lisk",
            "--contract",
            "DeclanWork",
            "--deployment",
            "DeclanModule#DeclanWork",
            "--call",
            "noOfFreelancers()",
            "--call",
            "gigs(1)",
        ])
        .unwrap();
        match cli.command {
            Command::Read { calls, .. } => assert_eq!(calls, vec!["noOfFreelancers()", "gigs(1)"]),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
