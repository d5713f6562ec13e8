use anyhow::Result;
use clap::{Parser, Subcommand};
use custompodcount_controller::config::{ControllerArgs, ControllerConfig};
use custompodcount_controller::controller_runtime::run_controller;
use custompodcount_controller::crds::Custompodcount;
use kube::{Client, CustomResourceExt};
use tracing::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "custompodcount-controller", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the Custompodcount CustomResourceDefinition as YAML
    Export,
    /// Run the controller against the cluster from the current kubeconfig or service account
    Run(ControllerArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Export => {
            info!("exporting custom resource definition");
            println!("{}", serde_yaml::to_string(&Custompodcount::crd())?);
        }
        Command::Run(args) => {
            let config = ControllerConfig::from(args);
            info!(?config, "running custompodcount-controller");
            let client = Client::try_default().await?;
            run_controller(client, config).await?;
        }
    }
    Ok(())
}
