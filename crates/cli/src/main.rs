//! Cloud scheduler CLI
//!
//! A command-line tool for inspecting tracked resources, forecasts,
//! actions and costs, and for pushing utilization samples.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{actions, costs, health, resources, samples};
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Cloud scheduler CLI
#[derive(Parser)]
#[command(name = "csctl")]
#[command(author, version, about = "CLI for the cloud scheduler", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via CSCTL_API_URL env var)
    #[arg(long, env = "CSCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, value_enum)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect tracked resources
    #[command(subcommand)]
    Resources(ResourceCommands),

    /// Show utilization statistics for a resource
    Stats {
        /// Resource ID
        id: String,

        /// Reporting period (1h, 24h, 7d, 30d)
        #[arg(long, default_value = "24h")]
        period: String,
    },

    /// Show monthly cost and projected savings
    Costs,

    /// Inspect executed and in-flight actions
    #[command(subcommand)]
    Actions(ActionCommands),

    /// Push utilization samples from a JSON file
    Ingest {
        /// Path to a JSON array of samples
        file: PathBuf,
    },

    /// Show service health and readiness
    Health,

    /// Manage local CLI configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ResourceCommands {
    /// List tracked resources
    List,

    /// Show the latest evaluation and action history of a resource
    Show {
        /// Resource ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ActionCommands {
    /// Show success rates per action kind
    Stats,

    /// List actions currently in flight
    InFlight,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the stored configuration
    Show,

    /// Update stored defaults
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default output format
        #[arg(long, value_enum)]
        default_format: Option<output::OutputFormat>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let stored = config::Config::load()?;

    // Flags and environment win over the stored configuration
    let format = cli.format.or(stored.default_format).unwrap_or_default();
    let api_url = cli
        .api_url
        .or_else(|| stored.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    match cli.command {
        Commands::Config(cmd) => run_config(cmd, stored),
        command => run(command, &api_url, format).await,
    }
}

async fn run(command: Commands, api_url: &str, format: output::OutputFormat) -> Result<()> {
    let client = client::ApiClient::new(api_url)?;

    match command {
        Commands::Resources(cmd) => match cmd {
            ResourceCommands::List => resources::list_resources(&client, format).await,
            ResourceCommands::Show { id } => resources::show_resource(&client, &id, format).await,
        },
        Commands::Stats { id, period } => resources::show_stats(&client, &id, &period, format).await,
        Commands::Costs => costs::show_costs(&client, format).await,
        Commands::Actions(cmd) => match cmd {
            ActionCommands::Stats => actions::show_stats(&client, format).await,
            ActionCommands::InFlight => actions::list_in_flight(&client, format).await,
        },
        Commands::Ingest { file } => samples::ingest(&client, &file, format).await,
        Commands::Health => health::show_health(&client, format).await,
        Commands::Config(cmd) => run_config(cmd, config::Config::load()?),
    }
}

fn run_config(cmd: ConfigCommands, mut stored: config::Config) -> Result<()> {
    match cmd {
        ConfigCommands::Show => output::print_json(&stored)?,
        ConfigCommands::Set {
            api_url,
            default_format,
        } => {
            if api_url.is_none() && default_format.is_none() {
                output::print_info("Nothing to update");
                return Ok(());
            }
            if api_url.is_some() {
                stored.api_url = api_url;
            }
            if default_format.is_some() {
                stored.default_format = default_format;
            }
            let path = stored.save()?;
            output::print_success(&format!("Configuration written to {}", path.display()));
        }
    }
    Ok(())
}
