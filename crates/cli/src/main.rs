//! Capacity Governor CLI
//!
//! A command-line tool for inspecting actions, querying the audit trail
//! and resolving approvals against a running governor daemon.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{actions, audit, health};

/// Capacity Governor CLI
#[derive(Parser)]
#[command(name = "capg")]
#[command(author, version, about = "CLI for the Capacity Governor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via CAPG_API_URL env var)
    #[arg(long, env = "CAPG_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List capacity actions
    Actions {
        /// Also show recently resolved actions
        #[arg(long)]
        all: bool,
    },

    /// Query the audit trail
    Audit {
        /// Filter by handle key (service/limit/region)
        #[arg(long)]
        handle: Option<String>,

        /// Range start as a unix timestamp
        #[arg(long)]
        from: Option<i64>,

        /// Range end as a unix timestamp
        #[arg(long)]
        to: Option<i64>,
    },

    /// Approve a pending capacity increase
    Approve {
        /// Approval workflow id
        workflow_id: String,
    },

    /// Deny a pending capacity increase
    Deny {
        /// Approval workflow id
        workflow_id: String,
    },

    /// Show governor health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Actions { all } => {
            actions::list_actions(&client, all, cli.format).await?;
        }
        Commands::Audit { handle, from, to } => {
            audit::query_audit(&client, handle, from, to, cli.format).await?;
        }
        Commands::Approve { workflow_id } => {
            actions::resolve_approval(&client, &workflow_id, true).await?;
        }
        Commands::Deny { workflow_id } => {
            actions::resolve_approval(&client, &workflow_id, false).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
