//! Threat Analyzer CLI
//!
//! A command-line tool for browsing threat verdicts and checking the
//! health of a running analyzer.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{list, status};

/// Threat Analyzer CLI
#[derive(Parser)]
#[command(name = "threats")]
#[command(author, version, about = "CLI for the Log Threat Analyzer", long_about = None)]
pub struct Cli {
    /// Index store URL (can also be set via THREATS_STORE_URL env var)
    #[arg(long, env = "THREATS_STORE_URL", default_value = "http://localhost:9200")]
    pub store_url: String,

    /// Analyzer health API URL (can also be set via THREATS_ANALYZER_URL env var)
    #[arg(long, env = "THREATS_ANALYZER_URL", default_value = "http://localhost:8080")]
    pub analyzer_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List recent threat verdicts
    List {
        /// Threat index to query
        #[arg(long, default_value = "ai-threats")]
        index: String,

        /// Maximum number of verdicts to show
        #[arg(long, short, default_value_t = 20)]
        limit: usize,

        /// Filter by threat label (none, malware, phishing, brute_force, sqli, xss)
        #[arg(long, short)]
        threat: Option<String>,
    },

    /// Show analyzer health and readiness
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List {
            index,
            limit,
            threat,
        } => {
            let store = client::StoreClient::new(&cli.store_url)?;
            list::list_threats(&store, &index, limit, threat.as_deref(), cli.format).await?;
        }
        Commands::Status => {
            let analyzer = client::AnalyzerClient::new(&cli.analyzer_url)?;
            status::show_status(&analyzer, cli.format).await?;
        }
    }

    Ok(())
}
