//! Switchboard CLI: answer questions by orchestrating discovered capabilities.
//!
//! A thin bootstrap over `switchboard-core`: argument parsing, config and
//! `.env` loading, logging setup, printing outcomes.

use clap::{Parser, Subcommand};

use switchboard_cli::commands;

/// Switchboard CLI: capability orchestration driven by a language model
#[derive(Parser)]
#[command(name = "switchboard", version, about = "Switchboard CLI: capability orchestration driven by a language model")]
pub struct Cli {
    /// Path to the workflow configuration (YAML)
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one request
    Ask {
        /// The natural-language request
        request: String,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the capabilities the registry announces
    Capabilities {
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the safety validator on a structured query
    CheckQuery {
        /// The query text
        query: String,
        /// Schema context for the semantic check
        #[arg(long)]
        schema: Option<String>,
        /// Accept every query (same as safety.blocking_enabled = false)
        #[arg(long)]
        no_blocking: bool,
        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration file
    ValidateConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard_core=warn,switchboard_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match commands::load_config(cli.config.as_deref()) {
        Err(e) => Err(e),
        Ok(config) => match cli.command {
            Commands::Ask { request, json } => commands::ask::run(config, &request, json).await,
            Commands::Capabilities { json } => commands::capabilities::list(&config, json).await,
            Commands::CheckQuery {
                query,
                schema,
                no_blocking,
                json,
            } => commands::check::run(config, &query, schema.as_deref(), no_blocking, json).await,
            Commands::ValidateConfig => commands::validate_config(&config),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
