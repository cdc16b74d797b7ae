mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "riskscope")]
#[command(about = "Live risk annotation of browser agent runs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the browser agent against a site and annotate its actions
    Explore {
        /// Target URL for the agent
        #[arg(short, long)]
        url: String,

        /// Natural-language task for the agent
        #[arg(short, long)]
        instruction: String,

        /// Step budget (1-50, default 10)
        #[arg(short, long)]
        max_steps: Option<String>,

        /// Write the annotated actions and the agent log to the exports directory
        #[arg(long)]
        export: bool,
    },

    /// Annotate a previously recorded agent log
    Analyze {
        /// Log file (.json, .jsonl, .log or .txt)
        file: PathBuf,

        /// Write the annotated actions and the uploaded log to the exports directory
        #[arg(long)]
        export: bool,
    },

    /// Show configuration, service endpoints and recent exports
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current configuration
    Show,
    /// Get a config value by dot-separated key (e.g. service.baseUrl)
    Get {
        /// Config key path (e.g. "service.base_url", "channel.eventBuffer")
        key: String,
    },
    /// Set a config value by dot-separated key
    Set {
        /// Config key path
        key: String,
        /// Value to set (auto-detects JSON types)
        value: String,
    },
    /// Reset config to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Explore {
            url,
            instruction,
            max_steps,
            export,
        } => {
            commands::explore::run(&url, &instruction, max_steps.as_deref(), export).await?;
        }
        Commands::Analyze { file, export } => {
            commands::analyze::run(&file, export).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::config_cmd::show().await?;
            }
            ConfigCommands::Get { key } => {
                commands::config_cmd::get(&key).await?;
            }
            ConfigCommands::Set { key, value } => {
                commands::config_cmd::set(&key, &value).await?;
            }
            ConfigCommands::Reset { force } => {
                commands::config_cmd::reset(force).await?;
            }
        },
    }

    Ok(())
}
