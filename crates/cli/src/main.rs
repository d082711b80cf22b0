use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod prompt;

use config::Config;

#[derive(Parser)]
#[command(name = "tally", version, about = "Bank statement import and categorization")]
struct Cli {
    /// Configuration file (defaults to ./tally.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database
    Init,
    /// List the known institution profiles
    Banks,
    /// Parse a statement file and store its transactions
    Import {
        institution: String,
        file: PathBuf,
        /// Bank identifier stored on each row (defaults to the institution)
        #[arg(long)]
        bank: Option<String>,
    },
    /// Run the categorization pipeline over uncategorized transactions
    Categorize {
        /// Leave unmatched transactions uncategorized instead of prompting
        #[arg(long)]
        no_manual: bool,
    },
    /// Write all transactions as tab-separated rows
    Export { file: Option<PathBuf> },
    /// Read tab-separated rows back into the database
    Load { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Init => commands::init(&config).await,
        Command::Banks => commands::banks(&config),
        Command::Import {
            institution,
            file,
            bank,
        } => commands::import(&config, &institution, &file, bank.as_deref()).await,
        Command::Categorize { no_manual } => commands::categorize(&config, !no_manual).await,
        Command::Export { file } => commands::export(&config, file.as_deref()).await,
        Command::Load { file } => commands::load(&config, &file).await,
    }
}
