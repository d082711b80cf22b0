use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tally_core::{sort_chronologically, Transaction};
use tally_import::{parse_statement, read_transactions, write_transactions};
use tally_pipeline::{PipelineReport, StopResolver};
use tally_storage::{
    create_db, insert_transactions, select_transactions, update_transactions, DbPool, Filter,
    Ledger,
};
use tracing::info;

use crate::config::Config;
use crate::prompt::PromptResolver;

async fn open(config: &Config) -> Result<DbPool> {
    create_db(&config.database)
        .await
        .with_context(|| format!("Opening database: {}", config.database.display()))
}

pub async fn init(config: &Config) -> Result<()> {
    open(config).await?;
    println!("Database ready at {}", config.database.display());
    Ok(())
}

pub fn banks(config: &Config) -> Result<()> {
    for profile in config.institutions().profiles() {
        println!("{:<12} {} ({})", profile.name, profile.encoding, profile.separator);
    }
    Ok(())
}

pub async fn import(config: &Config, institution: &str, file: &Path, bank: Option<&str>) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("Reading {}", file.display()))?;
    let transactions = parse_statement(&config.institutions(), institution, bank, &data)
        .with_context(|| format!("Parsing {}", file.display()))?;

    let pool = open(config).await?;
    let inserted = insert_transactions(&pool, &transactions).await?;
    info!(parsed = transactions.len(), inserted, "Imported {}", file.display());
    println!(
        "{} transactions parsed, {} new",
        transactions.len(),
        inserted
    );
    Ok(())
}

pub async fn categorize(config: &Config, manual: bool) -> Result<()> {
    let pipeline = config.pipeline()?;
    let ledger = Ledger::new(open(config).await?);

    let report: PipelineReport = if manual {
        let stdin = io::stdin();
        let mut resolver = PromptResolver::new(stdin.lock(), io::stdout());
        pipeline.run(&ledger, &mut resolver).await?
    } else {
        pipeline.run(&ledger, &mut StopResolver).await?
    };

    println!("{report}");
    Ok(())
}

pub async fn export(config: &Config, file: Option<&Path>) -> Result<()> {
    let pool = open(config).await?;
    let mut transactions = select_transactions(&pool, &Filter::All).await?;
    sort_chronologically(&mut transactions);

    match file {
        Some(path) => {
            let out = File::create(path).with_context(|| format!("Creating {}", path.display()))?;
            write_transactions(BufWriter::new(out), &transactions)?;
        }
        None => write_transactions(io::stdout().lock(), &transactions)?,
    }
    io::stdout().flush()?;
    info!(count = transactions.len(), "Exported transactions");
    Ok(())
}

/// Inserts new rows and applies the file's categories to rows already
/// stored. Stored tags are kept since the file format carries none.
pub async fn load(config: &Config, file: &Path) -> Result<()> {
    let reader = File::open(file).with_context(|| format!("Opening {}", file.display()))?;
    let transactions = read_transactions(reader).with_context(|| format!("Reading {}", file.display()))?;

    let pool = open(config).await?;
    let inserted = insert_transactions(&pool, &transactions).await?;

    let stored: HashSet<Transaction> = select_transactions(&pool, &Filter::All)
        .await?
        .into_iter()
        .collect();
    let categorized: Vec<Transaction> = transactions
        .iter()
        .filter(|tx| tx.is_categorized())
        .map(|tx| {
            let mut tx = tx.clone();
            if let Some(existing) = stored.get(&tx) {
                tx.tags = existing.tags.clone();
            }
            tx
        })
        .collect();
    let updated = update_transactions(&pool, &categorized).await?;

    println!(
        "{} rows read, {} new, {} categories applied",
        transactions.len(),
        inserted,
        updated
    );
    Ok(())
}
