use tally_core::Transaction;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Transaction already categorized, stages ran out of order: {transaction}")]
    TransactionAlreadyCategorized { transaction: Box<Transaction> },
    #[error(
        "Ambiguous null match for {anchor}; {} candidates:{}",
        .candidates.len(),
        render(.candidates)
    )]
    AmbiguousNullMatch {
        anchor: Box<Transaction>,
        candidates: Vec<Transaction>,
    },
    #[error("Unknown category '{name}'")]
    UnknownCategory { name: String },
}

fn render(transactions: &[Transaction]) -> String {
    transactions
        .iter()
        .map(|t| format!("\n  {t}"))
        .collect()
}
