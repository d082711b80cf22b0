use chrono::NaiveDate;
use std::io::{Read, Write};
use tally_core::{AmountError, Money, Selector, Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Line {line}: missing {field}")]
    MissingField { line: u64, field: &'static str },
    #[error("Line {line}: invalid date '{value}'")]
    InvalidDate { line: u64, value: String },
    #[error("Line {line}: {source}")]
    InvalidAmount {
        line: u64,
        #[source]
        source: AmountError,
    },
}

/// Writes the canonical export: tab separated
/// `date, description, bank, amount, category`, UTF-8, no header.
pub fn write_transactions<W: Write>(writer: W, transactions: &[Transaction]) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);

    for tx in transactions {
        let date = tx.date.format("%Y-%m-%d").to_string();
        let amount = tx.amount.to_string();
        writer.write_record([
            date.as_str(),
            tx.description.as_str(),
            tx.bank.as_str(),
            amount.as_str(),
            tx.category_name().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads the canonical export back. Lines starting with `#` are comments.
/// A non-empty category column is restored with manual provenance.
pub fn read_transactions<R: Read>(reader: R) -> Result<Vec<Transaction>, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut transactions = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        let get = |idx: usize, field: &'static str| {
            record
                .get(idx)
                .ok_or(ExportError::MissingField { line, field })
        };

        let raw_date = get(0, "date")?.trim();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
            ExportError::InvalidDate {
                line,
                value: raw_date.to_string(),
            }
        })?;
        let description = get(1, "description")?;
        let bank = get(2, "bank")?.trim();
        let amount = Money::parse(get(3, "amount")?)
            .map_err(|source| ExportError::InvalidAmount { line, source })?;

        let mut tx = Transaction::new(date, description, bank, amount);
        if let Some(category) = record.get(4).map(str::trim).filter(|c| !c.is_empty()) {
            tx.assign(category, Selector::Manual);
        }
        transactions.push(tx);
    }
    Ok(transactions)
}
