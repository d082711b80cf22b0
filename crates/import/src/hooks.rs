use csv::StringRecord;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::{Money, Transaction};

use crate::statement::ParseError;

/// Per-institution post-processing, run once for every parsed row. Any
/// transaction it produces is appended after the main pass. A synthesized
/// fee is described as `"<description>: <source row description>"` so that
/// fees of different rows never share a natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum PostProcess {
    /// Outbound transfers whose description matches `pattern` are charged a
    /// fixed `fee` on the same day, which the bank does not list.
    TransferFee {
        pattern: String,
        fee: Decimal,
        description: String,
    },
    /// A column holding a fee charged on top of the row amount.
    FeeColumn { column: usize, description: String },
}

pub(crate) enum CompiledHook<'a> {
    TransferFee {
        pattern: Regex,
        fee: Money,
        description: &'a str,
    },
    FeeColumn {
        column: usize,
        description: &'a str,
    },
}

impl PostProcess {
    pub(crate) fn compile(&self, institution: &str) -> Result<CompiledHook<'_>, ParseError> {
        match self {
            PostProcess::TransferFee {
                pattern,
                fee,
                description,
            } => {
                let pattern = Regex::new(pattern).map_err(|source| ParseError::InvalidHook {
                    institution: institution.to_string(),
                    source,
                })?;
                Ok(CompiledHook::TransferFee {
                    pattern,
                    fee: -Money::from_decimal(fee.abs()),
                    description,
                })
            }
            PostProcess::FeeColumn {
                column,
                description,
            } => Ok(CompiledHook::FeeColumn {
                column: *column,
                description,
            }),
        }
    }
}

impl CompiledHook<'_> {
    pub(crate) fn apply(
        &self,
        tx: &Transaction,
        record: &StringRecord,
        line: u64,
    ) -> Result<Option<Transaction>, ParseError> {
        match self {
            CompiledHook::TransferFee {
                pattern,
                fee,
                description,
            } => {
                if tx.amount.is_negative() && pattern.is_match(&tx.description) {
                    Ok(Some(fee_for(tx, description, *fee)))
                } else {
                    Ok(None)
                }
            }
            CompiledHook::FeeColumn {
                column,
                description,
            } => {
                let cell = record.get(*column).map(str::trim).unwrap_or_default();
                if cell.is_empty() {
                    return Ok(None);
                }
                let fee = Money::parse(cell)
                    .map_err(|source| ParseError::InvalidAmount { line, source })?;
                if fee.is_zero() {
                    return Ok(None);
                }
                Ok(Some(fee_for(tx, description, -fee.abs())))
            }
        }
    }
}

fn fee_for(source: &Transaction, description: &str, amount: Money) -> Transaction {
    Transaction::new(
        source.date,
        &format!("{description}: {}", source.description),
        source.bank.clone(),
        amount,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_tx(desc: &str, amount: &str) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            desc,
            "cgd",
            Money::parse(amount).unwrap(),
        )
    }

    fn transfer_fee() -> PostProcess {
        PostProcess::TransferFee {
            pattern: "^TRF P/O ".to_string(),
            fee: Decimal::new(120, 2),
            description: "Transfer fee".to_string(),
        }
    }

    #[test]
    fn transfer_fee_synthesized_for_outbound_transfer() {
        let hook = transfer_fee();
        let hook = hook.compile("cgd").unwrap();
        let tx = make_tx("TRF P/O JOHN DOE", "-250");
        let fee = hook.apply(&tx, &StringRecord::new(), 1).unwrap().unwrap();
        assert_eq!(fee.date, tx.date);
        assert_eq!(fee.bank, "cgd");
        assert_eq!(fee.description, "Transfer fee: TRF P/O JOHN DOE");
        assert_eq!(fee.amount, Money::parse("-1.20").unwrap());
    }

    #[test]
    fn transfer_fee_skips_inbound_and_other_rows() {
        let hook = transfer_fee();
        let hook = hook.compile("cgd").unwrap();
        let record = StringRecord::new();
        assert!(hook.apply(&make_tx("TRF P/O JOHN DOE", "250"), &record, 1).unwrap().is_none());
        assert!(hook.apply(&make_tx("CARD PAYMENT", "-25"), &record, 1).unwrap().is_none());
    }

    #[test]
    fn same_day_transfer_fees_stay_distinct() {
        let hook = transfer_fee();
        let hook = hook.compile("cgd").unwrap();
        let record = StringRecord::new();
        let first = hook.apply(&make_tx("TRF P/O JOHN DOE", "-250"), &record, 1).unwrap().unwrap();
        let second = hook.apply(&make_tx("TRF P/O JANE ROE", "-250"), &record, 2).unwrap().unwrap();
        assert_eq!(first.amount, second.amount);
        assert_ne!(first, second);
    }

    #[test]
    fn fee_column_reads_row_cell() {
        let hook = PostProcess::FeeColumn {
            column: 2,
            description: "Card fee".to_string(),
        };
        let hook = hook.compile("revolut").unwrap();
        let tx = make_tx("Coffee", "-3.50");

        let charged = StringRecord::from(vec!["a", "b", "0.25"]);
        let fee = hook.apply(&tx, &charged, 2).unwrap().unwrap();
        assert_eq!(fee.amount, Money::parse("-0.25").unwrap());
        assert_eq!(fee.description, "Card fee: Coffee");

        let free = StringRecord::from(vec!["a", "b", "0.00"]);
        assert!(hook.apply(&tx, &free, 3).unwrap().is_none());

        let bad = StringRecord::from(vec!["a", "b", "x"]);
        assert!(matches!(
            hook.apply(&tx, &bad, 4),
            Err(ParseError::InvalidAmount { line: 4, .. })
        ));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let hook = PostProcess::TransferFee {
            pattern: "(".to_string(),
            fee: Decimal::ONE,
            description: "fee".to_string(),
        };
        assert!(matches!(
            hook.compile("cgd"),
            Err(ParseError::InvalidHook { .. })
        ));
    }
}
