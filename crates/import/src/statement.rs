use chrono::NaiveDate;
use csv::StringRecord;
use encoding_rs::Encoding;
use std::fs;
use std::path::Path;
use tally_core::{AmountError, Money, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::profile::{AmountLayout, DirectionColumn, InstitutionProfile};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Unknown institution '{name}', valid options: {}", .valid.join(", "))]
    UnknownInstitution { name: String, valid: Vec<String> },
    #[error("Unknown encoding label: {0}")]
    UnknownEncoding(String),
    #[error("File is not valid {encoding}")]
    Encoding { encoding: String },
    #[error("Line {line}: missing column {column}")]
    MissingColumn { line: u64, column: usize },
    #[error("Line {line}: date '{value}' does not match format '{format}'")]
    InvalidDate {
        line: u64,
        value: String,
        format: String,
    },
    #[error("Line {line}: {source}")]
    InvalidAmount {
        line: u64,
        #[source]
        source: AmountError,
    },
    #[error("Line {line}: cannot tell debit from credit (debit '{debit}', credit '{credit}')")]
    AmbiguousColumnLayout {
        line: u64,
        debit: String,
        credit: String,
    },
    #[error("Separator '{separator}' of {institution} is not a single ASCII character")]
    InvalidSeparator { institution: String, separator: char },
    #[error("Invalid post-processing pattern for {institution}: {source}")]
    InvalidHook {
        institution: String,
        #[source]
        source: regex::Error,
    },
}

/// Turns one statement file of a fixed institution format into canonical
/// transactions, in chronological order, tagged with `bank`.
pub struct StatementParser<'a> {
    profile: &'a InstitutionProfile,
    bank: String,
}

impl<'a> StatementParser<'a> {
    pub fn new(profile: &'a InstitutionProfile, bank: impl Into<String>) -> Self {
        Self {
            profile,
            bank: bank.into(),
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<Vec<Transaction>, ParseError> {
        let data = fs::read(path)?;
        self.parse_bytes(&data)
    }

    pub fn parse_bytes(&self, data: &[u8]) -> Result<Vec<Transaction>, ParseError> {
        let profile = self.profile;
        let text = decode(data, &profile.encoding)?;

        let lines: Vec<&str> = text.lines().collect();
        let last = lines.len().saturating_sub(profile.end);
        let body = lines
            .get(profile.start..last)
            .map(|slice| slice.join("\n"))
            .unwrap_or_default();
        debug!(
            institution = %profile.name,
            total = lines.len(),
            start = profile.start,
            end = profile.end,
            "statement decoded"
        );

        let delimiter = ascii_separator(profile.separator).ok_or_else(|| ParseError::InvalidSeparator {
            institution: profile.name.clone(),
            separator: profile.separator,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(body.as_bytes());

        let hook = profile
            .post_process
            .as_ref()
            .map(|p| p.compile(&profile.name))
            .transpose()?;

        let mut transactions = Vec::new();
        let mut synthesized = Vec::new();

        for result in reader.records() {
            let record = result?;
            let line = record
                .position()
                .map_or(0, |p| p.line() + profile.start as u64);

            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            let tx = self.parse_record(&record, line)?;
            if let Some(hook) = &hook {
                if let Some(extra) = hook.apply(&tx, &record, line)? {
                    debug!(line, description = %extra.description, "synthesized transaction");
                    synthesized.push(extra);
                }
            }
            transactions.push(tx);
        }

        if profile.reverse {
            transactions.reverse();
            synthesized.reverse();
        }
        transactions.append(&mut synthesized);

        info!(
            institution = %profile.name,
            bank = %self.bank,
            count = transactions.len(),
            "statement parsed"
        );
        Ok(transactions)
    }

    fn parse_record(&self, record: &StringRecord, line: u64) -> Result<Transaction, ParseError> {
        let profile = self.profile;

        let raw_date = field(record, profile.date_column, line)?.trim();
        let date = NaiveDate::parse_from_str(raw_date, &profile.date_format).map_err(|_| {
            ParseError::InvalidDate {
                line,
                value: raw_date.to_string(),
                format: profile.date_format.clone(),
            }
        })?;

        let mut parts = Vec::with_capacity(profile.description_columns.len());
        for &column in &profile.description_columns {
            parts.push(field(record, column, line)?);
        }
        let description = parts.join(" ");

        let amount = match &profile.amount {
            AmountLayout::Single { column, negate } => {
                let amount = parse_money(field(record, *column, line)?, line)?;
                if *negate {
                    -amount
                } else {
                    amount
                }
            }
            AmountLayout::Split {
                debit,
                credit,
                direction,
            } => split_amount(record, *debit, *credit, direction.as_ref(), line)?,
        };

        Ok(Transaction::new(date, &description, self.bank.clone(), amount))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Debit,
    Credit,
}

/// Resolves a debit/credit row. Tie-break order: which value column is
/// filled, then which parsed value is non-zero, then the direction text
/// column. Debits come out negative, credits positive.
fn split_amount(
    record: &StringRecord,
    debit_column: usize,
    credit_column: usize,
    direction: Option<&DirectionColumn>,
    line: u64,
) -> Result<Money, ParseError> {
    let debit_raw = field(record, debit_column, line)?.trim();
    let credit_raw = field(record, credit_column, line)?.trim();

    let ambiguous = || ParseError::AmbiguousColumnLayout {
        line,
        debit: debit_raw.to_string(),
        credit: credit_raw.to_string(),
    };

    let side_amount = |side: Side, value: Money| match side {
        Side::Debit => -value.abs(),
        Side::Credit => value.abs(),
    };

    match (debit_raw.is_empty(), credit_raw.is_empty()) {
        (false, true) => return Ok(side_amount(Side::Debit, parse_money(debit_raw, line)?)),
        (true, false) => return Ok(side_amount(Side::Credit, parse_money(credit_raw, line)?)),
        (true, true) => return Err(ambiguous()),
        (false, false) => {}
    }

    let debit = parse_money(debit_raw, line)?;
    let credit = parse_money(credit_raw, line)?;
    match (debit.is_zero(), credit.is_zero()) {
        (false, true) => return Ok(side_amount(Side::Debit, debit)),
        (true, false) => return Ok(side_amount(Side::Credit, credit)),
        _ => {}
    }
    // A single negative value marks the row as an outflow of that value.
    match (debit.is_negative(), credit.is_negative()) {
        (true, false) => return Ok(debit),
        (false, true) => return Ok(credit),
        _ => {}
    }

    let marker = direction
        .and_then(|d| record.get(d.column).map(|text| (d, text.trim())))
        .filter(|(_, text)| !text.is_empty());
    match marker {
        Some((d, text)) if text.eq_ignore_ascii_case(&d.debit_marker) => {
            Ok(side_amount(Side::Debit, debit))
        }
        Some((d, text)) if text.eq_ignore_ascii_case(&d.credit_marker) => {
            Ok(side_amount(Side::Credit, credit))
        }
        _ => Err(ambiguous()),
    }
}

pub(crate) fn ascii_separator(separator: char) -> Option<u8> {
    u8::try_from(separator).ok().filter(u8::is_ascii)
}

fn field(record: &StringRecord, column: usize, line: u64) -> Result<&str, ParseError> {
    record
        .get(column)
        .ok_or(ParseError::MissingColumn { line, column })
}

fn parse_money(raw: &str, line: u64) -> Result<Money, ParseError> {
    Money::parse(raw).map_err(|source| ParseError::InvalidAmount { line, source })
}

fn decode(data: &[u8], label: &str) -> Result<String, ParseError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ParseError::UnknownEncoding(label.to_string()))?;
    let (text, had_errors) = encoding.decode_with_bom_removal(data);
    if had_errors {
        return Err(ParseError::Encoding {
            encoding: encoding.name().to_string(),
        });
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Institutions;
    use std::io::Write;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    fn single_profile() -> InstitutionProfile {
        InstitutionProfile {
            name: "test".to_string(),
            encoding: "utf-8".to_string(),
            separator: ';',
            start: 1,
            end: 0,
            date_format: "%d/%m/%Y".to_string(),
            date_column: 0,
            description_columns: vec![1],
            amount: AmountLayout::Single {
                column: 2,
                negate: false,
            },
            reverse: false,
            post_process: None,
        }
    }

    fn split_profile(direction: Option<DirectionColumn>) -> InstitutionProfile {
        InstitutionProfile {
            amount: AmountLayout::Split {
                debit: 2,
                credit: 3,
                direction,
            },
            ..single_profile()
        }
    }

    fn parse(profile: &InstitutionProfile, data: &str) -> Result<Vec<Transaction>, ParseError> {
        StatementParser::new(profile, "Bank#1").parse_bytes(data.as_bytes())
    }

    #[test]
    fn single_column_basic() {
        let data = "Date;Description;Amount\n15/01/2024;LIDL   PORTO;-12,34\n16/01/2024;SALARY;1.500,00\n";
        let txs = parse(&single_profile(), data).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].date, date(2024, 1, 15));
        assert_eq!(txs[0].description, "LIDL PORTO");
        assert_eq!(txs[0].bank, "Bank#1");
        assert_eq!(txs[0].amount, money("-12.34"));
        assert_eq!(txs[1].amount, money("1500"));
        assert!(txs.iter().all(|t| t.category.is_none()));
    }

    #[test]
    fn negate_flips_sign() {
        let profile = InstitutionProfile {
            amount: AmountLayout::Single {
                column: 2,
                negate: true,
            },
            ..single_profile()
        };
        let txs = parse(&profile, "h\n15/01/2024;CHARGE;49.99\n").unwrap();
        assert_eq!(txs[0].amount, money("-49.99"));
    }

    #[test]
    fn header_and_footer_bounds() {
        let profile = InstitutionProfile {
            start: 3,
            end: 2,
            ..single_profile()
        };
        let data = "Account: 123\nPeriod: Jan\nDate;Desc;Amount\n01/01/2024;A;1\n02/01/2024;B;2\nBalance;;\nGenerated by bank\n";
        let txs = parse(&profile, data).unwrap();
        let descriptions: Vec<&str> = txs.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descriptions, vec!["A", "B"]);
    }

    #[test]
    fn reversed_file_comes_out_chronological() {
        let profile = InstitutionProfile {
            reverse: true,
            ..single_profile()
        };
        let data = "h\n03/01/2024;C;3\n02/01/2024;B;2\n01/01/2024;A;1\n";
        let txs = parse(&profile, data).unwrap();
        let days: Vec<NaiveDate> = txs.iter().map(|t| t.date).collect();
        assert_eq!(days, vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)]);
    }

    #[test]
    fn bad_date_is_fatal_for_the_file() {
        let data = "h\n01/01/2024;A;1\n2024-01-02;B;2\n03/01/2024;C;3\n";
        match parse(&single_profile(), data) {
            Err(ParseError::InvalidDate { line, value, format }) => {
                assert_eq!(line, 3);
                assert_eq!(value, "2024-01-02");
                assert_eq!(format, "%d/%m/%Y");
            }
            other => panic!("expected InvalidDate, got {other:?}"),
        }
    }

    #[test]
    fn bad_amount_is_fatal_for_the_file() {
        let data = "h\n01/01/2024;A;abc\n";
        assert!(matches!(
            parse(&single_profile(), data),
            Err(ParseError::InvalidAmount { line: 2, .. })
        ));
    }

    #[test]
    fn missing_column_reported() {
        let data = "h\n01/01/2024;A\n";
        assert!(matches!(
            parse(&single_profile(), data),
            Err(ParseError::MissingColumn { line: 2, column: 2 })
        ));
    }

    #[test]
    fn split_debit_only_is_negative() {
        let txs = parse(&split_profile(None), "h\n01/01/2024;CHARGE;50,00;\n").unwrap();
        assert_eq!(txs[0].amount, money("-50"));
    }

    #[test]
    fn split_credit_only_is_positive() {
        let txs = parse(&split_profile(None), "h\n01/01/2024;PAYMENT;;100,00\n").unwrap();
        assert_eq!(txs[0].amount, money("100"));
    }

    #[test]
    fn split_both_filled_zero_loses() {
        let txs = parse(&split_profile(None), "h\n01/01/2024;A;0,00;7,00\n01/01/2024;B;8,00;0\n").unwrap();
        assert_eq!(txs[0].amount, money("7"));
        assert_eq!(txs[1].amount, money("-8"));
    }

    #[test]
    fn split_sign_breaks_tie_before_direction() {
        let txs = parse(&split_profile(None), "h\n01/01/2024;A;-5,00;5,00\n01/01/2024;B;5,00;-7,00\n").unwrap();
        assert_eq!(txs[0].amount, money("-5"));
        assert_eq!(txs[1].amount, money("-7"));

        let err = parse(&split_profile(None), "h\n01/01/2024;A;-5,00;-5,00\n").unwrap_err();
        assert!(matches!(err, ParseError::AmbiguousColumnLayout { line: 2, .. }));
    }

    #[test]
    fn non_ascii_separator_is_rejected() {
        let profile = InstitutionProfile {
            separator: '→',
            ..single_profile()
        };
        let err = parse(&profile, "h\n01/01/2024→A→1\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidSeparator { separator: '→', .. }));
    }

    #[test]
    fn split_direction_column_breaks_tie() {
        let direction = DirectionColumn {
            column: 4,
            debit_marker: "D".to_string(),
            credit_marker: "C".to_string(),
        };
        let profile = split_profile(Some(direction));
        let txs = parse(&profile, "h\n01/01/2024;A;5,00;5,00;d\n01/01/2024;B;6,00;6,00;C\n").unwrap();
        assert_eq!(txs[0].amount, money("-5"));
        assert_eq!(txs[1].amount, money("6"));
    }

    #[test]
    fn split_undecidable_is_ambiguous() {
        let err = parse(&split_profile(None), "h\n01/01/2024;A;5,00;5,00\n").unwrap_err();
        assert!(matches!(err, ParseError::AmbiguousColumnLayout { line: 2, .. }));

        let err = parse(&split_profile(None), "h\n01/01/2024;A;;\n").unwrap_err();
        assert!(matches!(err, ParseError::AmbiguousColumnLayout { line: 2, .. }));
    }

    #[test]
    fn windows_1252_decoding() {
        let profile = InstitutionProfile {
            encoding: "windows-1252".to_string(),
            ..single_profile()
        };
        // "CAFÉ" with É = 0xC9 in windows-1252
        let mut data = b"h\n01/01/2024;CAF".to_vec();
        data.push(0xC9);
        data.extend_from_slice(b";-2,50\n");
        let txs = StatementParser::new(&profile, "b").parse_bytes(&data).unwrap();
        assert_eq!(txs[0].description, "CAFÉ");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let data = b"h\n01/01/2024;CAF\xC9;-2,50\n";
        assert!(matches!(
            StatementParser::new(&single_profile(), "b").parse_bytes(data),
            Err(ParseError::Encoding { .. })
        ));
    }

    #[test]
    fn utf8_bom_stripped() {
        let profile = InstitutionProfile {
            start: 0,
            ..single_profile()
        };
        let data = "\u{feff}01/01/2024;A;1\n";
        let txs = parse(&profile, data).unwrap();
        assert_eq!(txs[0].date, date(2024, 1, 1));
    }

    #[test]
    fn unknown_encoding_label() {
        let profile = InstitutionProfile {
            encoding: "klingon".to_string(),
            ..single_profile()
        };
        assert!(matches!(
            parse(&profile, "h\n"),
            Err(ParseError::UnknownEncoding(_))
        ));
    }

    #[test]
    fn quoted_multiline_description() {
        let data = "h\n01/01/2024;\"LINE ONE\nLINE   TWO\";-1\n02/01/2024;NEXT;-2\n";
        let txs = parse(&single_profile(), data).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description, "LINE ONE LINE TWO");
    }

    #[test]
    fn blank_rows_are_skipped() {
        let data = "h\n01/01/2024;A;1\n;;\n\n02/01/2024;B;2\n";
        assert_eq!(parse(&single_profile(), data).unwrap().len(), 2);
    }

    #[test]
    fn multiple_description_columns_joined() {
        let profile = InstitutionProfile {
            description_columns: vec![1, 3],
            ..single_profile()
        };
        let txs = parse(&profile, "h\n01/01/2024;CARD;-3;LISBOA\n").unwrap();
        assert_eq!(txs[0].description, "CARD LISBOA");
    }

    #[test]
    fn cgd_profile_appends_transfer_fees_after_main_pass() {
        let institutions = Institutions::builtin();
        let cgd = institutions.get("cgd").unwrap();
        let mut text = String::new();
        for i in 0..7 {
            text.push_str(&format!("header {i}\n"));
        }
        text.push_str("05-03-2024;05-03-2024;TRF P/O JOHN DOE;250,00;;\n");
        text.push_str("04-03-2024;04-03-2024;SALARIO ACME;;1.800,00;\n");
        text.push_str("Saldo final;;;;;\n");
        let (data, _, _) = encoding_rs::WINDOWS_1252.encode(&text);

        let txs = StatementParser::new(cgd, "cgd").parse_bytes(&data).unwrap();
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[0].description, "SALARIO ACME");
        assert_eq!(txs[0].amount, money("1800"));
        assert_eq!(txs[1].description, "TRF P/O JOHN DOE");
        assert_eq!(txs[1].amount, money("-250"));
        assert_eq!(txs[2].description, "Transfer fee: TRF P/O JOHN DOE");
        assert_eq!(txs[2].date, date(2024, 3, 5));
        assert_eq!(txs[2].amount, money("-1.20"));
    }

    #[test]
    fn revolut_profile_with_fee_column() {
        let institutions = Institutions::builtin();
        let revolut = institutions.get("revolut").unwrap();
        let data = "Type,Product,Started Date,Completed Date,Description,Amount,Fee,Currency\n\
                    CARD_PAYMENT,Current,2024-02-01 10:15:00,2024-02-02 09:00:00,Coffee,-3.50,0.00,EUR\n\
                    EXCHANGE,Current,2024-02-03 11:00:00,2024-02-03 11:00:00,Exchanged to USD,-100.00,0.50,EUR\n";
        let txs = StatementParser::new(revolut, "revolut").parse_bytes(data.as_bytes()).unwrap();
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[0].date, date(2024, 2, 1));
        assert_eq!(txs[2].description, "Revolut fee: Exchanged to USD");
        assert_eq!(txs[2].amount, money("-0.50"));
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"h\n01/01/2024;A;1\n").unwrap();
        let txs = StatementParser::new(&single_profile(), "b")
            .parse_file(file.path())
            .unwrap();
        assert_eq!(txs.len(), 1);
    }
}
