use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::hooks::PostProcess;
use crate::statement::{ascii_separator, ParseError};

/// How the amount of a row is laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum AmountLayout {
    /// One signed amount column. `negate` flips banks that report outflows
    /// as positive numbers.
    Single {
        column: usize,
        #[serde(default)]
        negate: bool,
    },
    /// Separate debit and credit columns; exactly one should be filled.
    Split {
        debit: usize,
        credit: usize,
        #[serde(default)]
        direction: Option<DirectionColumn>,
    },
}

/// A text column marking each row as debit or credit, used as the last
/// tie-break when both value columns are filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectionColumn {
    pub column: usize,
    pub debit_marker: String,
    pub credit_marker: String,
}

/// Format parameters for one institution's statement export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstitutionProfile {
    pub name: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_separator", deserialize_with = "ascii_char")]
    pub separator: char,
    /// Lines skipped at the top of the file.
    #[serde(default)]
    pub start: usize,
    /// Lines dropped at the bottom of the file.
    #[serde(default)]
    pub end: usize,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    pub date_column: usize,
    pub description_columns: Vec<usize>,
    pub amount: AmountLayout,
    /// File lists latest transactions first.
    #[serde(default)]
    pub reverse: bool,
    #[serde(default)]
    pub post_process: Option<PostProcess>,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_separator() -> char {
    ','
}

fn ascii_char<'de, D: Deserializer<'de>>(deserializer: D) -> Result<char, D::Error> {
    let separator = char::deserialize(deserializer)?;
    match ascii_separator(separator) {
        Some(_) => Ok(separator),
        None => Err(D::Error::custom(format!(
            "separator '{separator}' is not a single ASCII character"
        ))),
    }
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

/// Profiles compiled into the binary. Configuration may add more or
/// replace these by name.
pub fn builtin_profiles() -> Vec<InstitutionProfile> {
    vec![
        InstitutionProfile {
            name: "cgd".to_string(),
            encoding: "windows-1252".to_string(),
            separator: ';',
            start: 7,
            end: 1,
            date_format: "%d-%m-%Y".to_string(),
            date_column: 0,
            description_columns: vec![2],
            amount: AmountLayout::Split {
                debit: 3,
                credit: 4,
                direction: None,
            },
            reverse: true,
            post_process: Some(PostProcess::TransferFee {
                pattern: r"^(TRF|TRANSF)\.? ?(P/O|SEPA\+?) ".to_string(),
                fee: Decimal::new(120, 2),
                description: "Transfer fee".to_string(),
            }),
        },
        InstitutionProfile {
            name: "millennium".to_string(),
            encoding: "iso-8859-1".to_string(),
            separator: ';',
            start: 1,
            end: 0,
            date_format: "%d-%m-%Y".to_string(),
            date_column: 1,
            description_columns: vec![2],
            amount: AmountLayout::Split {
                debit: 3,
                credit: 4,
                direction: Some(DirectionColumn {
                    column: 5,
                    debit_marker: "D".to_string(),
                    credit_marker: "C".to_string(),
                }),
            },
            reverse: false,
            post_process: None,
        },
        InstitutionProfile {
            name: "santander".to_string(),
            encoding: "utf-8".to_string(),
            separator: ';',
            start: 1,
            end: 0,
            date_format: "%d/%m/%Y".to_string(),
            date_column: 0,
            description_columns: vec![2],
            amount: AmountLayout::Single {
                column: 3,
                negate: false,
            },
            reverse: true,
            post_process: None,
        },
        InstitutionProfile {
            name: "bpi".to_string(),
            encoding: "iso-8859-1".to_string(),
            separator: ';',
            start: 9,
            end: 0,
            date_format: "%d-%m-%Y".to_string(),
            date_column: 0,
            description_columns: vec![2],
            amount: AmountLayout::Single {
                column: 3,
                negate: false,
            },
            reverse: true,
            post_process: None,
        },
        InstitutionProfile {
            name: "amex".to_string(),
            encoding: "utf-8".to_string(),
            separator: ',',
            start: 1,
            end: 0,
            date_format: "%m/%d/%Y".to_string(),
            date_column: 0,
            description_columns: vec![1],
            amount: AmountLayout::Single {
                column: 2,
                negate: true,
            },
            reverse: true,
            post_process: None,
        },
        InstitutionProfile {
            name: "revolut".to_string(),
            encoding: "utf-8".to_string(),
            separator: ',',
            start: 1,
            end: 0,
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
            date_column: 2,
            description_columns: vec![4],
            amount: AmountLayout::Single {
                column: 5,
                negate: false,
            },
            reverse: false,
            post_process: Some(PostProcess::FeeColumn {
                column: 6,
                description: "Revolut fee".to_string(),
            }),
        },
    ]
}

/// Explicit table of known institution profiles.
#[derive(Debug, Clone)]
pub struct Institutions {
    profiles: Vec<InstitutionProfile>,
}

impl Default for Institutions {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Institutions {
    pub fn builtin() -> Self {
        Self {
            profiles: builtin_profiles(),
        }
    }

    /// Adds a profile, replacing any existing profile of the same name.
    pub fn register(&mut self, profile: InstitutionProfile) {
        match self
            .profiles
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(&profile.name))
        {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    pub fn with_profiles(mut self, profiles: impl IntoIterator<Item = InstitutionProfile>) -> Self {
        for profile in profiles {
            self.register(profile);
        }
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }

    pub fn profiles(&self) -> &[InstitutionProfile] {
        &self.profiles
    }

    pub fn get(&self, name: &str) -> Result<&InstitutionProfile, ParseError> {
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ParseError::UnknownInstitution {
                name: name.to_string(),
                valid: self.names(),
            })
    }
}
