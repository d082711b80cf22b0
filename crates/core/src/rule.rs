use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::Transaction;

#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("Invalid description pattern '{pattern}' for '{target}': {source}")]
    InvalidPattern {
        target: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Rule for '{target}' has start {start} after end {end}")]
    InvertedDates {
        target: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("Rule for '{target}' has min {min} above max {max}")]
    InvertedAmounts {
        target: String,
        min: Decimal,
        max: Decimal,
    },
}

/// Declarative match predicates as written in configuration. Omitted
/// predicates are wildcards; all bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub description: Option<String>,
    pub bank: Option<String>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

/// A validated rule with its description regex compiled
/// (case-insensitive). `target` is the category or tag it assigns.
#[derive(Debug, Clone)]
pub struct Rule {
    target: String,
    spec: RuleSpec,
    pattern: Option<Regex>,
}

impl Rule {
    pub fn new(target: impl Into<String>, spec: RuleSpec) -> Result<Self, RuleError> {
        let target = target.into();

        if let (Some(start), Some(end)) = (spec.start, spec.end) {
            if start > end {
                return Err(RuleError::InvertedDates { target, start, end });
            }
        }
        if let (Some(min), Some(max)) = (spec.min, spec.max) {
            if min > max {
                return Err(RuleError::InvertedAmounts { target, min, max });
            }
        }

        let pattern = match &spec.description {
            Some(p) => Some(
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RuleError::InvalidPattern {
                        target: target.clone(),
                        pattern: p.clone(),
                        source,
                    })?,
            ),
            None => None,
        };

        Ok(Rule { target, spec, pattern })
    }

    /// A rule with no predicates; matches everything.
    pub fn any(target: impl Into<String>) -> Self {
        Rule {
            target: target.into(),
            spec: RuleSpec::default(),
            pattern: None,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        let spec = &self.spec;

        if spec.start.is_some_and(|start| tx.date < start) {
            return false;
        }
        if spec.end.is_some_and(|end| tx.date > end) {
            return false;
        }
        if spec.bank.as_ref().is_some_and(|bank| *bank != tx.bank) {
            return false;
        }

        let amount = tx.amount.as_decimal();
        if spec.min.is_some_and(|min| amount < min) {
            return false;
        }
        if spec.max.is_some_and(|max| amount > max) {
            return false;
        }

        self.pattern
            .as_ref()
            .map_or(true, |re| re.is_match(&tx.description))
    }
}
