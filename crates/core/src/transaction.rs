use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::money::Money;

/// How a category ended up on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    Nullifier,
    Rules,
    Manual,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Nullifier => write!(f, "nullifier"),
            Selector::Rules => write!(f, "rules"),
            Selector::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for Selector {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nullifier" => Ok(Selector::Nullifier),
            "rules" => Ok(Selector::Rules),
            "manual" => Ok(Selector::Manual),
            other => Err(format!("Unknown selector: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryAssignment {
    pub name: String,
    pub selector: Selector,
}

impl CategoryAssignment {
    pub fn new(name: impl Into<String>, selector: Selector) -> Self {
        Self { name: name.into(), selector }
    }
}

/// Canonical transaction record.
///
/// Equality and hashing only look at the natural key
/// `(date, description, bank, amount)`; category and tags are ignored.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub bank: String,
    pub amount: Money,
    pub category: Option<CategoryAssignment>,
    pub tags: BTreeSet<String>,
}

impl Transaction {
    pub fn new(date: NaiveDate, description: &str, bank: impl Into<String>, amount: Money) -> Self {
        Transaction {
            date,
            description: normalize_whitespace(description),
            bank: bank.into(),
            amount,
            category: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> (NaiveDate, &str, &str, Money) {
        (self.date, &self.description, &self.bank, self.amount)
    }

    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }

    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.name.as_str())
    }

    pub fn selector(&self) -> Option<Selector> {
        self.category.as_ref().map(|c| c.selector)
    }

    /// Sets the category unconditionally. Single-assignment is enforced by
    /// the pipeline stages, not here.
    pub fn assign(&mut self, name: impl Into<String>, selector: Selector) {
        self.category = Some(CategoryAssignment::new(name, selector));
    }

    /// Returns `false` if the tag was already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {} | {}", self.date, self.description, self.bank, self.amount)?;
        if let Some(category) = &self.category {
            write!(f, " | {} ({})", category.name, category.selector)?;
        }
        Ok(())
    }
}

/// Collapses runs of whitespace into single spaces and trims both ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable sort by date; transactions on the same day keep insertion order.
pub fn sort_chronologically(transactions: &mut [Transaction]) {
    transactions.sort_by_key(|t| t.date);
}
