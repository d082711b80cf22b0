use serde::{Deserialize, Serialize};
use tally_core::{Rule, Selector, Transaction};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::transform::Transformer;

/// Category reserved for the two legs of a transfer between own accounts.
pub const NULL_CATEGORY: &str = "null";

pub const DEFAULT_WINDOW_DAYS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// More than one partner for a transaction is an error.
    #[default]
    Strict,
    /// Legacy pairing: the first later partner found wins.
    Greedy,
}

/// Finds self-cancelling pairs: opposite amounts, different banks, dates at
/// most `days` apart. With filters configured both legs must match at least
/// one filter rule. Already categorized transactions are never touched.
#[derive(Debug, Clone)]
pub struct Nullifier {
    days: i64,
    filters: Vec<Rule>,
    policy: MatchPolicy,
}

impl Default for Nullifier {
    fn default() -> Self {
        Self {
            days: DEFAULT_WINDOW_DAYS,
            filters: Vec::new(),
            policy: MatchPolicy::Strict,
        }
    }
}

impl Nullifier {
    pub fn new(days: i64, filters: Vec<Rule>, policy: MatchPolicy) -> Self {
        Self {
            days,
            filters,
            policy,
        }
    }

    fn passes_filters(&self, tx: &Transaction) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|rule| rule.matches(tx))
    }

    fn cancels(&self, a: &Transaction, b: &Transaction) -> bool {
        if a.amount.is_zero() || a.amount != -b.amount || a.bank == b.bank {
            return false;
        }
        if (a.date - b.date).num_days().abs() > self.days {
            return false;
        }
        self.passes_filters(a) && self.passes_filters(b)
    }

    fn candidates(&self, transactions: &[Transaction], taken: &[bool], anchor: usize) -> Vec<usize> {
        transactions
            .iter()
            .enumerate()
            .filter(|&(idx, tx)| idx != anchor && !taken[idx] && self.cancels(&transactions[anchor], tx))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Pairs every transaction with its single partner; a second partner on
    /// either leg is an error.
    fn plan_strict(&self, transactions: &[Transaction]) -> Result<Vec<(usize, usize)>, PipelineError> {
        let mut taken: Vec<bool> = transactions.iter().map(Transaction::is_categorized).collect();
        let mut pairs = Vec::new();

        for anchor in 0..transactions.len() {
            if taken[anchor] {
                continue;
            }
            let candidates = self.candidates(transactions, &taken, anchor);
            let partner = match candidates.as_slice() {
                [] => continue,
                [partner] => *partner,
                _ => return Err(ambiguous(transactions, anchor, &candidates)),
            };

            let reverse = self.candidates(transactions, &taken, partner);
            if reverse.len() > 1 {
                return Err(ambiguous(transactions, partner, &reverse));
            }

            taken[anchor] = true;
            taken[partner] = true;
            pairs.push((anchor, partner));
        }

        Ok(pairs)
    }

    fn plan_greedy(&self, transactions: &[Transaction]) -> Vec<(usize, usize)> {
        let mut taken: Vec<bool> = transactions.iter().map(Transaction::is_categorized).collect();
        let mut pairs = Vec::new();

        for i in 0..transactions.len() {
            if taken[i] {
                continue;
            }
            for j in (i + 1)..transactions.len() {
                if !taken[j] && self.cancels(&transactions[i], &transactions[j]) {
                    taken[i] = true;
                    taken[j] = true;
                    pairs.push((i, j));
                    break;
                }
            }
        }

        pairs
    }
}

fn ambiguous(transactions: &[Transaction], anchor: usize, candidates: &[usize]) -> PipelineError {
    PipelineError::AmbiguousNullMatch {
        anchor: Box::new(transactions[anchor].clone()),
        candidates: candidates.iter().map(|&idx| transactions[idx].clone()).collect(),
    }
}

impl Transformer for Nullifier {
    fn transform_inplace(&self, transactions: &mut [Transaction]) -> Result<(), PipelineError> {
        let pairs = match self.policy {
            MatchPolicy::Strict => self.plan_strict(transactions)?,
            MatchPolicy::Greedy => self.plan_greedy(transactions),
        };

        for &(a, b) in &pairs {
            debug!(first = %transactions[a], second = %transactions[b], "nullified pair");
            transactions[a].assign(NULL_CATEGORY, Selector::Nullifier);
            transactions[b].assign(NULL_CATEGORY, Selector::Nullifier);
        }

        info!(pairs = pairs.len(), policy = ?self.policy, "nullifier finished");
        Ok(())
    }
}
