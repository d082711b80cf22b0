use tally_core::{Rule, Selector, Transaction};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::transform::Transformer;

/// Applies category rules in the given order; the first matching rule wins
/// for each transaction. Transactions without a match stay uncategorized.
#[derive(Debug, Clone, Default)]
pub struct Categorizer {
    rules: Vec<Rule>,
}

impl Categorizer {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First rule matching `tx`, if any.
    pub fn find_matching_rule(&self, tx: &Transaction) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(tx))
    }
}

impl Transformer for Categorizer {
    fn transform_inplace(&self, transactions: &mut [Transaction]) -> Result<(), PipelineError> {
        // Only the nullifier may have run before this stage.
        if let Some(tx) = transactions
            .iter()
            .find(|t| t.selector().is_some_and(|s| s != Selector::Nullifier))
        {
            return Err(PipelineError::TransactionAlreadyCategorized {
                transaction: Box::new(tx.clone()),
            });
        }

        let mut assigned = 0;
        for rule in &self.rules {
            let mut hits = 0;
            for tx in transactions.iter_mut().filter(|t| !t.is_categorized()) {
                if rule.matches(tx) {
                    tx.assign(rule.target(), Selector::Rules);
                    hits += 1;
                }
            }
            if hits > 0 {
                debug!(category = rule.target(), hits, "rule applied");
            }
            assigned += hits;
        }

        info!(assigned, total = transactions.len(), "categorizer finished");
        Ok(())
    }
}
