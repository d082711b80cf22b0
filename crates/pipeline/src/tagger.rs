use tally_core::{Rule, Transaction};
use tracing::debug;

use crate::error::PipelineError;
use crate::transform::Transformer;

/// Adds every matching tag; a transaction may carry many. Re-running is a
/// no-op.
#[derive(Debug, Clone, Default)]
pub struct Tagger {
    rules: Vec<Rule>,
}

impl Tagger {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }
}

impl Transformer for Tagger {
    fn transform_inplace(&self, transactions: &mut [Transaction]) -> Result<(), PipelineError> {
        for rule in &self.rules {
            let mut hits = 0;
            for tx in transactions.iter_mut() {
                if tx.has_tag(rule.target()) {
                    continue;
                }
                if rule.matches(tx) {
                    tx.add_tag(rule.target());
                    hits += 1;
                }
            }
            if hits > 0 {
                debug!(tag = rule.target(), hits, "tag rule applied");
            }
        }
        Ok(())
    }
}
