use tally_core::Transaction;

use crate::error::PipelineError;

/// A pipeline stage over a batch of transactions.
pub trait Transformer {
    /// Mutates `transactions` in place. On error the batch is left as it was.
    fn transform_inplace(&self, transactions: &mut [Transaction]) -> Result<(), PipelineError>;

    /// Returns a transformed deep copy and leaves `transactions` untouched.
    fn transform(&self, transactions: &[Transaction]) -> Result<Vec<Transaction>, PipelineError> {
        let mut copy = transactions.to_vec();
        self.transform_inplace(&mut copy)?;
        Ok(copy)
    }
}
