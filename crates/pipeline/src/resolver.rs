use std::collections::VecDeque;
use tally_core::Transaction;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Assign this category name.
    Category(String),
    /// Leave this transaction uncategorized and move on.
    Skip,
    /// End manual resolution; everything left stays for a future run.
    Stop,
}

/// Manual categorization capability injected into the orchestrator.
pub trait Resolver {
    fn resolve(&mut self, tx: &Transaction, categories: &[String]) -> Resolution;

    /// The previous answer for `tx` was rejected; `resolve` is called again.
    fn rejected(&mut self, _tx: &Transaction, _error: &PipelineError) {}
}

/// Non-interactive runs: stops at the first transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopResolver;

impl Resolver for StopResolver {
    fn resolve(&mut self, _tx: &Transaction, _categories: &[String]) -> Resolution {
        Resolution::Stop
    }
}

/// Replays a fixed list of answers, then stops. Records every rejection.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResolver {
    answers: VecDeque<Resolution>,
    pub asked: Vec<Transaction>,
    pub rejections: Vec<String>,
}

impl ScriptedResolver {
    pub fn new(answers: impl IntoIterator<Item = Resolution>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl Resolver for ScriptedResolver {
    fn resolve(&mut self, tx: &Transaction, _categories: &[String]) -> Resolution {
        self.asked.push(tx.clone());
        self.answers.pop_front().unwrap_or(Resolution::Stop)
    }

    fn rejected(&mut self, _tx: &Transaction, error: &PipelineError) {
        self.rejections.push(error.to_string());
    }
}
