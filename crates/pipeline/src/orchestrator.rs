use std::fmt;
use std::future::Future;
use tally_core::{Selector, Transaction};
use thiserror::Error;
use tracing::{info, warn};

use crate::categorizer::Categorizer;
use crate::error::PipelineError;
use crate::nullifier::{Nullifier, NULL_CATEGORY};
use crate::resolver::{Resolution, Resolver};
use crate::tagger::Tagger;
use crate::transform::Transformer;

/// Where a batch stands in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetched,
    Nullified,
    RuleCategorized,
    Tagged,
    Resolved,
    AwaitingManual,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetched => write!(f, "fetched"),
            Stage::Nullified => write!(f, "nullified"),
            Stage::RuleCategorized => write!(f, "rule_categorized"),
            Stage::Tagged => write!(f, "tagged"),
            Stage::Resolved => write!(f, "resolved"),
            Stage::AwaitingManual => write!(f, "awaiting_manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub stage: Stage,
    pub total: usize,
    pub nullified: usize,
    pub rule_categorized: usize,
    pub manual: usize,
    pub unresolved: usize,
    /// The resolver ended the manual step early.
    pub stopped: bool,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transactions: {} nullified, {} by rules, {} manual, {} unresolved ({})",
            self.total, self.nullified, self.rule_categorized, self.manual, self.unresolved, self.stage
        )
    }
}

/// Storage collaborator seen from the pipeline: one fetch and one commit per
/// batch.
pub trait TransactionStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_uncategorized(&self) -> impl Future<Output = Result<Vec<Transaction>, Self::Error>>;

    fn commit(&self, transactions: &[Transaction]) -> impl Future<Output = Result<(), Self::Error>>;
}

#[derive(Debug, Error)]
pub enum RunError<E: std::error::Error + 'static> {
    #[error("Storage error: {0}")]
    Store(#[source] E),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Runs nullifier, categorizer, tagger and manual resolution, in that
/// order, over one batch.
#[derive(Debug, Clone)]
pub struct Pipeline {
    nullifier: Nullifier,
    categorizer: Categorizer,
    tagger: Tagger,
    categories: Vec<String>,
}

impl Pipeline {
    /// `categories` is the set accepted during manual resolution; the null
    /// category is always accepted.
    pub fn new(
        nullifier: Nullifier,
        categorizer: Categorizer,
        tagger: Tagger,
        categories: Vec<String>,
    ) -> Self {
        let mut categories = categories;
        if !categories.iter().any(|c| c == NULL_CATEGORY) {
            categories.push(NULL_CATEGORY.to_string());
        }
        Self {
            nullifier,
            categorizer,
            tagger,
            categories,
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Fetches the uncategorized batch, processes it and commits it back.
    /// Nothing is committed when a stage fails.
    pub async fn run<S, R>(&self, store: &S, resolver: &mut R) -> Result<PipelineReport, RunError<S::Error>>
    where
        S: TransactionStore,
        R: Resolver + ?Sized,
    {
        let mut batch = store.fetch_uncategorized().await.map_err(RunError::Store)?;
        let report = self.process(&mut batch, resolver)?;
        store.commit(&batch).await.map_err(RunError::Store)?;
        Ok(report)
    }

    pub fn process<R: Resolver + ?Sized>(
        &self,
        batch: &mut [Transaction],
        resolver: &mut R,
    ) -> Result<PipelineReport, PipelineError> {
        info!(stage = %Stage::Fetched, count = batch.len());

        self.nullifier.transform_inplace(batch)?;
        info!(stage = %Stage::Nullified);

        self.categorizer.transform_inplace(batch)?;
        info!(stage = %Stage::RuleCategorized);

        self.tagger.transform_inplace(batch)?;
        info!(stage = %Stage::Tagged);

        let stopped = self.resolve_manually(batch, resolver);

        let count = |selector: Selector| batch.iter().filter(|t| t.selector() == Some(selector)).count();
        let unresolved = batch.iter().filter(|t| !t.is_categorized()).count();
        let stage = if unresolved == 0 {
            Stage::Resolved
        } else {
            Stage::AwaitingManual
        };

        let report = PipelineReport {
            stage,
            total: batch.len(),
            nullified: count(Selector::Nullifier),
            rule_categorized: count(Selector::Rules),
            manual: count(Selector::Manual),
            unresolved,
            stopped,
        };
        info!(stage = %stage, unresolved, "pipeline finished");
        Ok(report)
    }

    /// Returns true if the resolver stopped early.
    fn resolve_manually<R: Resolver + ?Sized>(&self, batch: &mut [Transaction], resolver: &mut R) -> bool {
        for tx in batch.iter_mut().filter(|t| !t.is_categorized()) {
            loop {
                match resolver.resolve(tx, &self.categories) {
                    Resolution::Category(name) => {
                        let name = name.trim();
                        if self.categories.iter().any(|c| c == name) {
                            tx.assign(name, Selector::Manual);
                            break;
                        }
                        let error = PipelineError::UnknownCategory {
                            name: name.to_string(),
                        };
                        warn!(%error, "manual category rejected");
                        resolver.rejected(tx, &error);
                    }
                    Resolution::Skip => break,
                    Resolution::Stop => return true,
                }
            }
        }
        false
    }
}
