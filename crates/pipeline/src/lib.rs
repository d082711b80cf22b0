//! Categorization pipeline: nullifier, rule categorizer, tagger and the
//! orchestrator that runs them over one batch of transactions.

pub mod categorizer;
pub mod config;
pub mod error;
pub mod nullifier;
pub mod orchestrator;
pub mod resolver;
pub mod tagger;
pub mod transform;

pub use categorizer::Categorizer;
pub use config::{ConfigError, LabelConfig, NullifierConfig, PipelineConfig};
pub use error::PipelineError;
pub use nullifier::{MatchPolicy, Nullifier, DEFAULT_WINDOW_DAYS, NULL_CATEGORY};
pub use orchestrator::{Pipeline, PipelineReport, RunError, Stage, TransactionStore};
pub use resolver::{Resolution, Resolver, ScriptedResolver, StopResolver};
pub use tagger::Tagger;
pub use transform::Transformer;
