use serde::Deserialize;
use std::collections::HashSet;
use tally_core::{Rule, RuleError, RuleSpec};
use thiserror::Error;

use crate::categorizer::Categorizer;
use crate::nullifier::{MatchPolicy, Nullifier, DEFAULT_WINDOW_DAYS, NULL_CATEGORY};
use crate::orchestrator::Pipeline;
use crate::tagger::Tagger;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error("Category '{0}' is defined more than once")]
    DuplicateCategory(String),
    #[error("Tag '{0}' is defined more than once")]
    DuplicateTag(String),
    #[error("Category 'null' is reserved for the nullifier")]
    ReservedCategory,
    #[error("Nullifier window must not be negative, got {0} days")]
    NegativeWindow(i64),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NullifierConfig {
    #[serde(default = "default_days")]
    pub days: i64,
    #[serde(default)]
    pub policy: MatchPolicy,
    #[serde(default)]
    pub filters: Vec<RuleSpec>,
}

fn default_days() -> i64 {
    DEFAULT_WINDOW_DAYS
}

impl Default for NullifierConfig {
    fn default() -> Self {
        Self {
            days: DEFAULT_WINDOW_DAYS,
            policy: MatchPolicy::default(),
            filters: Vec::new(),
        }
    }
}

/// A category or tag with its rules, in evaluation order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelConfig {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub nullifier: NullifierConfig,
    #[serde(default)]
    pub categories: Vec<LabelConfig>,
    #[serde(default)]
    pub tags: Vec<LabelConfig>,
}

impl PipelineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// Validates the configuration and compiles every rule.
    pub fn build(&self) -> Result<Pipeline, ConfigError> {
        if self.nullifier.days < 0 {
            return Err(ConfigError::NegativeWindow(self.nullifier.days));
        }
        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.name == NULL_CATEGORY {
                return Err(ConfigError::ReservedCategory);
            }
            if !seen.insert(category.name.as_str()) {
                return Err(ConfigError::DuplicateCategory(category.name.clone()));
            }
        }
        let mut seen = HashSet::new();
        for tag in &self.tags {
            if !seen.insert(tag.name.as_str()) {
                return Err(ConfigError::DuplicateTag(tag.name.clone()));
            }
        }

        let filters = self
            .nullifier
            .filters
            .iter()
            .map(|spec| Rule::new(NULL_CATEGORY, spec.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pipeline::new(
            Nullifier::new(self.nullifier.days, filters, self.nullifier.policy),
            Categorizer::new(compile(&self.categories)?),
            Tagger::new(compile(&self.tags)?),
            self.category_names(),
        ))
    }
}

fn compile(labels: &[LabelConfig]) -> Result<Vec<Rule>, RuleError> {
    labels
        .iter()
        .flat_map(|label| {
            label
                .rules
                .iter()
                .map(move |spec| Rule::new(label.name.clone(), spec.clone()))
        })
        .collect()
}
