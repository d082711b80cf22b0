pub mod money;
pub mod rule;
pub mod transaction;

pub use money::{normalize_amount, AmountError, Money};
pub use rule::{Rule, RuleError, RuleSpec};
pub use transaction::{
    normalize_whitespace, sort_chronologically, CategoryAssignment, Selector, Transaction,
};
