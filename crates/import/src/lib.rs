pub mod export;
pub mod hooks;
pub mod profile;
pub mod statement;

pub use export::{read_transactions, write_transactions, ExportError};
pub use hooks::PostProcess;
pub use profile::{AmountLayout, DirectionColumn, InstitutionProfile, Institutions};
pub use statement::{ParseError, StatementParser};

use tally_core::Transaction;

/// Looks up `institution` and parses `data` with it. The bank identifier
/// defaults to the institution name.
pub fn parse_statement(
    institutions: &Institutions,
    institution: &str,
    bank: Option<&str>,
    data: &[u8],
) -> Result<Vec<Transaction>, ParseError> {
    let profile = institutions.get(institution)?;
    let bank = bank.unwrap_or(&profile.name);
    StatementParser::new(profile, bank).parse_bytes(data)
}
