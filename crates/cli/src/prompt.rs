use std::io::{self, BufRead, Write};
use tally_core::Transaction;
use tally_pipeline::{PipelineError, Resolution, Resolver};

/// Asks for a category on a line-oriented terminal. An empty answer skips
/// the transaction; `stop`, `quit` or end of input ends the loop.
pub struct PromptResolver<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptResolver<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, tx: &Transaction, categories: &[String]) -> io::Result<Option<String>> {
        writeln!(self.output, "\n{tx}")?;
        write!(
            self.output,
            "Category ({}) [enter to skip, 'stop' to quit]: ",
            categories.join(", ")
        )?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> Resolver for PromptResolver<R, W> {
    fn resolve(&mut self, tx: &Transaction, categories: &[String]) -> Resolution {
        match self.ask(tx, categories) {
            Ok(Some(answer)) if answer.is_empty() => Resolution::Skip,
            Ok(Some(answer))
                if answer.eq_ignore_ascii_case("stop") || answer.eq_ignore_ascii_case("quit") =>
            {
                Resolution::Stop
            }
            Ok(Some(answer)) => Resolution::Category(answer),
            Ok(None) => Resolution::Stop,
            Err(e) => {
                tracing::warn!("Prompt failed, stopping manual resolution: {e}");
                Resolution::Stop
            }
        }
    }

    fn rejected(&mut self, _tx: &Transaction, error: &PipelineError) {
        let _ = writeln!(self.output, "{error}, try again");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;
    use tally_core::Money;

    fn tx() -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "ATM",
            "Bank#1",
            Money::parse("-40").unwrap(),
        )
    }

    fn answers(input: &str) -> Vec<Resolution> {
        let mut out = Vec::new();
        let mut resolver = PromptResolver::new(Cursor::new(input.as_bytes().to_vec()), &mut out);
        let categories = vec!["cash".to_string()];
        let mut seen = Vec::new();
        loop {
            let r = resolver.resolve(&tx(), &categories);
            let stop = r == Resolution::Stop;
            seen.push(r);
            if stop {
                break;
            }
        }
        seen
    }

    #[test]
    fn maps_answers() {
        assert_eq!(
            answers("cash\n\n  cash  \nQUIT\nignored\n"),
            vec![
                Resolution::Category("cash".to_string()),
                Resolution::Skip,
                Resolution::Category("cash".to_string()),
                Resolution::Stop,
            ]
        );
    }

    #[test]
    fn end_of_input_stops() {
        assert_eq!(answers(""), vec![Resolution::Stop]);
        assert_eq!(answers("stop"), vec![Resolution::Stop]);
    }

    #[test]
    fn prompt_shows_transaction_and_choices() {
        let mut out = Vec::new();
        {
            let mut resolver = PromptResolver::new(Cursor::new(b"x\n".to_vec()), &mut out);
            resolver.resolve(&tx(), &["cash".to_string(), "null".to_string()]);
            resolver.rejected(&tx(), &PipelineError::UnknownCategory { name: "x".to_string() });
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2024-01-01 | ATM | Bank#1 | -40"));
        assert!(text.contains("Category (cash, null)"));
        assert!(text.contains("Unknown category 'x', try again"));
    }
}
