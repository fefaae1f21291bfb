//! User-facing output for the CLI.
//!
//! Case results go to stdout as one colored status line each; details of
//! non-passing cases and the final summary follow. Colors are decided once
//! by [`RunConfig`].

use std::io::Write;

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::engine::Outcome;
use crate::fixture::AssertionFailure;
use crate::report::{CaseRecord, Reporter, RunSummary};

/// Output configuration for a run.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub use_colors: bool,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stdout),
            verbose: false,
        }
    }
}

impl RunConfig {
    fn color_choice(&self) -> ColorChoice {
        if self.use_colors {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        }
    }
}

// ============================================================================
// CONSOLE REPORTER
// ============================================================================

/// Prints each case as it finishes.
pub struct ConsoleReporter {
    config: RunConfig,
    stdout: StandardStream,
    not_passed: Vec<String>,
}

impl ConsoleReporter {
    pub fn new(config: RunConfig) -> Self {
        Self {
            stdout: StandardStream::stdout(config.color_choice()),
            config,
            not_passed: Vec::new(),
        }
    }

    fn status(&mut self, label: &str, color: Color, record: &CaseRecord) {
        let _ = self
            .stdout
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(self.stdout, "{label}");
        let _ = self.stdout.reset();
        let _ = writeln!(
            self.stdout,
            " {} ({:.2}ms)",
            record.identity,
            record.duration.as_secs_f64() * 1000.0
        );
    }

    fn failure(&mut self, failure: &AssertionFailure) {
        let _ = writeln!(self.stdout, "  {}", failure.message);
        match (&failure.expected, &failure.actual) {
            (Some(expected), Some(actual)) if self.config.verbose => {
                let changeset = Changeset::new(expected, actual, "\n");
                print_diff(&mut self.stdout, &changeset.diffs);
            }
            (expected, actual) => {
                if let Some(expected) = expected {
                    let _ = writeln!(self.stdout, "    expected: {expected}");
                }
                if let Some(actual) = actual {
                    let _ = writeln!(self.stdout, "    actual:   {actual}");
                }
            }
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, record: &CaseRecord) {
        match &record.outcome {
            Outcome::Pass => self.status("PASS", Color::Green, record),
            Outcome::Fail { failures } => {
                self.status("FAIL", Color::Red, record);
                for failure in failures {
                    self.failure(failure);
                }
            }
            Outcome::Error { error } => {
                self.status("ERROR", Color::Yellow, record);
                let _ = writeln!(self.stdout, "  {error}");
            }
        }
        if !matches!(record.outcome, Outcome::Pass) {
            self.not_passed.push(record.query.clone());
            if self.config.verbose {
                for line in &record.diagnostics {
                    let _ = writeln!(self.stdout, "  note: {line}");
                }
            }
        }
    }

    fn finish(&mut self, summary: &RunSummary) {
        let _ = writeln!(
            self.stdout,
            "\n{} passed, {} failed, {} errored ({} total)",
            summary.passed,
            summary.failed,
            summary.errored,
            summary.total()
        );
        if !self.not_passed.is_empty() {
            eprintln!("\nNot passing:");
            for query in &self.not_passed {
                eprintln!("  {query}");
            }
        }
    }
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

/// Lines only in `expected` are `-` (red), lines only in `actual` are `+` (green).
fn print_diff(stdout: &mut StandardStream, diffs: &[Difference]) {
    let _ = writeln!(stdout, "    --- expected");
    let _ = writeln!(stdout, "    +++ actual");
    for (color, line) in diff_lines(diffs) {
        match color {
            Some(color) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)));
            }
            None => {
                let _ = stdout.reset();
            }
        }
        let _ = writeln!(stdout, "    {line}");
    }
    let _ = stdout.reset();
}

fn diff_lines(diffs: &[Difference]) -> Vec<(Option<Color>, String)> {
    diffs
        .iter()
        .map(|diff| match diff {
            Difference::Same(x) => (None, format!(" {x}")),
            Difference::Add(x) => (Some(Color::Green), format!("+{x}")),
            Difference::Rem(x) => (Some(Color::Red), format!("-{x}")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_marks_expected_red_and_actual_green() {
        let changeset = Changeset::new("a\nb", "a\nc", "\n");
        let lines = diff_lines(&changeset.diffs);
        assert_eq!(
            lines,
            [
                (None, " a".to_string()),
                (Some(Color::Red), "-b".to_string()),
                (Some(Color::Green), "+c".to_string()),
            ]
        );
    }
}
