//! Command-line arguments for the `cts` runner.

use clap::{Parser, Subcommand};

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "cts",
    version,
    about = "Lists and runs conformance test cases against the reference device."
)]
pub struct CtsArgs {
    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Print diagnostics and byte diffs for every non-passing case.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the cases selected by the queries (all cases when none are given).
    List {
        /// `suite[:path[:test[:params]]]` or a `?q=...` query string.
        queries: Vec<String>,

        /// Emit the listing as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run the cases selected by the queries.
    Run {
        /// `suite[:path[:test[:params]]]` or a `?q=...` query string.
        queries: Vec<String>,
    },
}
