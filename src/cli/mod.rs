//! The `cts` command-line runner.
//!
//! Thin layer over the library: builds the bundled suite, selects cases by
//! query and either lists them or runs them on a fresh [`SoftDevice`] each.
//!
//! Exit codes: `0` when everything selected passed (or was listed), `1` when
//! any case failed or errored, `2` on usage errors such as malformed queries.
//!
//! [`SoftDevice`]: crate::device::SoftDevice

use std::process;

use clap::Parser;
use miette::Report;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Command, CtsArgs};
use crate::cli::output::{ConsoleReporter, RunConfig};
use crate::device::SoftDeviceProvider;
use crate::engine::{run_suite, select_cases};
use crate::query::{CaseIdentity, CaseQuery};
use crate::report::RunSummary;
use crate::suites::webgpu_suite;
use crate::{err_help, err_msg, CtsError};

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = CtsArgs::parse();
    init_tracing(args.verbose);

    let config = RunConfig {
        use_colors: !args.no_color && RunConfig::default().use_colors,
        verbose: args.verbose,
    };

    let result = match args.command {
        Command::List { queries, json } => handle_list(&queries, json),
        Command::Run { queries } => handle_run(&queries, config).map(|summary| {
            if !summary.all_passed() {
                process::exit(1);
            }
        }),
    };

    if let Err(e) = result {
        eprintln!("{:?}", Report::new(e));
        process::exit(2);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "gpu_cts=debug" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parses every command-line query. No queries selects everything.
pub fn parse_queries(raw: &[String]) -> Result<Vec<CaseQuery>, CtsError> {
    let mut queries = Vec::new();
    for input in raw {
        queries.extend(CaseQuery::parse_all(input)?);
    }
    Ok(queries)
}

#[derive(Serialize)]
struct ListedEntry<'a> {
    query: String,
    #[serde(flatten)]
    identity: &'a CaseIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    expansion_error: Option<String>,
}

/// Handles the `list` subcommand.
fn handle_list(raw_queries: &[String], json: bool) -> Result<(), CtsError> {
    let suite = webgpu_suite()?;
    let queries = parse_queries(raw_queries)?;
    let entries = select_cases(&suite, &queries);

    if json {
        let listed: Vec<ListedEntry<'_>> = entries
            .iter()
            .map(|entry| ListedEntry {
                query: entry.identity.to_query(),
                identity: &entry.identity,
                expansion_error: entry.expansion_error.as_ref().map(|e| e.to_string()),
            })
            .collect();
        let text = serde_json::to_string_pretty(&listed)
            .map_err(|e| err_msg!(Internal, "could not serialize the listing: {}", e))?;
        println!("{text}");
    } else {
        for entry in &entries {
            println!("{}", entry.identity);
        }
    }
    Ok(())
}

/// Handles the `run` subcommand.
fn handle_run(raw_queries: &[String], config: RunConfig) -> Result<RunSummary, CtsError> {
    let suite = webgpu_suite()?;
    let queries = parse_queries(raw_queries)?;
    if !queries.is_empty() && select_cases(&suite, &queries).is_empty() {
        return Err(err_help!(
            Query,
            "use `cts list` to see the available cases",
            "no cases match {}",
            raw_queries.join(" ")
        ));
    }

    let mut reporter = ConsoleReporter::new(config);
    Ok(run_suite(
        &suite,
        &queries,
        &SoftDeviceProvider::default(),
        &mut reporter,
    ))
}
