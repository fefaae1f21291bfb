//! The outcome reporting boundary.
//!
//! The engine hands one [`CaseRecord`] per case to a [`Reporter`]. The CLI
//! prints them; tests collect them with [`CollectingReporter`].

use std::time::Duration;

use serde::Serialize;

use crate::engine::{CaseResult, Outcome};
use crate::query::CaseIdentity;

/// Everything known about one finished case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseRecord {
    pub identity: CaseIdentity,
    /// The `?q=` string that selects exactly this case.
    pub query: String,
    pub outcome: Outcome,
    pub diagnostics: Vec<String>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl CaseRecord {
    pub fn new(identity: CaseIdentity, result: CaseResult, duration: Duration) -> Self {
        Self {
            query: identity.to_query(),
            identity,
            outcome: result.outcome,
            diagnostics: result.diagnostics,
            duration,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Counts of each terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::Fail { .. } => self.failed += 1,
            Outcome::Error { .. } => self.errored += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// Receives case records as they complete.
pub trait Reporter {
    fn report(&mut self, record: &CaseRecord);

    fn finish(&mut self, _summary: &RunSummary) {}
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub records: Vec<CaseRecord>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for the case with raw identity `raw`, if it ran.
    pub fn find(&self, raw: &str) -> Option<&CaseRecord> {
        self.records.iter().find(|r| r.identity.to_string() == raw)
    }
}

impl Reporter for CollectingReporter {
    fn report(&mut self, record: &CaseRecord) {
        self.records.push(record.clone());
    }
}
