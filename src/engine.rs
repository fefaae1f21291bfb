//! Case execution.
//!
//! # Lifecycle
//!
//! A case moves through `Created → Running → {Passed, Failed, Errored}`:
//!
//! 1. **Created**: a fixture is built around a fresh device.
//! 2. **Running**: the body runs; panics are caught. Deferred expectations
//!    are then flushed so every validation check resolves before the
//!    outcome is decided.
//! 3. **Teardown** always runs once the body has finished, whatever its
//!    result: the fixture's own hook, then release of tracked resources,
//!    collection of uncaptured device errors and the error-scope balance
//!    check.
//!
//! # Classification
//!
//! A body error (including a collaborator timeout or a panic) wins over
//! recorded failures, which win over a teardown error. Failures recorded
//! before a body error are kept in the diagnostics. A teardown error only
//! changes the outcome of an otherwise passing case; otherwise it is kept in
//! the diagnostics.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use futures_lite::FutureExt;
use serde::Serialize;
use tracing::{debug, info_span, warn};

use crate::device::{Device, DeviceProvider, LocalBoxFuture};
use crate::fixture::{AssertionFailure, Fixture, FixtureContext};
use crate::params::{ExpansionFailure, ParamBinding};
use crate::query::CaseQuery;
use crate::registry::{CaseEntry, Suite, TestCase};
use crate::report::{CaseRecord, Reporter, RunSummary};
use crate::CtsError;

// ============================================================================
// OUTCOMES
// ============================================================================

/// Lifecycle states of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Created,
    Running,
    Passed,
    Failed,
    Errored,
}

/// Why a case errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseErrorKind {
    /// Device acquisition or fixture construction failed.
    Setup,
    /// The parameter expansion failed for this branch.
    Expansion,
    /// The body returned an error.
    Body,
    Panic,
    /// The device collaborator gave up on a suspension point.
    Timeout,
    Teardown,
}

impl fmt::Display for CaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaseErrorKind::Setup => "setup",
            CaseErrorKind::Expansion => "expansion",
            CaseErrorKind::Body => "body",
            CaseErrorKind::Panic => "panic",
            CaseErrorKind::Timeout => "timeout",
            CaseErrorKind::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseError {
    pub kind: CaseErrorKind,
    pub message: String,
}

impl CaseError {
    pub fn new(kind: CaseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies an error returned by a body or by the expectation queue.
    pub fn from_body(error: &CtsError) -> Self {
        let kind = if error.is_timeout() {
            CaseErrorKind::Timeout
        } else {
            CaseErrorKind::Body
        };
        Self::new(kind, error.to_string())
    }

    pub fn from_expansion(failure: &ExpansionFailure) -> Self {
        Self::new(CaseErrorKind::Expansion, failure.to_string())
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(CaseErrorKind::Panic, format!("test body panicked: {message}"))
    }
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail { failures: Vec<AssertionFailure> },
    Error { error: CaseError },
}

impl Outcome {
    pub fn state(&self) -> CaseState {
        match self {
            Outcome::Pass => CaseState::Passed,
            Outcome::Fail { .. } => CaseState::Failed,
            Outcome::Error { .. } => CaseState::Errored,
        }
    }
}

/// The outcome of one case plus anything worth showing alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub outcome: Outcome,
    pub diagnostics: Vec<String>,
}

impl CaseResult {
    pub fn errored(error: CaseError) -> Self {
        Self {
            outcome: Outcome::Error { error },
            diagnostics: Vec::new(),
        }
    }
}

// ============================================================================
// SINGLE CASE
// ============================================================================

/// Runs one (test, binding) pair to completion on `device`.
pub async fn execute_case<F: Fixture>(
    case: &TestCase<F>,
    params: &ParamBinding,
    device: Box<dyn Device>,
) -> CaseResult {
    let mut fixture = match F::init(FixtureContext::new(device)) {
        Ok(fixture) => fixture,
        Err(error) => {
            return CaseResult::errored(CaseError::new(CaseErrorKind::Setup, error.to_string()))
        }
    };
    debug!(state = ?CaseState::Running, "case started");

    let body = guarded(&mut fixture, |fixture| (case.body)(fixture, params)).await;
    let mut error = match body {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(CaseError::from_body(&error)),
        Err(payload) => Some(CaseError::from_panic(payload)),
    };
    if error.is_none() {
        if let Err(flush_error) = fixture.context().flush().await {
            error = Some(CaseError::from_body(&flush_error));
        }
    }

    let mut teardown_notes = Vec::new();
    let teardown_error = teardown(&mut fixture, &mut teardown_notes).await;
    let ctx = fixture.context();
    let failures = ctx.take_failures();
    let mut diagnostics = ctx.take_log();
    diagnostics.append(&mut teardown_notes);

    let outcome = match (error, teardown_error) {
        (Some(error), late) => {
            diagnostics.extend(failures.iter().map(|f| format!("assertion failed: {f}")));
            diagnostics.extend(late.map(|e| e.to_string()));
            Outcome::Error { error }
        }
        (None, late) if !failures.is_empty() => {
            diagnostics.extend(late.map(|e| e.to_string()));
            Outcome::Fail { failures }
        }
        (None, Some(error)) => Outcome::Error { error },
        (None, None) => Outcome::Pass,
    };
    debug!(state = ?outcome.state(), "case finished");
    CaseResult {
        outcome,
        diagnostics,
    }
}

/// Calls `start` and awaits the future it returns, catching a panic in
/// either step.
async fn guarded<'a, T: ?Sized>(
    target: &'a mut T,
    start: impl FnOnce(&'a mut T) -> LocalBoxFuture<'a, Result<(), CtsError>>,
) -> Result<Result<(), CtsError>, Box<dyn Any + Send>> {
    match panic::catch_unwind(AssertUnwindSafe(move || start(target))) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
        Err(payload) => Err(payload),
    }
}

/// Runs the fixture hook and the context teardown. Both always run; the
/// first error is returned and later ones go to `diagnostics`.
async fn teardown<F: Fixture>(fixture: &mut F, diagnostics: &mut Vec<String>) -> Option<CaseError> {
    let hook = match guarded(&mut *fixture, |fixture| fixture.teardown()).await {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(CaseError::new(CaseErrorKind::Teardown, error.to_string())),
        Err(payload) => {
            let panic = CaseError::from_panic(payload);
            Some(CaseError::new(CaseErrorKind::Teardown, panic.message))
        }
    };
    let finalize = fixture
        .context()
        .finalize()
        .err()
        .map(|error| CaseError::new(CaseErrorKind::Teardown, error.to_string()));

    match (hook, finalize) {
        (Some(hook), Some(finalize)) => {
            diagnostics.push(finalize.to_string());
            Some(hook)
        }
        (hook, finalize) => hook.or(finalize),
    }
}

// ============================================================================
// SUITE RUNS
// ============================================================================

/// Catalogue entries selected by `queries`; every entry when `queries` is empty.
pub fn select_cases(suite: &Suite, queries: &[CaseQuery]) -> Vec<CaseEntry> {
    suite
        .cases()
        .into_iter()
        .filter(|entry| queries.is_empty() || queries.iter().any(|q| q.matches(&entry.identity)))
        .collect()
}

/// Runs every selected case in catalogue order, one at a time, each on its
/// own device. Every case produces exactly one record.
pub fn run_suite(
    suite: &Suite,
    queries: &[CaseQuery],
    provider: &dyn DeviceProvider,
    reporter: &mut dyn Reporter,
) -> RunSummary {
    let mut summary = RunSummary::default();
    for entry in select_cases(suite, queries) {
        let span = info_span!("case", id = %entry.identity);
        let _enter = span.enter();
        let started = Instant::now();

        let result = match &entry.expansion_error {
            Some(failure) => CaseResult::errored(CaseError::from_expansion(failure)),
            None => match provider.acquire() {
                Ok(device) => pollster::block_on(suite.run_case(&entry, device)),
                Err(error) => CaseResult::errored(CaseError::new(
                    CaseErrorKind::Setup,
                    format!("could not acquire a device: {error}"),
                )),
            },
        };
        if let Outcome::Error { error } = &result.outcome {
            warn!(%error, "case errored");
        }

        let record = CaseRecord::new(entry.identity, result, started.elapsed());
        summary.record(&record.outcome);
        reporter.report(&record);
    }
    reporter.finish(&summary);
    summary
}
