//! Conformance-test harness for a graphics/compute device API.
//!
//! - [`params`]: parameter spaces and their expansion into bindings.
//! - [`query`]: case identities and the `?q=` query codec.
//! - [`registry`]: test groups and suites.
//! - [`fixture`]: per-case fixtures, assertions and validation-error capture.
//! - [`engine`]: running cases and classifying their outcomes.
//! - [`device`]: the device capability trait and the in-memory `SoftDevice`.
//! - [`suites`]: the bundled test catalogue.

pub use crate::diagnostics::{CtsError, ErrorType};

pub mod cli;
pub mod device;
pub mod diagnostics;
pub mod engine;
pub mod fixture;
pub mod params;
pub mod query;
pub mod registry;
pub mod report;
pub mod suites;

pub use crate::engine::{run_suite, CaseError, CaseErrorKind, CaseResult, Outcome};
pub use crate::fixture::{AssertionFailure, Fixture, FixtureContext, GpuTest};
pub use crate::params::{expand, ParamBinding, ParamSpec};
pub use crate::query::{CaseIdentity, CaseQuery};
pub use crate::registry::{Suite, TestGroup};
