//! Per-case fixtures.
//!
//! Every case gets a fresh fixture built around a [`FixtureContext`], which
//! owns the device handle for that case and records everything the body
//! observes:
//!
//! - **Immediate assertions** (`expect`, `expect_eq`, `fail`) append an
//!   [`AssertionFailure`] right away.
//! - **Deferred expectations** are futures queued in FIFO order. Validation
//!   error checks are deferred because error scopes resolve asynchronously.
//!   [`FixtureContext::flush`] drains the queue, and every awaited helper
//!   flushes first so earlier expectations resolve before later ones.
//! - **Tracked resources** created through the context are destroyed at
//!   teardown, on every exit path.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;

use serde::Serialize;
use tracing::{debug, warn};

use crate::device::{
    BufferDescriptor, BufferId, BufferUsages, CommandBufferId, CommandEncoder, Device,
    ErrorFilter, LocalBoxFuture, TextureDescriptor, TextureId, ValidationError,
};
use crate::{err_help, err_msg, CtsError};

mod gpu;

pub use gpu::{GpuTest, StorageLayout};

/// A per-case fixture. Implementors wrap a [`FixtureContext`] (directly or
/// through another fixture) and may add state and helpers.
pub trait Fixture: Sized + 'static {
    fn init(ctx: FixtureContext) -> Result<Self, CtsError>;

    fn context(&mut self) -> &mut FixtureContext;

    /// Fixture-specific cleanup, run before tracked resources are released.
    fn teardown(&mut self) -> LocalBoxFuture<'_, Result<(), CtsError>> {
        Box::pin(async { Ok(()) })
    }
}

/// A recorded expectation mismatch. Classifies a case as failed, not errored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(expected) = &self.expected {
            write!(f, "\n  expected: {expected}")?;
        }
        if let Some(actual) = &self.actual {
            write!(f, "\n  actual:   {actual}")?;
        }
        Ok(())
    }
}

struct PendingExpectation {
    description: String,
    check: LocalBoxFuture<'static, Result<Option<AssertionFailure>, CtsError>>,
}

/// Device handle, assertion log and resource tracker for one case.
pub struct FixtureContext {
    device: Box<dyn Device>,
    failures: Vec<AssertionFailure>,
    pending: VecDeque<PendingExpectation>,
    buffers: Vec<BufferId>,
    textures: Vec<TextureId>,
    log: Vec<String>,
}

impl FixtureContext {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self {
            device,
            failures: Vec::new(),
            pending: VecDeque::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn device(&self) -> &dyn Device {
        &*self.device
    }

    // ------------------------------------------------------------------------
    // Immediate assertions
    // ------------------------------------------------------------------------

    /// Records a failure when `condition` is false. Returns `condition`.
    pub fn expect(&mut self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.fail(AssertionFailure::new(message));
        }
        condition
    }

    pub fn expect_eq<T>(&mut self, actual: T, expected: T, message: impl Into<String>) -> bool
    where
        T: PartialEq + fmt::Debug,
    {
        let equal = actual == expected;
        if !equal {
            self.fail(
                AssertionFailure::new(message)
                    .expected(format!("{expected:?}"))
                    .actual(format!("{actual:?}")),
            );
        }
        equal
    }

    pub fn fail(&mut self, failure: AssertionFailure) {
        debug!(%failure, "assertion failed");
        self.failures.push(failure);
    }

    /// Adds a line to the case diagnostics.
    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "case log");
        self.log.push(message);
    }

    // ------------------------------------------------------------------------
    // Deferred expectations
    // ------------------------------------------------------------------------

    /// Queues an expectation that resolves later. An `Ok(Some(_))` result is a
    /// failure, an `Err` makes the case error.
    pub fn defer<Fut>(&mut self, description: impl Into<String>, check: Fut)
    where
        Fut: Future<Output = Result<Option<AssertionFailure>, CtsError>> + 'static,
    {
        self.pending.push_back(PendingExpectation {
            description: description.into(),
            check: Box::pin(check),
        });
    }

    pub fn pending_expectations(&self) -> usize {
        self.pending.len()
    }

    /// Resolves queued expectations in the order they were queued.
    ///
    /// Stops at the first collaborator error; expectations behind it stay
    /// queued and are abandoned at teardown.
    pub async fn flush(&mut self) -> Result<(), CtsError> {
        while let Some(expectation) = self.pending.pop_front() {
            if let Some(mut failure) = expectation.check.await? {
                failure.message = format!("{}: {}", expectation.description, failure.message);
                self.fail(failure);
            }
        }
        Ok(())
    }

    /// Runs `f` inside a validation error scope and queues a check that an
    /// error was (or was not) raised while it ran.
    pub fn expect_validation_error<R>(
        &mut self,
        should_error: bool,
        f: impl FnOnce(&dyn Device) -> R,
    ) -> R {
        self.device.push_error_scope(ErrorFilter::Validation);
        let result = f(&*self.device);
        let scope = self.device.pop_error_scope();
        self.defer("encode-time validation", async move {
            Ok::<_, CtsError>(judge(should_error, scope.await?))
        });
        result
    }

    /// Submits `command_buffers` inside a validation error scope. The error
    /// is judged once the submitted work has completed.
    pub fn expect_submit_validation_error(
        &mut self,
        should_error: bool,
        command_buffers: &[CommandBufferId],
    ) {
        self.device.push_error_scope(ErrorFilter::Validation);
        self.device.submit(command_buffers);
        let done = self.device.on_submitted_work_done();
        let scope = self.device.pop_error_scope();
        self.defer("submit-time validation", async move {
            done.await?;
            Ok::<_, CtsError>(judge(should_error, scope.await?))
        });
    }

    /// Copies `buffer` back and compares its first `expected.len()` bytes.
    ///
    /// The buffer needs `COPY_SRC`. A mismatch is recorded as a failure that
    /// names the first differing byte offset.
    pub async fn expect_contents(&mut self, buffer: BufferId, expected: &[u8]) -> Result<(), CtsError> {
        self.flush().await?;
        let size = align_to(expected.len() as u64, 4);
        let staging = self.create_buffer(&BufferDescriptor {
            label: Some("readback".to_string()),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        });
        let mut encoder = CommandEncoder::new();
        encoder.copy_buffer_to_buffer(buffer, 0, staging, 0, size);

        self.device.push_error_scope(ErrorFilter::Validation);
        let commands = encoder.finish(&*self.device);
        self.device.submit(&[commands]);
        let done = self.device.on_submitted_work_done();
        let scope = self.device.pop_error_scope();
        done.await?;
        if let Some(error) = scope.await? {
            return Err(err_help!(
                Test,
                "the source buffer needs COPY_SRC usage and at least as many bytes as expected",
                "could not read back buffer {:?}: {}",
                buffer,
                error
            ));
        }

        let actual = self.device.read_buffer(staging, 0, size).await?;
        self.release_buffer(staging);
        let actual = &actual[..expected.len()];
        if let Some(offset) = first_mismatch(expected, actual) {
            self.fail(
                AssertionFailure::new(format!(
                    "contents of buffer {buffer:?} differ at byte offset {offset}"
                ))
                .expected(hex(expected))
                .actual(hex(actual)),
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Tracked resources
    // ------------------------------------------------------------------------

    /// Creates a buffer that is destroyed at teardown.
    pub fn create_buffer(&mut self, desc: &BufferDescriptor) -> BufferId {
        let buffer = self.device.create_buffer(desc);
        self.buffers.push(buffer);
        buffer
    }

    /// Creates a texture that is destroyed at teardown.
    pub fn create_texture(&mut self, desc: &TextureDescriptor) -> TextureId {
        let texture = self.device.create_texture(desc);
        self.textures.push(texture);
        texture
    }

    /// Destroys a tracked buffer early.
    pub fn release_buffer(&mut self, buffer: BufferId) {
        self.buffers.retain(|b| *b != buffer);
        self.device.destroy_buffer(buffer);
    }

    pub fn tracked_resources(&self) -> usize {
        self.buffers.len() + self.textures.len()
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Collects uncaptured device errors, releases tracked resources and
    /// checks that every error scope was closed.
    pub fn finalize(&mut self) -> Result<(), CtsError> {
        if !self.pending.is_empty() {
            let abandoned = self.pending.len();
            self.pending.clear();
            self.log(format!("{abandoned} deferred expectation(s) abandoned"));
        }
        for error in self.device.take_uncaptured_errors() {
            self.fail(uncaptured(error));
        }
        self.release_all();

        let depth = self.device.error_scope_depth();
        if depth > 0 {
            for _ in 0..depth {
                drop(self.device.pop_error_scope());
            }
            return Err(err_msg!(
                Test,
                "{} error scope(s) were left open by the test",
                depth
            ));
        }
        Ok(())
    }

    pub fn take_failures(&mut self) -> Vec<AssertionFailure> {
        std::mem::take(&mut self.failures)
    }

    pub fn take_log(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log)
    }

    fn release_all(&mut self) {
        for buffer in self.buffers.drain(..) {
            self.device.destroy_buffer(buffer);
        }
        for texture in self.textures.drain(..) {
            self.device.destroy_texture(texture);
        }
    }
}

impl Drop for FixtureContext {
    fn drop(&mut self) {
        if self.tracked_resources() > 0 {
            warn!(
                resources = self.tracked_resources(),
                "fixture dropped before teardown"
            );
            self.release_all();
        }
    }
}

impl fmt::Debug for FixtureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureContext")
            .field("failures", &self.failures)
            .field("pending", &self.pending.len())
            .field("buffers", &self.buffers)
            .field("textures", &self.textures)
            .finish_non_exhaustive()
    }
}

fn judge(should_error: bool, observed: Option<ValidationError>) -> Option<AssertionFailure> {
    match (should_error, observed) {
        (true, None) => Some(
            AssertionFailure::new("expected a validation error")
                .expected("validation error")
                .actual("no error"),
        ),
        (false, Some(error)) => Some(
            AssertionFailure::new("unexpected validation error")
                .expected("no error")
                .actual(error.message),
        ),
        _ => None,
    }
}

fn uncaptured(error: ValidationError) -> AssertionFailure {
    AssertionFailure::new("uncaptured validation error").actual(error.message)
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected.iter().zip(actual).position(|(e, a)| e != a)
}

/// Hex dump, 16 bytes per line.
fn hex(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|row| {
            row.iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
