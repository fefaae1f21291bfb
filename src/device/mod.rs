//! The device-under-test capability surface.
//!
//! The harness core depends only on the [`Device`] trait defined here. A
//! device exposes resource creation, command encoding (through
//! [`CommandEncoder`] and [`Device::finish`]), a work-submission queue, an
//! error-scope mechanism and asynchronous read-back.
//!
//! Validation failures follow the error-scope model: operations never return
//! validation errors directly. Instead the innermost matching scope pushed
//! with [`Device::push_error_scope`] captures the first error, and
//! [`Device::pop_error_scope`] resolves to it. Errors raised with no scope
//! open are *uncaptured* and can be drained with
//! [`Device::take_uncaptured_errors`].
//!
//! Failures of the collaborator itself (lost device, a suspension point that
//! never resolves) are [`DeviceError`]s carried by the futures the device
//! returns.

use std::future::Future;
use std::pin::Pin;

use bitflags::bitflags;
use thiserror::Error;

mod command;
mod format;
pub mod soft;

pub use command::{Command, CommandEncoder, ComputePass};
pub use format::{required_bytes_in_copy, FormatInfo, TextureFormat};
pub use soft::{Limits, SoftDevice, SoftDeviceProvider};

/// A boxed, non-`Send` future. Every suspension point a device exposes has this shape.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

// ============================================================================
// RESOURCE HANDLES
// ============================================================================

macro_rules! resource_ids {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )+
    };
}

resource_ids! {
    /// Handle to a buffer.
    BufferId,
    /// Handle to a texture.
    TextureId,
    BindGroupLayoutId,
    BindGroupId,
    PipelineLayoutId,
    ShaderModuleId,
    ComputePipelineId,
    /// Handle to a finished command buffer; valid for one submission.
    CommandBufferId,
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

bitflags! {
    /// Buffer usage flags. Values follow the WebGPU constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsages: u32 {
        const MAP_READ = 0x0001;
        const MAP_WRITE = 0x0002;
        const COPY_SRC = 0x0004;
        const COPY_DST = 0x0008;
        const INDEX = 0x0010;
        const VERTEX = 0x0020;
        const UNIFORM = 0x0040;
        const STORAGE = 0x0080;
    }
}

bitflags! {
    /// Texture usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsages: u32 {
        const COPY_SRC = 0x01;
        const COPY_DST = 0x02;
        const SAMPLED = 0x04;
        const STORAGE = 0x08;
        const OUTPUT_ATTACHMENT = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 0x1;
        const FRAGMENT = 0x2;
        const COMPUTE = 0x4;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3d {
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Origin3d {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub size: Extent3d,
    pub format: TextureFormat,
    pub usage: TextureUsages,
}

/// Where a texture copy reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopyView {
    pub texture: TextureId,
    pub origin: Origin3d,
}

/// Layout of linear texel data in a buffer or in host memory.
///
/// A `rows_per_image` of zero means "tightly packed": the copy height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureDataLayout {
    pub offset: u64,
    pub bytes_per_row: u32,
    pub rows_per_image: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopyView {
    pub buffer: BufferId,
    pub layout: TextureDataLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    StorageBuffer,
    ReadonlyStorageBuffer,
    UniformBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStages,
    pub ty: BindingType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindGroupLayoutDescriptor {
    pub entries: Vec<BindGroupLayoutEntry>,
}

/// A buffer range bound to a slot. `size: None` binds the rest of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BufferBinding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupDescriptor {
    pub layout: BindGroupLayoutId,
    pub entries: Vec<BindGroupEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineLayoutDescriptor {
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
}

/// Addresses one 32-bit word of a bound buffer: `group`/`binding` select the
/// binding, `index` the word within the bound range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordRef {
    pub group: u32,
    pub binding: u32,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelOp {
    /// `dst = src`, one word.
    CopyWord { src: WordRef, dst: WordRef },
    /// `dst = value`, one word.
    StoreWord { dst: WordRef, value: u32 },
}

/// A compute kernel in the minimal IR understood by reference devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    pub entry_point: String,
    pub ops: Vec<KernelOp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    Kernel(Kernel),
    Wgsl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderModuleDescriptor {
    pub label: Option<String>,
    pub source: ShaderSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePipelineDescriptor {
    pub layout: PipelineLayoutId,
    pub module: ShaderModuleId,
    pub entry_point: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorFilter {
    Validation,
    OutOfMemory,
}

// ============================================================================
// ERRORS
// ============================================================================

/// A validation error reported by the device, observed through an error scope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of the device collaborator itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device lost: {reason}")]
    Lost { reason: String },
    /// The collaborator's watchdog gave up on a suspension point.
    #[error("timed out waiting for {operation}")]
    Timeout { operation: String },
    #[error("pop_error_scope called with no open error scope")]
    ScopeUnderflow,
    #[error("buffer mapping failed: {reason}")]
    MapFailed { reason: String },
    #[error("no device available: {reason}")]
    Unavailable { reason: String },
}

// ============================================================================
// CAPABILITY TRAIT
// ============================================================================

/// The capability surface of one device under test.
///
/// Creation methods always return a handle. When validation fails the handle
/// refers to an invalid object and an error is raised into the current error
/// scope; using an invalid object later raises further errors.
pub trait Device {
    fn create_buffer(&self, desc: &BufferDescriptor) -> BufferId;
    fn create_texture(&self, desc: &TextureDescriptor) -> TextureId;
    fn create_bind_group_layout(&self, desc: &BindGroupLayoutDescriptor) -> BindGroupLayoutId;
    fn create_bind_group(&self, desc: &BindGroupDescriptor) -> BindGroupId;
    fn create_pipeline_layout(&self, desc: &PipelineLayoutDescriptor) -> PipelineLayoutId;
    fn create_shader_module(&self, desc: &ShaderModuleDescriptor) -> ShaderModuleId;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDescriptor) -> ComputePipelineId;

    fn destroy_buffer(&self, buffer: BufferId);
    fn destroy_texture(&self, texture: TextureId);

    /// Validates recorded commands (encode-time validation) and returns a command buffer.
    fn finish(&self, commands: Vec<Command>) -> CommandBufferId;

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]);
    fn write_texture(
        &self,
        destination: &TextureCopyView,
        data: &[u8],
        layout: &TextureDataLayout,
        size: Extent3d,
    );

    /// Submits command buffers to the queue (submit-time validation happens here).
    fn submit(&self, command_buffers: &[CommandBufferId]);

    /// Resolves once all work submitted so far has completed.
    fn on_submitted_work_done(&self) -> LocalBoxFuture<'static, Result<(), DeviceError>>;

    /// Maps a `MAP_READ` buffer range and returns a copy of its contents.
    fn read_buffer(
        &self,
        buffer: BufferId,
        offset: u64,
        size: u64,
    ) -> LocalBoxFuture<'static, Result<Vec<u8>, DeviceError>>;

    fn push_error_scope(&self, filter: ErrorFilter);
    fn pop_error_scope(&self) -> LocalBoxFuture<'static, Result<Option<ValidationError>, DeviceError>>;
    fn error_scope_depth(&self) -> usize;

    /// Drains validation errors that were raised with no error scope open.
    fn take_uncaptured_errors(&self) -> Vec<ValidationError>;
}

/// Hands out one device per case.
pub trait DeviceProvider {
    fn acquire(&self) -> Result<Box<dyn Device>, DeviceError>;
}

impl<F> DeviceProvider for F
where
    F: Fn() -> Result<Box<dyn Device>, DeviceError>,
{
    fn acquire(&self) -> Result<Box<dyn Device>, DeviceError> {
        self()
    }
}
