use std::ops::{Deref, DerefMut};

use super::{Fixture, FixtureContext};
use crate::device::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, BufferBinding, BufferDescriptor, BufferId, BufferUsages,
    ComputePipelineDescriptor, ComputePipelineId, Kernel, PipelineLayoutDescriptor,
    ShaderModuleDescriptor, ShaderSource, ShaderStages,
};
use crate::CtsError;

/// The basic device fixture: a [`FixtureContext`] plus resource helpers.
#[derive(Debug)]
pub struct GpuTest {
    ctx: FixtureContext,
}

impl Fixture for GpuTest {
    fn init(ctx: FixtureContext) -> Result<Self, CtsError> {
        Ok(Self { ctx })
    }

    fn context(&mut self) -> &mut FixtureContext {
        &mut self.ctx
    }
}

impl Deref for GpuTest {
    type Target = FixtureContext;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl DerefMut for GpuTest {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctx
    }
}

impl GpuTest {
    /// Creates a tracked buffer initialised with `data` through the queue.
    ///
    /// `COPY_DST` is added to `usage` so the write is valid.
    pub fn create_buffer_with_data(&mut self, data: &[u8], usage: BufferUsages) -> BufferId {
        let buffer = self.create_buffer(&BufferDescriptor {
            label: None,
            size: data.len() as u64,
            usage: usage | BufferUsages::COPY_DST,
        });
        self.device().write_buffer(buffer, 0, data);
        buffer
    }

    /// Builds a compute pipeline for `kernel` whose single bind group holds
    /// one storage buffer per entry of `bindings`, at binding indices 0..n.
    pub fn create_storage_pipeline(
        &mut self,
        kernel: Kernel,
        bindings: &[BindingType],
    ) -> (ComputePipelineId, StorageLayout) {
        let device = self.device();
        let entries = bindings
            .iter()
            .enumerate()
            .map(|(binding, ty)| BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: ShaderStages::COMPUTE,
                ty: *ty,
            })
            .collect();
        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor { entries });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            bind_group_layouts: vec![layout],
        });
        let entry_point = kernel.entry_point.clone();
        let module = device.create_shader_module(&ShaderModuleDescriptor {
            label: None,
            source: ShaderSource::Kernel(kernel),
        });
        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            layout: pipeline_layout,
            module,
            entry_point,
        });
        (pipeline, StorageLayout(layout))
    }

    /// Binds whole buffers to consecutive binding indices of `layout`.
    pub fn create_storage_bind_group(&mut self, layout: StorageLayout, buffers: &[BufferId]) -> BindGroupId {
        let entries = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| BindGroupEntry {
                binding: binding as u32,
                resource: BufferBinding {
                    buffer: *buffer,
                    offset: 0,
                    size: None,
                },
            })
            .collect();
        self.device().create_bind_group(&BindGroupDescriptor {
            layout: layout.0,
            entries,
        })
    }
}

/// The bind group layout of a pipeline built by
/// [`GpuTest::create_storage_pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLayout(pub crate::device::BindGroupLayoutId);
