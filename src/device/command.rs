use super::{
    BindGroupId, BufferCopyView, BufferId, CommandBufferId, ComputePipelineId, Device, Extent3d,
    TextureCopyView,
};

/// One recorded command. Recording never validates; [`Device::finish`] does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CopyBufferToBuffer {
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        source: BufferCopyView,
        destination: TextureCopyView,
        size: Extent3d,
    },
    CopyTextureToBuffer {
        source: TextureCopyView,
        destination: BufferCopyView,
        size: Extent3d,
    },
    BeginComputePass,
    SetPipeline(ComputePipelineId),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupId,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    EndComputePass,
}

/// Records commands for later validation and submission.
#[derive(Debug, Clone, Default)]
pub struct CommandEncoder {
    commands: Vec<Command>,
}

impl CommandEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::CopyBufferToBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        source: BufferCopyView,
        destination: TextureCopyView,
        size: Extent3d,
    ) {
        self.commands.push(Command::CopyBufferToTexture {
            source,
            destination,
            size,
        });
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        source: TextureCopyView,
        destination: BufferCopyView,
        size: Extent3d,
    ) {
        self.commands.push(Command::CopyTextureToBuffer {
            source,
            destination,
            size,
        });
    }

    pub fn begin_compute_pass(&mut self) -> ComputePass<'_> {
        self.commands.push(Command::BeginComputePass);
        ComputePass { encoder: self }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Hands the recorded commands to `device` for encode-time validation.
    pub fn finish(self, device: &dyn Device) -> CommandBufferId {
        device.finish(self.commands)
    }
}

/// A compute pass being recorded. Dropping the pass without calling
/// [`ComputePass::end`] leaves the pass open, which `finish` rejects.
pub struct ComputePass<'a> {
    encoder: &'a mut CommandEncoder,
}

impl ComputePass<'_> {
    pub fn set_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.encoder.commands.push(Command::SetPipeline(pipeline));
    }

    pub fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId) {
        self.encoder
            .commands
            .push(Command::SetBindGroup { index, bind_group });
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.encoder.commands.push(Command::Dispatch { x, y, z });
    }

    pub fn end(self) {
        self.encoder.commands.push(Command::EndComputePass);
    }
}
