//! `SoftDevice`: a deterministic in-memory device.
//!
//! Buffers and textures are byte vectors; compute pipelines run the word
//! [`Kernel`] IR. Validation is split between two points:
//!
//! - **encode time** ([`Device::finish`]): usage flags, copy alignment,
//!   texture-copy layout rules, compute pass structure;
//! - **submit time** ([`Device::submit`]): buffer ranges against current
//!   buffer sizes, destroyed resources, resubmission.
//!
//! `write_buffer`/`write_texture` validate immediately. All submitted work
//! executes synchronously inside `submit`, so completion futures are ready
//! unless the queue has been stalled with [`SoftDevice::set_stalled`], in
//! which case they resolve to [`DeviceError::Timeout`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures_lite::future;
use tracing::trace;

use super::{
    required_bytes_in_copy, BindGroupDescriptor, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindGroupLayoutId, BindingType, BufferCopyView, BufferDescriptor,
    BufferId, BufferUsages, Command, CommandBufferId, ComputePipelineDescriptor,
    ComputePipelineId, Device, DeviceError, DeviceProvider, ErrorFilter, Extent3d, Kernel,
    KernelOp, LocalBoxFuture, Origin3d, PipelineLayoutDescriptor, PipelineLayoutId,
    ShaderModuleDescriptor, ShaderModuleId, ShaderSource, TextureCopyView, TextureDataLayout,
    TextureDescriptor, TextureFormat, TextureId, TextureUsages, ValidationError, WordRef,
};

const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;
const BUFFER_BINDING_OFFSET_ALIGNMENT: u64 = 256;

/// Device limits enforced by [`SoftDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_buffer_size: u64,
    pub max_texture_dimension: u32,
    /// Upper bound on the storage of a single texture.
    pub max_texture_bytes: u64,
    pub max_bind_groups: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_buffer_size: 256 << 20,
            max_texture_dimension: 8192,
            max_texture_bytes: 256 << 20,
            max_bind_groups: 4,
        }
    }
}

// ============================================================================
// OBJECT STATE
// ============================================================================

// Every object table maps an id to `None` when creation failed validation.

struct BufferState {
    data: Vec<u8>,
    usage: BufferUsages,
    destroyed: bool,
}

struct TextureState {
    size: Extent3d,
    format: TextureFormat,
    usage: TextureUsages,
    data: Vec<u8>,
    destroyed: bool,
}

#[derive(Clone, Copy)]
struct ResolvedBinding {
    binding: u32,
    buffer: BufferId,
    offset: u64,
    size: u64,
}

struct BindGroupState {
    layout: Vec<BindGroupLayoutEntry>,
    bindings: Vec<ResolvedBinding>,
}

struct PipelineState {
    group_layouts: Vec<Vec<BindGroupLayoutEntry>>,
    ops: Vec<KernelOp>,
}

struct CommandBufferState {
    commands: Vec<Command>,
    submitted: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CopyDirection {
    IntoTexture,
    OutOfTexture,
}

#[derive(Default)]
struct State {
    next_id: u64,
    limits: Limits,
    buffers: HashMap<BufferId, Option<BufferState>>,
    textures: HashMap<TextureId, Option<TextureState>>,
    bind_group_layouts: HashMap<BindGroupLayoutId, Option<Vec<BindGroupLayoutEntry>>>,
    bind_groups: HashMap<BindGroupId, Option<BindGroupState>>,
    pipeline_layouts: HashMap<PipelineLayoutId, Option<Vec<Vec<BindGroupLayoutEntry>>>>,
    shader_modules: HashMap<ShaderModuleId, Option<Kernel>>,
    pipelines: HashMap<ComputePipelineId, Option<PipelineState>>,
    command_buffers: HashMap<CommandBufferId, Option<CommandBufferState>>,
    scopes: Vec<(ErrorFilter, Option<ValidationError>)>,
    uncaptured: Vec<ValidationError>,
    stalled: bool,
    submissions: usize,
}

fn lookup<'a, K, T>(map: &'a HashMap<K, Option<T>>, id: K, what: &str) -> Result<&'a T, String>
where
    K: std::hash::Hash + Eq + std::fmt::Debug,
{
    match map.get(&id) {
        Some(Some(object)) => Ok(object),
        Some(None) => Err(format!("{what} {id:?} is invalid")),
        None => Err(format!("unknown {what} {id:?}")),
    }
}

impl State {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Routes a validation error to the innermost validation scope, or to the
    /// uncaptured list. A scope keeps only its first error.
    fn raise(&mut self, message: String) {
        let error = ValidationError::new(message);
        trace!(%error, "soft device validation error");
        let scope = self
            .scopes
            .iter_mut()
            .rev()
            .find(|(filter, _)| *filter == ErrorFilter::Validation);
        match scope {
            Some((_, slot)) => {
                if slot.is_none() {
                    *slot = Some(error);
                }
            }
            None => self.uncaptured.push(error),
        }
    }

    fn buffer(&self, id: BufferId) -> Result<&BufferState, String> {
        lookup(&self.buffers, id, "buffer")
    }

    fn texture(&self, id: TextureId) -> Result<&TextureState, String> {
        lookup(&self.textures, id, "texture")
    }

    fn live_buffer(&self, id: BufferId) -> Result<&BufferState, String> {
        let buffer = self.buffer(id)?;
        if buffer.destroyed {
            return Err(format!("buffer {id:?} is destroyed"));
        }
        Ok(buffer)
    }

    fn live_texture(&self, id: TextureId) -> Result<&TextureState, String> {
        let texture = self.texture(id)?;
        if texture.destroyed {
            return Err(format!("texture {id:?} is destroyed"));
        }
        Ok(texture)
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    fn validate_buffer(&self, desc: &BufferDescriptor) -> Result<(), String> {
        if desc.usage.is_empty() {
            return Err("buffer usage must not be empty".to_string());
        }
        if desc.size > self.limits.max_buffer_size {
            return Err(format!(
                "buffer size {} exceeds the maximum of {}",
                desc.size, self.limits.max_buffer_size
            ));
        }
        if desc.usage.contains(BufferUsages::MAP_READ)
            && !(BufferUsages::MAP_READ | BufferUsages::COPY_DST).contains(desc.usage)
        {
            return Err("MAP_READ may only be combined with COPY_DST".to_string());
        }
        if desc.usage.contains(BufferUsages::MAP_WRITE)
            && !(BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC).contains(desc.usage)
        {
            return Err("MAP_WRITE may only be combined with COPY_SRC".to_string());
        }
        Ok(())
    }

    /// Returns the byte length of the texture's storage.
    fn validate_texture(&self, desc: &TextureDescriptor) -> Result<u64, String> {
        let size = desc.size;
        if size.is_empty() {
            return Err("texture size must not be empty".to_string());
        }
        let max = self.limits.max_texture_dimension;
        if size.width > max || size.height > max || size.depth > max {
            return Err(format!("texture dimension exceeds the maximum of {max}"));
        }
        if desc.usage.is_empty() {
            return Err("texture usage must not be empty".to_string());
        }
        let info = desc.format.info();
        if size.width % info.block_width != 0 || size.height % info.block_height != 0 {
            return Err(format!(
                "{} texture dimensions must be multiples of the block size",
                desc.format
            ));
        }
        let limit = self.limits.max_texture_bytes;
        let len = desc
            .format
            .bytes_in_complete_row(size.width)
            .checked_mul(u64::from(size.height / info.block_height))
            .and_then(|len| len.checked_mul(u64::from(size.depth)))
            .filter(|len| *len <= limit)
            .ok_or_else(|| {
                format!(
                    "{} texture of {}x{}x{} exceeds the storage limit of {limit} bytes",
                    desc.format, size.width, size.height, size.depth
                )
            })?;
        Ok(len)
    }

    fn validate_bind_group(&self, desc: &BindGroupDescriptor) -> Result<BindGroupState, String> {
        let layout = lookup(&self.bind_group_layouts, desc.layout, "bind group layout")?;
        if desc.entries.len() != layout.len() {
            return Err(format!(
                "bind group has {} entries but its layout declares {}",
                desc.entries.len(),
                layout.len()
            ));
        }
        let mut bindings: Vec<ResolvedBinding> = Vec::with_capacity(desc.entries.len());
        for entry in &desc.entries {
            let Some(slot) = layout.iter().find(|slot| slot.binding == entry.binding) else {
                return Err(format!("binding {} is not in the layout", entry.binding));
            };
            if bindings.iter().any(|b| b.binding == entry.binding) {
                return Err(format!("binding {} is set twice", entry.binding));
            }
            let resource = entry.resource;
            let buffer = self.buffer(resource.buffer)?;
            let required = match slot.ty {
                BindingType::StorageBuffer | BindingType::ReadonlyStorageBuffer => {
                    BufferUsages::STORAGE
                }
                BindingType::UniformBuffer => BufferUsages::UNIFORM,
            };
            if !buffer.usage.contains(required) {
                return Err(format!(
                    "buffer bound at {} lacks usage {required:?}",
                    entry.binding
                ));
            }
            if resource.offset % BUFFER_BINDING_OFFSET_ALIGNMENT != 0 {
                return Err(format!(
                    "binding offset {} is not a multiple of {BUFFER_BINDING_OFFSET_ALIGNMENT}",
                    resource.offset
                ));
            }
            let len = buffer.data.len() as u64;
            let size = resource
                .size
                .unwrap_or_else(|| len.saturating_sub(resource.offset));
            if size == 0 || resource.offset.checked_add(size).map_or(true, |end| end > len) {
                return Err(format!(
                    "binding range {}+{size} does not fit in a buffer of {len} bytes",
                    resource.offset
                ));
            }
            bindings.push(ResolvedBinding {
                binding: entry.binding,
                buffer: resource.buffer,
                offset: resource.offset,
                size,
            });
        }
        Ok(BindGroupState {
            layout: layout.clone(),
            bindings,
        })
    }

    fn validate_pipeline(&self, desc: &ComputePipelineDescriptor) -> Result<PipelineState, String> {
        let group_layouts = lookup(&self.pipeline_layouts, desc.layout, "pipeline layout")?;
        let kernel = lookup(&self.shader_modules, desc.module, "shader module")?;
        if kernel.entry_point != desc.entry_point {
            return Err(format!(
                "entry point '{}' does not exist in the shader module",
                desc.entry_point
            ));
        }
        let slot_type = |word: &WordRef| -> Result<BindingType, String> {
            group_layouts
                .get(word.group as usize)
                .and_then(|layout| layout.iter().find(|slot| slot.binding == word.binding))
                .map(|slot| slot.ty)
                .ok_or_else(|| {
                    format!(
                        "kernel uses group {} binding {} which the layout does not declare",
                        word.group, word.binding
                    )
                })
        };
        for op in &kernel.ops {
            let (source, destination) = match op {
                KernelOp::CopyWord { src, dst } => (Some(src), dst),
                KernelOp::StoreWord { dst, .. } => (None, dst),
            };
            if let Some(source) = source {
                slot_type(source)?;
            }
            if slot_type(destination)? != BindingType::StorageBuffer {
                return Err(format!(
                    "kernel writes to group {} binding {} which is not a writable storage buffer",
                    destination.group, destination.binding
                ));
            }
        }
        Ok(PipelineState {
            group_layouts: group_layouts.clone(),
            ops: kernel.ops.clone(),
        })
    }

    // ------------------------------------------------------------------------
    // Encode-time validation
    // ------------------------------------------------------------------------

    fn validate_texture_copy(
        &self,
        texture: &TextureState,
        origin: &Origin3d,
        size: Extent3d,
        direction: CopyDirection,
    ) -> Result<(), String> {
        let info = texture.format.info();
        match direction {
            CopyDirection::IntoTexture => {
                if !texture.usage.contains(TextureUsages::COPY_DST) {
                    return Err("destination texture lacks COPY_DST usage".to_string());
                }
                if !info.copy_dst {
                    return Err(format!("{} cannot be a copy destination", texture.format));
                }
            }
            CopyDirection::OutOfTexture => {
                if !texture.usage.contains(TextureUsages::COPY_SRC) {
                    return Err("source texture lacks COPY_SRC usage".to_string());
                }
                if !info.copy_src {
                    return Err(format!("{} cannot be a copy source", texture.format));
                }
            }
        }
        if origin.x % info.block_width != 0 || origin.y % info.block_height != 0 {
            return Err("copy origin must be aligned to the texel block".to_string());
        }
        if size.width % info.block_width != 0 || size.height % info.block_height != 0 {
            return Err("copy extent must be aligned to the texel block".to_string());
        }
        let fits = |start: u32, len: u32, limit: u32| u64::from(start) + u64::from(len) <= u64::from(limit);
        if !fits(origin.x, size.width, texture.size.width)
            || !fits(origin.y, size.height, texture.size.height)
            || !fits(origin.z, size.depth, texture.size.depth)
        {
            return Err("copy exceeds the texture extent".to_string());
        }
        Ok(())
    }

    fn validate_linear_layout(
        layout: &TextureDataLayout,
        format: TextureFormat,
        size: Extent3d,
        buffer_copy: bool,
    ) -> Result<(), String> {
        let info = format.info();
        if buffer_copy && layout.bytes_per_row % COPY_BYTES_PER_ROW_ALIGNMENT != 0 {
            return Err(format!(
                "bytes_per_row {} is not a multiple of {COPY_BYTES_PER_ROW_ALIGNMENT}",
                layout.bytes_per_row
            ));
        }
        if layout.offset % u64::from(info.bytes_per_block) != 0 {
            return Err(format!(
                "offset {} is not a multiple of the {}-byte texel block",
                layout.offset, info.bytes_per_block
            ));
        }
        if layout.rows_per_image % info.block_height != 0 {
            return Err(format!(
                "rows_per_image {} is not a multiple of the block height {}",
                layout.rows_per_image, info.block_height
            ));
        }
        if layout.rows_per_image != 0 && layout.rows_per_image < size.height {
            return Err(format!(
                "rows_per_image {} is smaller than the copy height {}",
                layout.rows_per_image, size.height
            ));
        }
        let block_rows = size.height / info.block_height;
        if (block_rows > 1 || size.depth > 1)
            && u64::from(layout.bytes_per_row) < format.bytes_in_complete_row(size.width)
        {
            return Err(format!(
                "bytes_per_row {} is too small for a copy {} texels wide",
                layout.bytes_per_row, size.width
            ));
        }
        Ok(())
    }

    fn validate_encoding(&self, commands: &[Command]) -> Result<(), String> {
        let mut in_pass = false;
        let mut pipeline: Option<&PipelineState> = None;
        let mut bound: HashMap<u32, &BindGroupState> = HashMap::new();

        for command in commands {
            match command {
                Command::CopyBufferToBuffer {
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                } => {
                    if in_pass {
                        return Err("copies are not allowed inside a compute pass".to_string());
                    }
                    if !self.buffer(*source)?.usage.contains(BufferUsages::COPY_SRC) {
                        return Err("copy source buffer lacks COPY_SRC usage".to_string());
                    }
                    if !self.buffer(*destination)?.usage.contains(BufferUsages::COPY_DST) {
                        return Err("copy destination buffer lacks COPY_DST usage".to_string());
                    }
                    if source == destination {
                        return Err("copy source and destination must differ".to_string());
                    }
                    if size % 4 != 0 || source_offset % 4 != 0 || destination_offset % 4 != 0 {
                        return Err("copy size and offsets must be multiples of 4".to_string());
                    }
                }
                Command::CopyBufferToTexture {
                    source,
                    destination,
                    size,
                } => {
                    if in_pass {
                        return Err("copies are not allowed inside a compute pass".to_string());
                    }
                    if !self.buffer(source.buffer)?.usage.contains(BufferUsages::COPY_SRC) {
                        return Err("copy source buffer lacks COPY_SRC usage".to_string());
                    }
                    let texture = self.texture(destination.texture)?;
                    self.validate_texture_copy(
                        texture,
                        &destination.origin,
                        *size,
                        CopyDirection::IntoTexture,
                    )?;
                    Self::validate_linear_layout(&source.layout, texture.format, *size, true)?;
                }
                Command::CopyTextureToBuffer {
                    source,
                    destination,
                    size,
                } => {
                    if in_pass {
                        return Err("copies are not allowed inside a compute pass".to_string());
                    }
                    if !self
                        .buffer(destination.buffer)?
                        .usage
                        .contains(BufferUsages::COPY_DST)
                    {
                        return Err("copy destination buffer lacks COPY_DST usage".to_string());
                    }
                    let texture = self.texture(source.texture)?;
                    self.validate_texture_copy(
                        texture,
                        &source.origin,
                        *size,
                        CopyDirection::OutOfTexture,
                    )?;
                    Self::validate_linear_layout(&destination.layout, texture.format, *size, true)?;
                }
                Command::BeginComputePass => {
                    if in_pass {
                        return Err("compute passes cannot be nested".to_string());
                    }
                    in_pass = true;
                    pipeline = None;
                    bound.clear();
                }
                Command::SetPipeline(id) => {
                    if !in_pass {
                        return Err("set_pipeline outside of a compute pass".to_string());
                    }
                    pipeline = Some(lookup(&self.pipelines, *id, "compute pipeline")?);
                }
                Command::SetBindGroup { index, bind_group } => {
                    if !in_pass {
                        return Err("set_bind_group outside of a compute pass".to_string());
                    }
                    if *index >= self.limits.max_bind_groups {
                        return Err(format!("bind group index {index} exceeds the limit"));
                    }
                    bound.insert(*index, lookup(&self.bind_groups, *bind_group, "bind group")?);
                }
                Command::Dispatch { .. } => {
                    if !in_pass {
                        return Err("dispatch outside of a compute pass".to_string());
                    }
                    let Some(pipeline) = pipeline else {
                        return Err("dispatch without a pipeline".to_string());
                    };
                    for (index, layout) in pipeline.group_layouts.iter().enumerate() {
                        let Some(group) = bound.get(&(index as u32)) else {
                            return Err(format!("bind group {index} is not set"));
                        };
                        if group.layout != *layout {
                            return Err(format!(
                                "bind group {index} is incompatible with the pipeline layout"
                            ));
                        }
                    }
                }
                Command::EndComputePass => {
                    if !in_pass {
                        return Err("end_pass without a matching begin".to_string());
                    }
                    in_pass = false;
                }
            }
        }
        if in_pass {
            return Err("compute pass was not ended".to_string());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Submit-time validation
    // ------------------------------------------------------------------------

    fn check_buffer_range(&self, id: BufferId, offset: u64, size: u64, role: &str) -> Result<(), String> {
        let len = self.live_buffer(id)?.data.len() as u64;
        match offset.checked_add(size) {
            Some(end) if end <= len => {}
            Some(end) => {
                return Err(format!(
                    "copy {role} range {offset}..{end} exceeds the buffer size {len}"
                ))
            }
            None => {
                return Err(format!(
                    "copy {role} range {offset}+{size} overflows the address space"
                ))
            }
        }
        Ok(())
    }

    fn check_linear_copy_fits(
        &self,
        view: &BufferCopyView,
        texture: TextureId,
        size: Extent3d,
    ) -> Result<(), String> {
        let format = self.live_texture(texture)?.format;
        let len = self.live_buffer(view.buffer)?.data.len() as u64;
        let needed = view
            .layout
            .offset
            .saturating_add(required_bytes_in_copy(&view.layout, format, size));
        if needed > len {
            return Err(format!(
                "buffer of {len} bytes is too small for the texture copy, {needed} bytes required"
            ));
        }
        Ok(())
    }

    fn validate_submission(&self, id: CommandBufferId) -> Result<(), String> {
        let command_buffer = lookup(&self.command_buffers, id, "command buffer")?;
        if command_buffer.submitted {
            return Err(format!("command buffer {id:?} was already submitted"));
        }
        for command in &command_buffer.commands {
            match command {
                Command::CopyBufferToBuffer {
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                } => {
                    self.check_buffer_range(*source, *source_offset, *size, "source")?;
                    self.check_buffer_range(*destination, *destination_offset, *size, "destination")?;
                }
                Command::CopyBufferToTexture {
                    source,
                    destination,
                    size,
                } => self.check_linear_copy_fits(source, destination.texture, *size)?,
                Command::CopyTextureToBuffer {
                    source,
                    destination,
                    size,
                } => self.check_linear_copy_fits(destination, source.texture, *size)?,
                Command::SetBindGroup { bind_group, .. } => {
                    let group = lookup(&self.bind_groups, *bind_group, "bind group")?;
                    for binding in &group.bindings {
                        self.live_buffer(binding.buffer)?;
                    }
                }
                Command::BeginComputePass
                | Command::SetPipeline(_)
                | Command::Dispatch { .. }
                | Command::EndComputePass => {}
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    fn buffer_data_mut(&mut self, id: BufferId) -> Option<&mut Vec<u8>> {
        match self.buffers.get_mut(&id) {
            Some(Some(buffer)) => Some(&mut buffer.data),
            _ => None,
        }
    }

    fn execute(&mut self, commands: &[Command]) {
        let mut pipeline: Option<ComputePipelineId> = None;
        let mut bound: HashMap<u32, BindGroupId> = HashMap::new();
        for command in commands {
            match command {
                Command::CopyBufferToBuffer {
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                } => {
                    let (start, len) = (*source_offset as usize, *size as usize);
                    let Some(end) = start.checked_add(len) else {
                        continue;
                    };
                    let bytes = match self.buffer(*source) {
                        Ok(buffer) => match buffer.data.get(start..end) {
                            Some(bytes) => bytes.to_vec(),
                            None => continue,
                        },
                        Err(_) => continue,
                    };
                    let at = *destination_offset as usize;
                    if let Some(slot) = self
                        .buffer_data_mut(*destination)
                        .and_then(|data| data.get_mut(at..at.checked_add(len)?))
                    {
                        slot.copy_from_slice(&bytes);
                    }
                }
                Command::CopyBufferToTexture {
                    source,
                    destination,
                    size,
                } => {
                    let bytes = match self.buffer(source.buffer) {
                        Ok(buffer) => buffer.data.clone(),
                        Err(_) => continue,
                    };
                    if let Some(Some(texture)) = self.textures.get_mut(&destination.texture) {
                        copy_into_texture(texture, &destination.origin, &source.layout, *size, &bytes);
                    }
                }
                Command::CopyTextureToBuffer {
                    source,
                    destination,
                    size,
                } => {
                    let rows = match self.texture(source.texture) {
                        Ok(texture) => copy_out_of_texture(texture, &source.origin, &destination.layout, *size),
                        Err(_) => continue,
                    };
                    if let Some(data) = self.buffer_data_mut(destination.buffer) {
                        for (at, row) in rows {
                            if let Some(slot) = data.get_mut(at..at + row.len()) {
                                slot.copy_from_slice(&row);
                            }
                        }
                    }
                }
                Command::BeginComputePass => {
                    pipeline = None;
                    bound.clear();
                }
                Command::SetPipeline(id) => pipeline = Some(*id),
                Command::SetBindGroup { index, bind_group } => {
                    bound.insert(*index, *bind_group);
                }
                Command::Dispatch { x, y, z } => {
                    // Kernels do not depend on the invocation id, so one run is enough.
                    if u64::from(*x) * u64::from(*y) * u64::from(*z) > 0 {
                        if let Some(pipeline) = pipeline {
                            self.run_kernel(pipeline, &bound);
                        }
                    }
                }
                Command::EndComputePass => {}
            }
        }
    }

    fn resolve_word(&self, word: &WordRef, bound: &HashMap<u32, BindGroupId>) -> Option<(BufferId, usize)> {
        let group = bound.get(&word.group)?;
        let Some(Some(group)) = self.bind_groups.get(group) else {
            return None;
        };
        let binding = group.bindings.iter().find(|b| b.binding == word.binding)?;
        let start = u64::from(word.index) * 4;
        // Out-of-range accesses are robust: loads yield zero, stores are dropped.
        if start + 4 > binding.size {
            return None;
        }
        let at = binding.offset.checked_add(start)?;
        Some((binding.buffer, usize::try_from(at).ok()?))
    }

    fn load_word(&self, word: &WordRef, bound: &HashMap<u32, BindGroupId>) -> u32 {
        self.resolve_word(word, bound)
            .and_then(|(buffer, at)| {
                let data = &self.buffer(buffer).ok()?.data;
                let bytes: [u8; 4] = data.get(at..at + 4)?.try_into().ok()?;
                Some(u32::from_le_bytes(bytes))
            })
            .unwrap_or(0)
    }

    fn store_word(&mut self, word: &WordRef, value: u32, bound: &HashMap<u32, BindGroupId>) {
        let Some((buffer, at)) = self.resolve_word(word, bound) else {
            return;
        };
        if let Some(slot) = self.buffer_data_mut(buffer).and_then(|data| data.get_mut(at..at + 4)) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }

    fn run_kernel(&mut self, pipeline: ComputePipelineId, bound: &HashMap<u32, BindGroupId>) {
        let ops = match self.pipelines.get(&pipeline) {
            Some(Some(state)) => state.ops.clone(),
            _ => return,
        };
        for op in ops {
            match op {
                KernelOp::CopyWord { src, dst } => {
                    let value = self.load_word(&src, bound);
                    self.store_word(&dst, value, bound);
                }
                KernelOp::StoreWord { dst, value } => self.store_word(&dst, value, bound),
            }
        }
    }
}

/// Yields `(linear offset, texture offset, length)` for every block row a copy touches.
fn block_rows(
    texture_size: Extent3d,
    format: TextureFormat,
    origin: &Origin3d,
    layout: &TextureDataLayout,
    size: Extent3d,
) -> Vec<(usize, usize, usize)> {
    let info = format.info();
    let row_len = format.bytes_in_complete_row(size.width);
    let texture_row_len = format.bytes_in_complete_row(texture_size.width);
    let texture_block_rows = u64::from(texture_size.height / info.block_height);
    let rows_per_image = match layout.rows_per_image {
        0 => size.height,
        rows => rows,
    };
    let bytes_per_row = u64::from(layout.bytes_per_row);
    let linear_image_stride = bytes_per_row * u64::from(rows_per_image / info.block_height);
    let x_offset = u64::from(origin.x / info.block_width) * u64::from(info.bytes_per_block);

    let mut rows = Vec::new();
    for z in 0..u64::from(size.depth) {
        for row in 0..u64::from(size.height / info.block_height) {
            let linear = layout.offset + z * linear_image_stride + row * bytes_per_row;
            let texture_row = (u64::from(origin.z) + z) * texture_block_rows
                + u64::from(origin.y / info.block_height)
                + row;
            let texel = texture_row * texture_row_len + x_offset;
            rows.push((linear as usize, texel as usize, row_len as usize));
        }
    }
    rows
}

fn copy_into_texture(
    texture: &mut TextureState,
    origin: &Origin3d,
    layout: &TextureDataLayout,
    size: Extent3d,
    source: &[u8],
) {
    for (linear, texel, len) in block_rows(texture.size, texture.format, origin, layout, size) {
        if let (Some(from), Some(to)) = (
            source.get(linear..linear + len),
            texture.data.get_mut(texel..texel + len),
        ) {
            to.copy_from_slice(from);
        }
    }
}

fn copy_out_of_texture(
    texture: &TextureState,
    origin: &Origin3d,
    layout: &TextureDataLayout,
    size: Extent3d,
) -> Vec<(usize, Vec<u8>)> {
    block_rows(texture.size, texture.format, origin, layout, size)
        .into_iter()
        .filter_map(|(linear, texel, len)| {
            texture
                .data
                .get(texel..texel + len)
                .map(|row| (linear, row.to_vec()))
        })
        .collect()
}

// ============================================================================
// PUBLIC DEVICE
// ============================================================================

/// The reference device. Clones share state, so a test can keep a handle to
/// inspect a device whose ownership moved into a fixture.
#[derive(Clone, Default)]
pub struct SoftDevice {
    state: Rc<RefCell<State>>,
}

impl SoftDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        let device = Self::default();
        device.state.borrow_mut().limits = limits;
        device
    }

    /// Buffers and textures that are valid and not destroyed.
    pub fn live_resources(&self) -> usize {
        let state = self.state.borrow();
        let buffers = state
            .buffers
            .values()
            .flatten()
            .filter(|buffer| !buffer.destroyed)
            .count();
        let textures = state
            .textures
            .values()
            .flatten()
            .filter(|texture| !texture.destroyed)
            .count();
        buffers + textures
    }

    /// While stalled, completion and read-back futures resolve to a timeout.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.borrow_mut().stalled = stalled;
    }

    pub fn submission_count(&self) -> usize {
        self.state.borrow().submissions
    }

    /// Overwrites buffer contents without validation, bypassing the queue.
    /// Used to inject faults when testing content expectations.
    pub fn poke_buffer(&self, buffer: BufferId, offset: usize, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        if let Some(slot) = state
            .buffer_data_mut(buffer)
            .and_then(|data| data.get_mut(offset..offset.checked_add(bytes.len())?))
        {
            slot.copy_from_slice(bytes);
        }
    }
}

impl std::fmt::Debug for SoftDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftDevice")
            .field("live_resources", &self.live_resources())
            .field("submissions", &self.submission_count())
            .finish()
    }
}

impl Device for SoftDevice {
    fn create_buffer(&self, desc: &BufferDescriptor) -> BufferId {
        let mut state = self.state.borrow_mut();
        let id = BufferId(state.alloc());
        let slot = match state.validate_buffer(desc) {
            Ok(()) => Some(BufferState {
                data: vec![0; desc.size as usize],
                usage: desc.usage,
                destroyed: false,
            }),
            Err(message) => {
                state.raise(message);
                None
            }
        };
        state.buffers.insert(id, slot);
        id
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> TextureId {
        let mut state = self.state.borrow_mut();
        let id = TextureId(state.alloc());
        let slot = match state.validate_texture(desc) {
            Ok(len) => {
                Some(TextureState {
                    size: desc.size,
                    format: desc.format,
                    usage: desc.usage,
                    data: vec![0; len as usize],
                    destroyed: false,
                })
            }
            Err(message) => {
                state.raise(message);
                None
            }
        };
        state.textures.insert(id, slot);
        id
    }

    fn create_bind_group_layout(&self, desc: &BindGroupLayoutDescriptor) -> BindGroupLayoutId {
        let mut state = self.state.borrow_mut();
        let id = BindGroupLayoutId(state.alloc());
        let duplicate = desc
            .entries
            .iter()
            .enumerate()
            .find(|(i, entry)| desc.entries[..*i].iter().any(|e| e.binding == entry.binding));
        let slot = match duplicate {
            Some((_, entry)) => {
                state.raise(format!("binding {} is declared twice", entry.binding));
                None
            }
            None => Some(desc.entries.clone()),
        };
        state.bind_group_layouts.insert(id, slot);
        id
    }

    fn create_bind_group(&self, desc: &BindGroupDescriptor) -> BindGroupId {
        let mut state = self.state.borrow_mut();
        let id = BindGroupId(state.alloc());
        let slot = match state.validate_bind_group(desc) {
            Ok(group) => Some(group),
            Err(message) => {
                state.raise(message);
                None
            }
        };
        state.bind_groups.insert(id, slot);
        id
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDescriptor) -> PipelineLayoutId {
        let mut state = self.state.borrow_mut();
        let id = PipelineLayoutId(state.alloc());
        let layouts: Result<Vec<_>, String> = if desc.bind_group_layouts.len()
            > state.limits.max_bind_groups as usize
        {
            Err("too many bind group layouts".to_string())
        } else {
            desc.bind_group_layouts
                .iter()
                .map(|layout| lookup(&state.bind_group_layouts, *layout, "bind group layout").cloned())
                .collect()
        };
        let slot = match layouts {
            Ok(layouts) => Some(layouts),
            Err(message) => {
                state.raise(message);
                None
            }
        };
        state.pipeline_layouts.insert(id, slot);
        id
    }

    fn create_shader_module(&self, desc: &ShaderModuleDescriptor) -> ShaderModuleId {
        let mut state = self.state.borrow_mut();
        let id = ShaderModuleId(state.alloc());
        let slot = match &desc.source {
            ShaderSource::Kernel(kernel) => Some(kernel.clone()),
            ShaderSource::Wgsl(_) => {
                state.raise("the soft device only accepts kernel IR shaders".to_string());
                None
            }
        };
        state.shader_modules.insert(id, slot);
        id
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDescriptor) -> ComputePipelineId {
        let mut state = self.state.borrow_mut();
        let id = ComputePipelineId(state.alloc());
        let slot = match state.validate_pipeline(desc) {
            Ok(pipeline) => Some(pipeline),
            Err(message) => {
                state.raise(message);
                None
            }
        };
        state.pipelines.insert(id, slot);
        id
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        if let Some(Some(state)) = self.state.borrow_mut().buffers.get_mut(&buffer) {
            state.destroyed = true;
        }
    }

    fn destroy_texture(&self, texture: TextureId) {
        if let Some(Some(state)) = self.state.borrow_mut().textures.get_mut(&texture) {
            state.destroyed = true;
        }
    }

    fn finish(&self, commands: Vec<Command>) -> CommandBufferId {
        let mut state = self.state.borrow_mut();
        let id = CommandBufferId(state.alloc());
        let slot = match state.validate_encoding(&commands) {
            Ok(()) => Some(CommandBufferState {
                commands,
                submitted: false,
            }),
            Err(message) => {
                state.raise(message);
                None
            }
        };
        state.command_buffers.insert(id, slot);
        id
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let checked = state.live_buffer(buffer).and_then(|target| {
            if !target.usage.contains(BufferUsages::COPY_DST) {
                return Err("write_buffer target lacks COPY_DST usage".to_string());
            }
            if offset % 4 != 0 || data.len() % 4 != 0 {
                return Err("write_buffer offset and size must be multiples of 4".to_string());
            }
            let end = offset.checked_add(data.len() as u64);
            if end.map_or(true, |end| end > target.data.len() as u64) {
                return Err("write_buffer range exceeds the buffer size".to_string());
            }
            Ok(())
        });
        match checked {
            Ok(()) => {
                if let Some(target) = state.buffer_data_mut(buffer) {
                    let at = offset as usize;
                    target[at..at + data.len()].copy_from_slice(data);
                }
            }
            Err(message) => state.raise(message),
        }
    }

    fn write_texture(
        &self,
        destination: &TextureCopyView,
        data: &[u8],
        layout: &TextureDataLayout,
        size: Extent3d,
    ) {
        let mut state = self.state.borrow_mut();
        let checked = state.live_texture(destination.texture).and_then(|texture| {
            state.validate_texture_copy(
                texture,
                &destination.origin,
                size,
                CopyDirection::IntoTexture,
            )?;
            State::validate_linear_layout(layout, texture.format, size, false)?;
            let needed = layout
                .offset
                .saturating_add(required_bytes_in_copy(layout, texture.format, size));
            if needed > data.len() as u64 {
                return Err(format!(
                    "{} bytes of data is too small for the texture write, {needed} bytes required",
                    data.len()
                ));
            }
            Ok(())
        });
        match checked {
            Ok(()) => {
                if let Some(Some(texture)) = state.textures.get_mut(&destination.texture) {
                    copy_into_texture(texture, &destination.origin, layout, size, data);
                }
            }
            Err(message) => state.raise(message),
        }
    }

    fn submit(&self, command_buffers: &[CommandBufferId]) {
        let mut state = self.state.borrow_mut();
        state.submissions += 1;
        // One invalid command buffer invalidates the whole submission.
        let invalid = command_buffers
            .iter()
            .find_map(|id| state.validate_submission(*id).err());
        if let Some(message) = invalid {
            state.raise(message);
            return;
        }
        for id in command_buffers {
            let commands = match state.command_buffers.get_mut(id) {
                Some(Some(command_buffer)) => {
                    command_buffer.submitted = true;
                    command_buffer.commands.clone()
                }
                _ => continue,
            };
            state.execute(&commands);
        }
    }

    fn on_submitted_work_done(&self) -> LocalBoxFuture<'static, Result<(), DeviceError>> {
        let result = if self.state.borrow().stalled {
            Err(DeviceError::Timeout {
                operation: "on_submitted_work_done".to_string(),
            })
        } else {
            Ok(())
        };
        Box::pin(future::ready(result))
    }

    fn read_buffer(
        &self,
        buffer: BufferId,
        offset: u64,
        size: u64,
    ) -> LocalBoxFuture<'static, Result<Vec<u8>, DeviceError>> {
        let state = self.state.borrow();
        let result = if state.stalled {
            Err(DeviceError::Timeout {
                operation: "read_buffer".to_string(),
            })
        } else {
            state
                .live_buffer(buffer)
                .and_then(|source| {
                    if !source.usage.contains(BufferUsages::MAP_READ) {
                        return Err("buffer lacks MAP_READ usage".to_string());
                    }
                    let range = offset
                        .checked_add(size)
                        .and_then(|end| Some(usize::try_from(offset).ok()?..usize::try_from(end).ok()?));
                    range
                        .and_then(|range| source.data.get(range))
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| "mapped range exceeds the buffer size".to_string())
                })
                .map_err(|reason| DeviceError::MapFailed { reason })
        };
        Box::pin(future::ready(result))
    }

    fn push_error_scope(&self, filter: ErrorFilter) {
        self.state.borrow_mut().scopes.push((filter, None));
    }

    fn pop_error_scope(&self) -> LocalBoxFuture<'static, Result<Option<ValidationError>, DeviceError>> {
        let result = match self.state.borrow_mut().scopes.pop() {
            Some((_, error)) => Ok(error),
            None => Err(DeviceError::ScopeUnderflow),
        };
        Box::pin(future::ready(result))
    }

    fn error_scope_depth(&self) -> usize {
        self.state.borrow().scopes.len()
    }

    fn take_uncaptured_errors(&self) -> Vec<ValidationError> {
        std::mem::take(&mut self.state.borrow_mut().uncaptured)
    }
}

/// Hands out a fresh [`SoftDevice`] per case.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftDeviceProvider {
    pub limits: Limits,
}

impl DeviceProvider for SoftDeviceProvider {
    fn acquire(&self) -> Result<Box<dyn Device>, DeviceError> {
        Ok(Box::new(SoftDevice::with_limits(self.limits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BindGroupEntry, BufferBinding, CommandEncoder, ShaderStages};

    fn buffer(device: &SoftDevice, size: u64, usage: BufferUsages) -> BufferId {
        device.create_buffer(&BufferDescriptor {
            label: None,
            size,
            usage,
        })
    }

    fn scoped<T>(device: &SoftDevice, f: impl FnOnce() -> T) -> (T, Option<ValidationError>) {
        device.push_error_scope(ErrorFilter::Validation);
        let value = f();
        let error = pollster::block_on(device.pop_error_scope()).unwrap();
        (value, error)
    }

    #[test]
    fn innermost_scope_keeps_first_error() {
        let device = SoftDevice::new();
        device.push_error_scope(ErrorFilter::Validation);
        let (_, inner) = scoped(&device, || {
            buffer(&device, 4, BufferUsages::empty());
            buffer(&device, 4, BufferUsages::MAP_READ | BufferUsages::STORAGE);
        });
        let outer = pollster::block_on(device.pop_error_scope()).unwrap();
        assert!(inner.unwrap().message.contains("must not be empty"));
        assert!(outer.is_none());
        assert!(device.take_uncaptured_errors().is_empty());
    }

    #[test]
    fn errors_without_scope_are_uncaptured() {
        let device = SoftDevice::new();
        buffer(&device, 4, BufferUsages::empty());
        assert_eq!(device.take_uncaptured_errors().len(), 1);
        assert!(device.take_uncaptured_errors().is_empty());
    }

    #[test]
    fn undersized_copy_destination_fails_at_submit_only() {
        let device = SoftDevice::new();
        let src = buffer(&device, 16, BufferUsages::COPY_SRC);
        let dst = buffer(&device, 8, BufferUsages::COPY_DST);
        let mut encoder = CommandEncoder::new();
        encoder.copy_buffer_to_buffer(src, 0, dst, 0, 16);

        let (command_buffer, encode_error) = scoped(&device, || encoder.finish(&device));
        assert!(encode_error.is_none());

        let ((), submit_error) = scoped(&device, || device.submit(&[command_buffer]));
        let submit_error = submit_error.unwrap();
        assert!(submit_error.message.contains("exceeds the buffer size"));
    }

    #[test]
    fn overflowing_copy_offset_fails_at_submit() {
        let device = SoftDevice::new();
        let src = buffer(&device, 16, BufferUsages::COPY_SRC);
        let dst = buffer(&device, 16, BufferUsages::COPY_DST);
        let mut encoder = CommandEncoder::new();
        encoder.copy_buffer_to_buffer(src, 0, dst, u64::MAX - 3, 16);

        let (command_buffer, encode_error) = scoped(&device, || encoder.finish(&device));
        assert!(encode_error.is_none());
        let ((), submit_error) = scoped(&device, || device.submit(&[command_buffer]));
        assert!(submit_error.unwrap().message.contains("overflows"));
    }

    #[test]
    fn overflowing_ranges_outside_submit_are_rejected() {
        let device = SoftDevice::new();
        let target = buffer(
            &device,
            512,
            BufferUsages::COPY_DST | BufferUsages::MAP_READ | BufferUsages::STORAGE,
        );
        let ((), write_error) = scoped(&device, || {
            device.write_buffer(target, u64::MAX - 3, &[0; 8]);
        });
        assert!(write_error.unwrap().message.contains("exceeds the buffer size"));

        let read = pollster::block_on(device.read_buffer(target, u64::MAX - 3, 8));
        assert!(matches!(read, Err(DeviceError::MapFailed { .. })));

        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            entries: vec![BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::StorageBuffer,
            }],
        });
        let (_, bind_error) = scoped(&device, || {
            device.create_bind_group(&BindGroupDescriptor {
                layout,
                entries: vec![BindGroupEntry {
                    binding: 0,
                    resource: BufferBinding {
                        buffer: target,
                        offset: u64::MAX - 255,
                        size: Some(512),
                    },
                }],
            })
        });
        assert!(bind_error.unwrap().message.contains("does not fit"));
    }

    #[test]
    fn oversized_texture_is_a_validation_error() {
        let device = SoftDevice::new();
        let (_, error) = scoped(&device, || {
            device.create_texture(&TextureDescriptor {
                label: None,
                size: Extent3d::new(8192, 8192, 8192),
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsages::COPY_DST,
            })
        });
        assert!(error.unwrap().message.contains("storage limit"));
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn resubmission_is_rejected() {
        let device = SoftDevice::new();
        let src = buffer(&device, 4, BufferUsages::COPY_SRC);
        let dst = buffer(&device, 4, BufferUsages::COPY_DST);
        let mut encoder = CommandEncoder::new();
        encoder.copy_buffer_to_buffer(src, 0, dst, 0, 4);
        let command_buffer = encoder.finish(&device);
        let ((), first) = scoped(&device, || device.submit(&[command_buffer]));
        let ((), second) = scoped(&device, || device.submit(&[command_buffer]));
        assert!(first.is_none());
        assert!(second.unwrap().message.contains("already submitted"));
    }

    #[test]
    fn kernel_copies_words_between_bindings() {
        let device = SoftDevice::new();
        let src = buffer(&device, 4, BufferUsages::STORAGE | BufferUsages::COPY_DST);
        let dst = buffer(&device, 4, BufferUsages::STORAGE | BufferUsages::COPY_SRC);
        let readback = buffer(&device, 4, BufferUsages::MAP_READ | BufferUsages::COPY_DST);
        device.write_buffer(src, 0, &0xdead_beef_u32.to_le_bytes());

        let storage = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::StorageBuffer,
        };
        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            entries: vec![storage(0), storage(1)],
        });
        let entry = |binding, buffer| BindGroupEntry {
            binding,
            resource: BufferBinding {
                buffer,
                offset: 0,
                size: None,
            },
        };
        let group = device.create_bind_group(&BindGroupDescriptor {
            layout,
            entries: vec![entry(0, src), entry(1, dst)],
        });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            bind_group_layouts: vec![layout],
        });
        let word = |binding| WordRef {
            group: 0,
            binding,
            index: 0,
        };
        let module = device.create_shader_module(&ShaderModuleDescriptor {
            label: None,
            source: ShaderSource::Kernel(Kernel {
                entry_point: "main".to_string(),
                ops: vec![KernelOp::CopyWord {
                    src: word(0),
                    dst: word(1),
                }],
            }),
        });
        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            layout: pipeline_layout,
            module,
            entry_point: "main".to_string(),
        });

        let mut encoder = CommandEncoder::new();
        let mut pass = encoder.begin_compute_pass();
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, group);
        pass.dispatch(1, 1, 1);
        pass.end();
        encoder.copy_buffer_to_buffer(dst, 0, readback, 0, 4);
        let command_buffer = encoder.finish(&device);
        device.submit(&[command_buffer]);

        assert!(device.take_uncaptured_errors().is_empty());
        let bytes = pollster::block_on(device.read_buffer(readback, 0, 4)).unwrap();
        assert_eq!(bytes, 0xdead_beef_u32.to_le_bytes());
    }

    #[test]
    fn texture_round_trip_through_buffers() {
        let device = SoftDevice::new();
        let texture = device.create_texture(&TextureDescriptor {
            label: None,
            size: Extent3d::new(2, 2, 1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::COPY_SRC | TextureUsages::COPY_DST,
        });
        let pixels: Vec<u8> = (0..16).collect();
        let layout = TextureDataLayout {
            offset: 0,
            bytes_per_row: 8,
            rows_per_image: 0,
        };
        let view = TextureCopyView {
            texture,
            origin: Origin3d::default(),
        };
        device.write_texture(&view, &pixels, &layout, Extent3d::new(2, 2, 1));

        let readback = buffer(&device, 512, BufferUsages::MAP_READ | BufferUsages::COPY_DST);
        let mut encoder = CommandEncoder::new();
        encoder.copy_texture_to_buffer(
            view,
            BufferCopyView {
                buffer: readback,
                layout: TextureDataLayout {
                    offset: 0,
                    bytes_per_row: 256,
                    rows_per_image: 0,
                },
            },
            Extent3d::new(2, 2, 1),
        );
        device.submit(&[encoder.finish(&device)]);
        assert!(device.take_uncaptured_errors().is_empty());

        let bytes = pollster::block_on(device.read_buffer(readback, 0, 512)).unwrap();
        assert_eq!(&bytes[0..8], &pixels[0..8]);
        assert_eq!(&bytes[256..264], &pixels[8..16]);
    }

    #[test]
    fn stalled_queue_times_out() {
        let device = SoftDevice::new();
        device.set_stalled(true);
        let err = pollster::block_on(device.on_submitted_work_done()).unwrap_err();
        assert!(matches!(err, DeviceError::Timeout { .. }));
    }

    #[test]
    fn destroyed_resources_are_not_live() {
        let device = SoftDevice::new();
        let a = buffer(&device, 4, BufferUsages::COPY_DST);
        buffer(&device, 4, BufferUsages::COPY_SRC);
        assert_eq!(device.live_resources(), 2);
        device.destroy_buffer(a);
        assert_eq!(device.live_resources(), 1);
    }
}
