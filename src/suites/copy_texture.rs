//! Validation of copies between linear data and textures.
//!
//! Every test runs through all three ways of moving linear data into or out
//! of a texture (`write_texture`, `copy_buffer_to_texture`,
//! `copy_texture_to_buffer`) and every format that supports the direction.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::{
    required_bytes_in_copy, BufferCopyView, BufferDescriptor, BufferUsages, CommandEncoder,
    Extent3d, Origin3d, TextureCopyView, TextureDataLayout, TextureDescriptor, TextureFormat,
    TextureId, TextureUsages,
};
use crate::fixture::{Fixture, FixtureContext, GpuTest};
use crate::params::{ParamBinding, ParamSpec};
use crate::registry::TestGroup;
use crate::{err_msg, CtsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyMethod {
    WriteTexture,
    CopyBufferToTexture,
    CopyTextureToBuffer,
}

impl CopyMethod {
    pub const ALL: [CopyMethod; 3] = [
        CopyMethod::WriteTexture,
        CopyMethod::CopyBufferToTexture,
        CopyMethod::CopyTextureToBuffer,
    ];
}

impl From<CopyMethod> for Value {
    fn from(method: CopyMethod) -> Self {
        serde_json::to_value(method).unwrap_or(Value::Null)
    }
}

/// How one copy is expected to go.
#[derive(Debug, Clone, Copy)]
pub struct TestRun {
    pub data_size: u64,
    pub method: CopyMethod,
    pub success: bool,
    /// The error is expected from the submission; encoding must succeed.
    pub submit: bool,
}

/// Fixture with helpers for linear-data/texture copies.
#[derive(Debug)]
pub struct CopyTextureTest {
    gpu: GpuTest,
}

impl Fixture for CopyTextureTest {
    fn init(ctx: FixtureContext) -> Result<Self, CtsError> {
        Ok(Self {
            gpu: GpuTest::init(ctx)?,
        })
    }

    fn context(&mut self) -> &mut FixtureContext {
        self.gpu.context()
    }
}

impl Deref for CopyTextureTest {
    type Target = GpuTest;

    fn deref(&self) -> &GpuTest {
        &self.gpu
    }
}

impl DerefMut for CopyTextureTest {
    fn deref_mut(&mut self) -> &mut GpuTest {
        &mut self.gpu
    }
}

impl CopyTextureTest {
    /// Performs one copy with `method` and queues the matching validation check.
    pub fn test_run(
        &mut self,
        view: TextureCopyView,
        layout: TextureDataLayout,
        size: Extent3d,
        run: TestRun,
    ) {
        match run.method {
            CopyMethod::WriteTexture => {
                let data = vec![0u8; run.data_size as usize];
                self.expect_validation_error(!run.success, |device| {
                    device.write_texture(&view, &data, &layout, size)
                });
            }
            CopyMethod::CopyBufferToTexture | CopyMethod::CopyTextureToBuffer => {
                let usage = match run.method {
                    CopyMethod::CopyBufferToTexture => BufferUsages::COPY_SRC,
                    _ => BufferUsages::COPY_DST,
                };
                let buffer = self.create_buffer(&BufferDescriptor {
                    label: None,
                    size: run.data_size,
                    usage,
                });
                let linear = BufferCopyView { buffer, layout };
                let mut encoder = CommandEncoder::new();
                if run.method == CopyMethod::CopyBufferToTexture {
                    encoder.copy_buffer_to_texture(linear, view, size);
                } else {
                    encoder.copy_texture_to_buffer(view, linear, size);
                }

                if run.submit {
                    let commands =
                        self.expect_validation_error(false, move |device| encoder.finish(device));
                    self.expect_submit_validation_error(!run.success, &[commands]);
                } else {
                    self.expect_validation_error(!run.success, move |device| {
                        encoder.finish(device)
                    });
                }
            }
        }
    }

    /// A texture big enough for a copy of `copy_blocks` blocks at `origin`.
    pub fn create_aligned_texture(
        &mut self,
        format: TextureFormat,
        copy_blocks: Extent3d,
        origin: Origin3d,
    ) -> TextureId {
        let info = format.info();
        self.create_texture(&TextureDescriptor {
            label: None,
            size: Extent3d::new(
                (copy_blocks.width + origin.x).max(1) * info.block_width,
                (copy_blocks.height + origin.y).max(1) * info.block_height,
                (copy_blocks.depth + origin.z).max(1),
            ),
            format,
            usage: TextureUsages::COPY_SRC | TextureUsages::COPY_DST,
        })
    }
}

// ============================================================================
// PARAMETER HELPERS
// ============================================================================

/// `0..=2n` and `3n`: enough values to exercise divisibility by `n`.
pub fn values_to_test_divisibility_by(n: u32) -> Vec<u32> {
    let mut values: Vec<u32> = (0..=2 * n).collect();
    values.push(3 * n);
    values
}

/// Whether `format` can take part in a copy in `method`'s direction.
pub fn format_copyable_with_method(p: &ParamBinding) -> Result<bool, CtsError> {
    let info = p.get_as::<TextureFormat>("format")?.info();
    Ok(match p.get_as::<CopyMethod>("method")? {
        CopyMethod::CopyTextureToBuffer => info.copy_src,
        CopyMethod::WriteTexture | CopyMethod::CopyBufferToTexture => info.copy_dst,
    })
}

/// Every method crossed with every format that supports its direction.
fn methods_and_formats() -> ParamSpec {
    ParamSpec::new()
        .options("method", CopyMethod::ALL)
        .options("format", TextureFormat::ALL)
        .filter(["method", "format"], format_copyable_with_method)
}

fn format_of(p: &ParamBinding) -> Result<TextureFormat, CtsError> {
    p.get_as("format")
}

fn value_to_coordinate(p: &ParamBinding) -> Result<Vec<u32>, CtsError> {
    let info = format_of(p)?.info();
    let block = match p.get_str("coordinate")? {
        "x" | "width" => info.block_width,
        "y" | "height" => info.block_height,
        "z" | "depth" => 1,
        other => return Err(err_msg!(Param, "unknown coordinate '{}'", other)),
    };
    Ok(values_to_test_divisibility_by(block))
}

const EMPTY_COPY: Extent3d = Extent3d::new(0, 0, 0);

fn zero_layout(rows_per_image: u32) -> TextureDataLayout {
    TextureDataLayout {
        offset: 0,
        bytes_per_row: 0,
        rows_per_image,
    }
}

fn params(p: &ParamBinding) -> Result<(CopyMethod, TextureFormat), CtsError> {
    Ok((p.get_as("method")?, format_of(p)?))
}

// ============================================================================
// TESTS
// ============================================================================

fn texel_block_alignment_on_offset(t: &mut CopyTextureTest, p: &ParamBinding) -> Result<(), CtsError> {
    let (method, format) = params(p)?;
    let offset = p.get_u64("offset")?;
    let info = format.info();

    let texture = t.create_aligned_texture(format, Extent3d::new(1, 1, 1), Origin3d::default());
    let size = Extent3d::new(info.block_width, info.block_height, 1);
    let layout = TextureDataLayout {
        offset,
        bytes_per_row: 256,
        rows_per_image: 0,
    };
    let success = offset % u64::from(info.bytes_per_block) == 0;
    let view = TextureCopyView {
        texture,
        origin: Origin3d::default(),
    };
    let run = TestRun {
        data_size: offset + u64::from(info.bytes_per_block),
        method,
        success,
        submit: false,
    };
    t.test_run(view, layout, size, run);
    Ok(())
}

fn texel_block_alignment_on_rows_per_image(
    t: &mut CopyTextureTest,
    p: &ParamBinding,
) -> Result<(), CtsError> {
    let (method, format) = params(p)?;
    let rows_per_image = p.get_u64("rows_per_image")? as u32;
    let texture = t.create_aligned_texture(format, EMPTY_COPY, Origin3d::default());
    let success = rows_per_image % format.info().block_height == 0;
    let view = TextureCopyView {
        texture,
        origin: Origin3d::default(),
    };
    let run = TestRun {
        data_size: 1,
        method,
        success,
        submit: false,
    };
    t.test_run(view, zero_layout(rows_per_image), EMPTY_COPY, run);
    Ok(())
}

fn texel_block_alignment_on_origin(t: &mut CopyTextureTest, p: &ParamBinding) -> Result<(), CtsError> {
    let (method, format) = params(p)?;
    let info = format.info();
    let value = p.get_u64("value_to_coordinate")? as u32;
    let mut origin = Origin3d::default();
    let success = match p.get_str("coordinate")? {
        "x" => {
            origin.x = value;
            value % info.block_width == 0
        }
        "y" => {
            origin.y = value;
            value % info.block_height == 0
        }
        _ => {
            origin.z = value;
            true
        }
    };

    let texture = t.create_aligned_texture(format, EMPTY_COPY, origin);
    let run = TestRun {
        data_size: 1,
        method,
        success,
        submit: false,
    };
    t.test_run(TextureCopyView { texture, origin }, zero_layout(0), EMPTY_COPY, run);
    Ok(())
}

fn texel_block_alignment_on_size(t: &mut CopyTextureTest, p: &ParamBinding) -> Result<(), CtsError> {
    let (method, format) = params(p)?;
    let info = format.info();
    let value = p.get_u64("value_to_coordinate")? as u32;
    let mut size = EMPTY_COPY;
    let success = match p.get_str("coordinate")? {
        "width" => {
            size.width = value;
            value % info.block_width == 0
        }
        "height" => {
            size.height = value;
            value % info.block_height == 0
        }
        _ => {
            size.depth = value;
            true
        }
    };

    let texture = t.create_aligned_texture(format, size, Origin3d::default());
    let view = TextureCopyView {
        texture,
        origin: Origin3d::default(),
    };
    let run = TestRun {
        data_size: 1,
        method,
        success,
        submit: false,
    };
    t.test_run(view, zero_layout(0), size, run);
    Ok(())
}

/// Linear data one byte short of what the copy touches is rejected: at
/// submit for buffer copies, immediately for `write_texture`.
fn required_bytes_in_copy_bound(t: &mut CopyTextureTest, p: &ParamBinding) -> Result<(), CtsError> {
    let (method, format) = params(p)?;
    let success = p.get_bool("success")?;
    let info = format.info();

    let blocks = Extent3d::new(3, 3, 2);
    let texture = t.create_aligned_texture(format, blocks, Origin3d::default());
    let size = Extent3d::new(
        blocks.width * info.block_width,
        blocks.height * info.block_height,
        blocks.depth,
    );
    let layout = TextureDataLayout {
        offset: 0,
        bytes_per_row: 256,
        rows_per_image: 0,
    };
    let required = required_bytes_in_copy(&layout, format, size);
    let run = TestRun {
        data_size: if success { required } else { required - 1 },
        method,
        success,
        submit: method != CopyMethod::WriteTexture,
    };
    let view = TextureCopyView {
        texture,
        origin: Origin3d::default(),
    };
    t.test_run(view, layout, size, run);
    Ok(())
}

pub fn group() -> Result<TestGroup<CopyTextureTest>, CtsError> {
    let mut group = TestGroup::<CopyTextureTest>::new(
        "writeTexture, copyBufferToTexture and copyTextureToBuffer validation tests.",
    );
    group
        .test_sync(
            "texel_block_alignment_on_offset",
            Some(methods_and_formats().expand("offset", ["format"], |p| {
                Ok(values_to_test_divisibility_by(format_of(p)?.info().bytes_per_block))
            })),
            texel_block_alignment_on_offset,
        )?
        .test_sync(
            "texel_block_alignment_on_rows_per_image",
            Some(methods_and_formats().expand("rows_per_image", ["format"], |p| {
                Ok(values_to_test_divisibility_by(format_of(p)?.info().block_height))
            })),
            texel_block_alignment_on_rows_per_image,
        )?
        .test_sync(
            "texel_block_alignment_on_origin",
            Some(
                methods_and_formats()
                    .options("coordinate", ["x", "y", "z"])
                    .expand("value_to_coordinate", ["format", "coordinate"], value_to_coordinate),
            ),
            texel_block_alignment_on_origin,
        )?
        .test_sync(
            "texel_block_alignment_on_size",
            Some(
                methods_and_formats()
                    .options("coordinate", ["width", "height", "depth"])
                    .expand("value_to_coordinate", ["format", "coordinate"], value_to_coordinate),
            ),
            texel_block_alignment_on_size,
        )?
        .test_sync(
            "required_bytes_in_copy",
            Some(methods_and_formats().bools("success")),
            required_bytes_in_copy_bound,
        )?;
    Ok(group)
}
