//! copy_buffer_to_buffer validation.
//!
//! Alignment and usage rules are checked when the command buffer is
//! finished. Ranges are checked against buffer sizes only at submit, so
//! `copy_within_bounds` and `copy_with_overflow` expect encoding to succeed
//! and the submission to fail.

use crate::device::{BufferDescriptor, BufferId, BufferUsages, CommandEncoder};
use crate::fixture::GpuTest;
use crate::params::{ParamBinding, ParamSpec};
use crate::registry::TestGroup;
use crate::{err_msg, CtsError};

/// 4-byte aligned, so only the range check can reject it.
const OVERFLOWING_OFFSET: u64 = u64::MAX - 3;

const USAGES: [&str; 3] = ["copy_src", "copy_dst", "storage"];

fn usage(name: &str) -> Result<BufferUsages, CtsError> {
    match name {
        "copy_src" => Ok(BufferUsages::COPY_SRC),
        "copy_dst" => Ok(BufferUsages::COPY_DST),
        "storage" => Ok(BufferUsages::STORAGE),
        other => Err(err_msg!(Param, "unknown buffer usage '{}'", other)),
    }
}

fn buffer(t: &mut GpuTest, size: u64, usage: BufferUsages) -> BufferId {
    t.create_buffer(&BufferDescriptor {
        label: None,
        size,
        usage,
    })
}

fn pair(t: &mut GpuTest, src_size: u64, dst_size: u64) -> (BufferId, BufferId) {
    (
        buffer(t, src_size, BufferUsages::COPY_SRC),
        buffer(t, dst_size, BufferUsages::COPY_DST),
    )
}

/// Encodes one copy inside an error scope that expects `success`.
fn encode_copy(
    t: &mut GpuTest,
    src: BufferId,
    src_offset: u64,
    dst: BufferId,
    dst_offset: u64,
    size: u64,
    success: bool,
) {
    let mut encoder = CommandEncoder::new();
    encoder.copy_buffer_to_buffer(src, src_offset, dst, dst_offset, size);
    t.expect_validation_error(!success, move |device| encoder.finish(device));
}

fn copy_size_alignment(t: &mut GpuTest, p: &ParamBinding) -> Result<(), CtsError> {
    let size = p.get_u64("size")?;
    let (src, dst) = pair(t, 16, 16);
    encode_copy(t, src, 0, dst, 0, size, size % 4 == 0);
    Ok(())
}

fn copy_offset_alignment(t: &mut GpuTest, p: &ParamBinding) -> Result<(), CtsError> {
    let src_offset = p.get_u64("src_offset")?;
    let dst_offset = p.get_u64("dst_offset")?;
    let (src, dst) = pair(t, 16, 16);
    let success = src_offset % 4 == 0 && dst_offset % 4 == 0;
    encode_copy(t, src, src_offset, dst, dst_offset, 8, success);
    Ok(())
}

fn copy_usage(t: &mut GpuTest, p: &ParamBinding) -> Result<(), CtsError> {
    let src_usage = usage(p.get_str("src_usage")?)?;
    let dst_usage = usage(p.get_str("dst_usage")?)?;
    let src = buffer(t, 16, src_usage);
    let dst = buffer(t, 16, dst_usage);
    let success = src_usage.contains(BufferUsages::COPY_SRC) && dst_usage.contains(BufferUsages::COPY_DST);
    encode_copy(t, src, 0, dst, 0, 16, success);
    Ok(())
}

fn copy_within_bounds(t: &mut GpuTest, p: &ParamBinding) -> Result<(), CtsError> {
    let dst_size = p.get_u64("dst_size")?;
    let dst_offset = p.get_u64("dst_offset")?;
    let (src, dst) = pair(t, 16, dst_size);

    let mut encoder = CommandEncoder::new();
    encoder.copy_buffer_to_buffer(src, 0, dst, dst_offset, 16);
    let commands = t.expect_validation_error(false, move |device| encoder.finish(device));
    t.expect_submit_validation_error(!fits(dst_offset, 16, dst_size), &[commands]);
    Ok(())
}

fn fits(offset: u64, size: u64, len: u64) -> bool {
    offset.checked_add(size).map_or(false, |end| end <= len)
}

fn copy_with_overflow(t: &mut GpuTest, p: &ParamBinding) -> Result<(), CtsError> {
    let src_offset = p.get_u64("src_offset")?;
    let dst_offset = p.get_u64("dst_offset")?;
    let (src, dst) = pair(t, 16, 16);

    let mut encoder = CommandEncoder::new();
    encoder.copy_buffer_to_buffer(src, src_offset, dst, dst_offset, 16);
    let commands = t.expect_validation_error(false, move |device| encoder.finish(device));
    let success = fits(src_offset, 16, 16) && fits(dst_offset, 16, 16);
    t.expect_submit_validation_error(!success, &[commands]);
    Ok(())
}

fn copy_from_destroyed_buffer(t: &mut GpuTest, p: &ParamBinding) -> Result<(), CtsError> {
    let destroy = p.get_bool("destroy")?;
    let (src, dst) = pair(t, 16, 16);

    let mut encoder = CommandEncoder::new();
    encoder.copy_buffer_to_buffer(src, 0, dst, 0, 16);
    let commands = t.expect_validation_error(false, move |device| encoder.finish(device));
    if destroy {
        t.release_buffer(src);
    }
    t.expect_submit_validation_error(destroy, &[commands]);
    Ok(())
}

fn copy_within_same_buffer(t: &mut GpuTest, _: &ParamBinding) -> Result<(), CtsError> {
    let both = buffer(t, 16, BufferUsages::COPY_SRC | BufferUsages::COPY_DST);
    encode_copy(t, both, 0, both, 8, 8, false);
    Ok(())
}

pub fn group() -> Result<TestGroup<GpuTest>, CtsError> {
    let mut group = TestGroup::<GpuTest>::new("copy_buffer_to_buffer validation tests.");
    group
        .test_sync(
            "copy_size_alignment",
            Some(ParamSpec::new().options("size", [0, 2, 4, 5, 8, 16])),
            copy_size_alignment,
        )?
        .test_sync(
            "copy_offset_alignment",
            Some(
                ParamSpec::new()
                    .options("src_offset", [0, 2, 4, 6, 8])
                    .options("dst_offset", [0, 2, 4, 6, 8]),
            ),
            copy_offset_alignment,
        )?
        .test_sync(
            "copy_usage",
            Some(
                ParamSpec::new()
                    .options("src_usage", USAGES)
                    .options("dst_usage", USAGES),
            ),
            copy_usage,
        )?
        .test_sync(
            "copy_within_bounds",
            Some(
                ParamSpec::new()
                    .options("dst_size", [8, 16, 32])
                    .options("dst_offset", [0, 8, 16])
                    .unless(["dst_size", "dst_offset"], |p| {
                        Ok(p.get_u64("dst_offset")? >= p.get_u64("dst_size")?)
                    }),
            ),
            copy_within_bounds,
        )?
        .test_sync(
            "copy_with_overflow",
            Some(
                ParamSpec::new()
                    .options("src_offset", [0, OVERFLOWING_OFFSET])
                    .options("dst_offset", [0, OVERFLOWING_OFFSET]),
            ),
            copy_with_overflow,
        )?
        .test_sync(
            "copy_from_destroyed_buffer",
            Some(ParamSpec::new().bools("destroy")),
            copy_from_destroyed_buffer,
        )?
        .test_sync("copy_within_same_buffer", None, copy_within_same_buffer)?;
    Ok(group)
}
