//! Basic command buffer compute tests.

use crate::device::{
    BindingType, BufferDescriptor, BufferUsages, CommandEncoder, Kernel, KernelOp, WordRef,
};
use crate::fixture::GpuTest;
use crate::params::ParamSpec;
use crate::registry::TestGroup;
use crate::CtsError;

fn word(binding: u32, index: u32) -> WordRef {
    WordRef {
        group: 0,
        binding,
        index,
    }
}

fn fill_pattern(index: u64) -> u32 {
    0xa5a5_0000 | index as u32
}

pub fn group() -> Result<TestGroup<GpuTest>, CtsError> {
    let mut group = TestGroup::<GpuTest>::new("Basic command buffer compute tests.");

    group.test("memcpy", None, |t, _| {
        Box::pin(async move {
            let data = 0x0102_0304_u32.to_le_bytes();
            let src = t.create_buffer_with_data(&data, BufferUsages::STORAGE);
            let dst = t.create_buffer(&BufferDescriptor {
                label: Some("dst".to_string()),
                size: 4,
                usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            });

            let kernel = Kernel {
                entry_point: "main".to_string(),
                ops: vec![KernelOp::CopyWord {
                    src: word(0, 0),
                    dst: word(1, 0),
                }],
            };
            let (pipeline, layout) = t.create_storage_pipeline(
                kernel,
                &[BindingType::StorageBuffer, BindingType::StorageBuffer],
            );
            let bind_group = t.create_storage_bind_group(layout, &[src, dst]);

            let mut encoder = CommandEncoder::new();
            let mut pass = encoder.begin_compute_pass();
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group);
            pass.dispatch(1, 1, 1);
            pass.end();
            let commands = encoder.finish(t.device());
            t.device().submit(&[commands]);

            t.expect_contents(dst, &data).await
        })
    })?;

    // A dispatch of zero workgroups must leave the buffer untouched.
    group.test(
        "fill",
        Some(
            ParamSpec::new()
                .options("words", [1, 4, 64])
                .options("dispatch_x", [0, 1, 4]),
        ),
        |t, p| {
            Box::pin(async move {
                let words = p.get_u64("words")?;
                let dispatch_x = p.get_u64("dispatch_x")? as u32;
                let dst = t.create_buffer(&BufferDescriptor {
                    label: None,
                    size: words * 4,
                    usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
                });
                let kernel = Kernel {
                    entry_point: "main".to_string(),
                    ops: (0..words)
                        .map(|i| KernelOp::StoreWord {
                            dst: word(0, i as u32),
                            value: fill_pattern(i),
                        })
                        .collect(),
                };
                let (pipeline, layout) =
                    t.create_storage_pipeline(kernel, &[BindingType::StorageBuffer]);
                let bind_group = t.create_storage_bind_group(layout, &[dst]);

                let mut encoder = CommandEncoder::new();
                let mut pass = encoder.begin_compute_pass();
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group);
                pass.dispatch(dispatch_x, 1, 1);
                pass.end();
                let commands = encoder.finish(t.device());
                t.device().submit(&[commands]);

                let expected: Vec<u8> = (0..words)
                    .flat_map(|i| match dispatch_x {
                        0 => [0; 4],
                        _ => fill_pattern(i).to_le_bytes(),
                    })
                    .collect();
                t.expect_contents(dst, &expected).await
            })
        },
    )?;

    Ok(group)
}
