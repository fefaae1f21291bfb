//! The bundled test catalogue.
//!
//! Each module exposes a `group()` function that registers its tests; this
//! module mounts them into the `webgpu` suite.

pub mod compute_basic;
pub mod copy_buffer;
pub mod copy_texture;

use crate::registry::Suite;
use crate::CtsError;

pub const SUITE_NAME: &str = "webgpu";

/// Builds the `webgpu` suite.
pub fn webgpu_suite() -> Result<Suite, CtsError> {
    Suite::new(SUITE_NAME)?
        .group("command_buffer/compute/basic", compute_basic::group()?)?
        .group("api/validation/copy_buffer_to_buffer", copy_buffer::group()?)?
        .group(
            "api/validation/copy_between_linear_data_and_texture",
            copy_texture::group()?,
        )
}
