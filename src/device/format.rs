use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Extent3d, TextureDataLayout};

/// The sized texture formats the harness knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    #[serde(rename = "r8unorm")]
    R8Unorm,
    #[serde(rename = "rg8unorm")]
    Rg8Unorm,
    #[serde(rename = "rgba8unorm")]
    Rgba8Unorm,
    #[serde(rename = "bgra8unorm")]
    Bgra8Unorm,
    #[serde(rename = "r32float")]
    R32Float,
    #[serde(rename = "rg32float")]
    Rg32Float,
    #[serde(rename = "rgba32float")]
    Rgba32Float,
    #[serde(rename = "bc1-rgba-unorm")]
    Bc1RgbaUnorm,
    #[serde(rename = "bc3-rgba-unorm")]
    Bc3RgbaUnorm,
    #[serde(rename = "depth32float")]
    Depth32Float,
}

/// Block layout and copy capabilities of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub bytes_per_block: u32,
    pub block_width: u32,
    pub block_height: u32,
    pub copy_src: bool,
    pub copy_dst: bool,
}

impl FormatInfo {
    const fn color(bytes_per_block: u32) -> Self {
        Self {
            bytes_per_block,
            block_width: 1,
            block_height: 1,
            copy_src: true,
            copy_dst: true,
        }
    }

    const fn compressed(bytes_per_block: u32) -> Self {
        Self {
            bytes_per_block,
            block_width: 4,
            block_height: 4,
            copy_src: true,
            copy_dst: true,
        }
    }
}

impl TextureFormat {
    pub const ALL: [TextureFormat; 10] = [
        TextureFormat::R8Unorm,
        TextureFormat::Rg8Unorm,
        TextureFormat::Rgba8Unorm,
        TextureFormat::Bgra8Unorm,
        TextureFormat::R32Float,
        TextureFormat::Rg32Float,
        TextureFormat::Rgba32Float,
        TextureFormat::Bc1RgbaUnorm,
        TextureFormat::Bc3RgbaUnorm,
        TextureFormat::Depth32Float,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextureFormat::R8Unorm => "r8unorm",
            TextureFormat::Rg8Unorm => "rg8unorm",
            TextureFormat::Rgba8Unorm => "rgba8unorm",
            TextureFormat::Bgra8Unorm => "bgra8unorm",
            TextureFormat::R32Float => "r32float",
            TextureFormat::Rg32Float => "rg32float",
            TextureFormat::Rgba32Float => "rgba32float",
            TextureFormat::Bc1RgbaUnorm => "bc1-rgba-unorm",
            TextureFormat::Bc3RgbaUnorm => "bc3-rgba-unorm",
            TextureFormat::Depth32Float => "depth32float",
        }
    }

    pub fn info(&self) -> FormatInfo {
        match self {
            TextureFormat::R8Unorm => FormatInfo::color(1),
            TextureFormat::Rg8Unorm => FormatInfo::color(2),
            TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm | TextureFormat::R32Float => {
                FormatInfo::color(4)
            }
            TextureFormat::Rg32Float => FormatInfo::color(8),
            TextureFormat::Rgba32Float => FormatInfo::color(16),
            TextureFormat::Bc1RgbaUnorm => FormatInfo::compressed(8),
            TextureFormat::Bc3RgbaUnorm => FormatInfo::compressed(16),
            // Depth can be read back but not written by copies.
            TextureFormat::Depth32Float => FormatInfo {
                copy_dst: false,
                ..FormatInfo::color(4)
            },
        }
    }

    /// Bytes of one full row of blocks for a copy `width` texels wide.
    pub fn bytes_in_complete_row(&self, width: u32) -> u64 {
        let info = self.info();
        u64::from(width / info.block_width) * u64::from(info.bytes_per_block)
    }
}

/// Number of bytes a linear-data/texture copy touches, starting at `layout.offset`.
///
/// Assumes the extent is aligned to the format's texel blocks. Saturates at
/// `u64::MAX` instead of wrapping.
pub fn required_bytes_in_copy(
    layout: &TextureDataLayout,
    format: TextureFormat,
    size: Extent3d,
) -> u64 {
    if size.is_empty() {
        return 0;
    }
    let info = format.info();
    let bytes_per_row = u64::from(layout.bytes_per_row);
    let rows_per_image = match layout.rows_per_image {
        0 => size.height,
        rows => rows,
    };
    let bytes_per_image = bytes_per_row.saturating_mul(u64::from(rows_per_image / info.block_height));
    let block_rows = u64::from(size.height / info.block_height);
    let bytes_in_last_slice = bytes_per_row
        .saturating_mul(block_rows.saturating_sub(1))
        .saturating_add(format.bytes_in_complete_row(size.width));
    bytes_per_image
        .saturating_mul(u64::from(size.depth - 1))
        .saturating_add(bytes_in_last_slice)
}

impl std::fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TextureFormat> for Value {
    fn from(format: TextureFormat) -> Self {
        Value::String(format.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_serde_representation() {
        for format in TextureFormat::ALL {
            let json = serde_json::to_value(format).unwrap();
            assert_eq!(json, Value::from(format));
            let back: TextureFormat = serde_json::from_value(json).unwrap();
            assert_eq!(back, format);
        }
    }

    #[test]
    fn required_bytes_cover_last_row_only_partially() {
        let layout = TextureDataLayout {
            offset: 0,
            bytes_per_row: 256,
            rows_per_image: 0,
        };
        // Two full rows of stride plus one tightly packed row.
        let size = Extent3d::new(4, 3, 1);
        assert_eq!(
            required_bytes_in_copy(&layout, TextureFormat::Rgba8Unorm, size),
            256 * 2 + 16
        );
        // A second image adds a full image stride.
        let size = Extent3d::new(4, 3, 2);
        assert_eq!(
            required_bytes_in_copy(&layout, TextureFormat::Rgba8Unorm, size),
            256 * 3 + 256 * 2 + 16
        );
        assert_eq!(
            required_bytes_in_copy(&layout, TextureFormat::Rgba8Unorm, Extent3d::new(0, 3, 1)),
            0
        );
    }

    #[test]
    fn compressed_rows_count_blocks() {
        assert_eq!(TextureFormat::Bc1RgbaUnorm.bytes_in_complete_row(8), 16);
        assert_eq!(TextureFormat::Rgba8Unorm.bytes_in_complete_row(3), 12);
    }
}
