//! `(DataFormat, NumericFormat)` → `vk::Format`, the cache-side counterpart of
//! `gpu_types::pixel_format::resolve` (which maps a raw guest pixel-format word to the
//! same `DataFormat`/`NumericFormat` pair `gpu-present`, C8, consumes for the swapchain
//! surface). Cache images are keyed on the pair directly since `ImageKey` already
//! carries it resolved from the guest `T#` descriptor.

use ash::vk;
use gpu_types::{DataFormat, NumericFormat};

pub fn resolve(data: DataFormat, numeric: NumericFormat) -> (vk::Format, NumericFormat) {
    let format = match (data, numeric) {
        (DataFormat::Rgba8, NumericFormat::Srgb) => vk::Format::R8G8B8A8_SRGB,
        (DataFormat::Rgba8, _) => vk::Format::R8G8B8A8_UNORM,
        (DataFormat::Rgb10A2, NumericFormat::SNorm) => vk::Format::A2B10G10R10_SNORM_PACK32,
        (DataFormat::Rgb10A2, _) => vk::Format::A2B10G10R10_UNORM_PACK32,
        (DataFormat::Rgba16Float, _) => vk::Format::R16G16B16A16_SFLOAT,
    };
    (format, numeric)
}
