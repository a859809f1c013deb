//! `SamplerKey` → `VkSamplerCreateInfo`.

use ash::vk;
use gpu_types::{AddressMode, Filter, MipmapMode, SamplerKey};

fn filter(f: Filter) -> vk::Filter {
    match f {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

fn mipmap_mode(m: MipmapMode) -> vk::SamplerMipmapMode {
    match m {
        MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

fn address_mode(a: AddressMode) -> vk::SamplerAddressMode {
    match a {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        AddressMode::MirrorClampToEdge => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

/// LOD/bias values are stored bit-for-bit in `SamplerKey`; reinterpret to `f32` here at
/// the one site that actually needs the float value.
fn lod(bits: u32) -> f32 {
    f32::from_bits(bits)
}

pub fn create_info(key: &SamplerKey) -> vk::SamplerCreateInfo {
    let mut builder = vk::SamplerCreateInfo::builder()
        .mag_filter(filter(key.mag_filter))
        .min_filter(filter(key.min_filter))
        .mipmap_mode(mipmap_mode(key.mipmap_mode))
        .address_mode_u(address_mode(key.address_u))
        .address_mode_v(address_mode(key.address_v))
        .address_mode_w(address_mode(key.address_w))
        .min_lod(lod(key.min_lod_bits))
        .max_lod(lod(key.max_lod_bits))
        .mip_lod_bias(lod(key.lod_bias_bits))
        .compare_enable(key.compare_enable)
        .compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .border_color(if key.border_color_opaque_black {
            vk::BorderColor::FLOAT_OPAQUE_BLACK
        } else {
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK
        });
    if let Some(max_anisotropy) = key.anisotropy_clamp {
        builder = builder.anisotropy_enable(true).max_anisotropy(max_anisotropy as f32);
    }
    builder.build()
}
