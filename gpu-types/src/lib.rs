//! Fingerprint keys, stage/access enums, and wire constants shared by every crate in
//! the workspace: a dependency-free leaf everything else builds on.

pub mod access;
pub mod binding;
pub mod interval_map;
pub mod pixel_format;
pub mod range;
pub mod stage;
pub mod tag;
pub mod vm;

pub use access::{Access, AccessOp};
pub use binding::UniformKind;
pub use interval_map::IntervalMap;
pub use pixel_format::{DataFormat, FlipType, NumericFormat, PixelFormatError};
pub use range::AddressRange;
pub use stage::Stage;
pub use tag::TagId;
pub use vm::VmId;

use bytemuck::{Pod, Zeroable};

/// `{address, stage, environment}`: identifies a translated shader program.
///
/// Two `ShaderKey`s with the same address and stage but different environments are
/// different cache entries: the environment bag captures every producer-visible input
/// that can change codegen (user SGPR values, viewport geometry, primitive topology,
/// fragment-input interpolation mode).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    pub address: u64,
    pub stage: Stage,
    pub environment: Environment,
}

/// Per-pipeline constants that influence GCN→SPIR-V translation without changing the
/// shader's source bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Environment {
    pub user_sgprs: arrayvec::ArrayVec<u32, 16>,
    pub primitive_type: PrimitiveType,
    pub ps_input_vgprs: PsInputVgprs,
    pub viewport_count: u8,
    pub interpolation: InterpolationModes,
    /// `ShaderKey` this one depends on, e.g. a PS keyed on its paired VS output
    /// interface.
    pub dependent: Option<Box<ShaderKey>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
    AdjacentLineList,
    AdjacentTriangleList,
}

/// Bit-per-attribute fragment VGPR input layout (perspective/linear sample toggles,
/// barycentric coordinates, front-face, ancillary data). Stored as a raw bitmask; the
/// converter interprets individual bits when constructing the FS entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PsInputVgprs(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InterpolationModes(pub u32);

/// Image dimensionality, independent of the `ImageKey::aspect` classification below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDimension {
    D1,
    D2,
    D3,
    Cube,
    Array1D,
    Array2D,
    ArrayCube,
}

/// Whether an image is used as a color target, a depth target, or a stencil target.
/// `getImage`/`getImageView` create separate aspects for `Depth`/`Stencil` images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAspect {
    Color,
    Depth,
    Stencil,
}

/// AMD 2-D memory tile-mode family. `gpu-tiler` implements the offset math for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileMode {
    DisplayLinear,
    ThinMicro,
    ThinMacro,
    Thick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub dim: ImageDimension,
    pub data_format: DataFormat,
    pub numeric_format: NumericFormat,
    pub tile_mode: TileMode,
    pub extent: Extent3D,
    pub pitch: u32,
    pub base_mip: u16,
    pub mip_count: u16,
    pub base_array_layer: u16,
    pub array_layer_count: u16,
    pub aspect: ImageAspect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirrorRepeat,
    ClampToEdge,
    ClampToBorder,
    MirrorClampToEdge,
}

/// The exact Vulkan sampler parameters derivable from a GCN `S#` (SSampler) wire
/// descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub anisotropy_clamp: Option<u8>,
    pub compare_enable: bool,
    pub min_lod_bits: u32,
    pub max_lod_bits: u32,
    pub lod_bias_bits: u32,
    pub border_color_opaque_black: bool,
}
