//! Pixel-format → (dfmt, nfmt, FlipType) table. The producer hands the present
//! engine a raw 32-bit pixel format word (the PS4 "orbis" enumerants); this module is
//! the fixed switch that resolves it to the Vulkan-ish `(DataFormat, NumericFormat)`
//! pair and the blit variant (`FlipType`) the flip pipeline picks for it. Unknown
//! values are fatal at the façade boundary; this module only reports the
//! error, it does not abort.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFormat {
    Rgba8,
    Rgb10A2,
    Rgba16Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericFormat {
    Srgb,
    SNorm,
    Float,
}

/// Which variant of the flip pipeline's detile blit to run. The two original pixel
/// formats that differ only in padding bits (0x80000000 vs 0x80002200) still select
/// different variants, so `FlipType` is carried alongside the format pair rather than
/// derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlipType {
    Std,
    Alt,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown guest pixel format 0x{0:08X}")]
pub struct PixelFormatError(pub u32);

/// Resolve a guest pixel-format word to `(dfmt, nfmt, FlipType)` 
pub fn resolve(pixel_format: u32) -> Result<(DataFormat, NumericFormat, FlipType), PixelFormatError> {
    match pixel_format {
        0x80000000 => Ok((DataFormat::Rgba8, NumericFormat::Srgb, FlipType::Alt)),
        0x80002200 => Ok((DataFormat::Rgba8, NumericFormat::Srgb, FlipType::Std)),
        0x88000000 => Ok((DataFormat::Rgb10A2, NumericFormat::Srgb, FlipType::Alt)),
        0x88060000 | 0x88740000 => Ok((DataFormat::Rgb10A2, NumericFormat::SNorm, FlipType::Alt)),
        0xC1060000 => Ok((DataFormat::Rgba16Float, NumericFormat::Float, FlipType::Alt)),
        other => Err(PixelFormatError(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_formats_resolve() {
        assert_eq!(
            resolve(0x80000000).unwrap(),
            (DataFormat::Rgba8, NumericFormat::Srgb, FlipType::Alt)
        );
        assert_eq!(
            resolve(0xC1060000).unwrap(),
            (DataFormat::Rgba16Float, NumericFormat::Float, FlipType::Alt)
        );
    }

    #[test]
    fn padded_variant_differs_only_in_flip_type() {
        let (d1, n1, f1) = resolve(0x80000000).unwrap();
        let (d2, n2, f2) = resolve(0x80002200).unwrap();
        assert_eq!((d1, n1), (d2, n2));
        assert_ne!(f1, f2);
    }

    #[test]
    fn unknown_format_is_an_error() {
        assert_eq!(resolve(0x1234).unwrap_err(), PixelFormatError(0x1234));
    }
}
