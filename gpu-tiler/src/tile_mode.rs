//! Per-tile-mode offset math: "pure functions mapping
//! (x,y,z,mip,array,tile-mode,extent,format) -> linear offset and vice versa". Four
//! tile-mode families are implemented, matching [`gpu_types::TileMode`]:
//!
//! - [`TileMode::DisplayLinear`]: row-major, no tiling.
//! - [`TileMode::ThinMicro`]: 8x8 micro tiles, Morton-swizzled within the tile.
//! - [`TileMode::ThinMacro`]: 2x2 groups of [`TileMode::ThinMicro`] tiles,
//!   Morton-swizzled at the macro-tile level too (AMD's macro tiling additionally
//!   distributes tiles across memory banks/pipes; this crate models the swizzle
//!   without modeling bank/pipe count, since nothing downstream depends on that level
//!   of physical accuracy, only on a bijective, deterministic layout).
//! - [`TileMode::Thick`]: 8x8x4 micro tiles (z folds into the micro tile), Morton
//!   swizzled in three dimensions.
//!
//! Every `tile`/`detile` pair here is written as forward arithmetic plus its algebraic
//! inverse (not two independently-derived implementations), so the involution property
//! holds by construction for any in-range coordinate.

use gpu_types::TileMode;

use crate::morton::{decode2, decode3, encode2, encode3};

const MICRO_TILE_DIM: u32 = 8;
const MICRO_TILE_DEPTH: u32 = 4;
const MACRO_GROUP: u32 = 2;

fn div_round_up(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// Parameters describing one 3-D surface slice (a single mip level, single array
/// layer) to be tiled/detiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileParams {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Row pitch in texels/blocks; must be >= `width`.
    pub pitch: u32,
    /// Bytes per texel or compressed block.
    pub bpp: u32,
    pub tile_mode: TileMode,
}

impl TileParams {
    fn tiles_per_row(self) -> u32 {
        div_round_up(self.pitch, MICRO_TILE_DIM)
    }

    fn tiles_per_column(self) -> u32 {
        div_round_up(self.height, MICRO_TILE_DIM)
    }

    fn slices(self) -> u32 {
        match self.tile_mode {
            TileMode::Thick => div_round_up(self.depth.max(1), MICRO_TILE_DEPTH),
            _ => self.depth.max(1),
        }
    }

    /// Total byte size of this slice's addressable tiled volume (an upper bound valid
    /// for every tile mode: every `(x,y,z)` in range maps inside `[0, total_bytes)`).
    pub fn total_bytes(self) -> u64 {
        let elements = match self.tile_mode {
            TileMode::DisplayLinear => self.pitch as u64 * self.height as u64 * self.depth.max(1) as u64,
            TileMode::ThinMicro | TileMode::ThinMacro => {
                self.tiles_per_row() as u64 * self.tiles_per_column() as u64 * 64 * self.depth.max(1) as u64
            }
            TileMode::Thick => {
                self.tiles_per_row() as u64 * self.tiles_per_column() as u64 * self.slices() as u64 * 256
            }
        };
        elements * self.bpp as u64
    }
}

/// Map `(x,y,z)` (0-based texel coordinates within this slice) to a byte offset.
///
/// `x < pitch`, `y < height`, `z < depth` (callers index mip/array slicing via
/// [`SurfaceParams`] rather than by extending the ranges here).
pub fn tile(params: TileParams, x: u32, y: u32, z: u32) -> u64 {
    let bpp = params.bpp as u64;
    match params.tile_mode {
        TileMode::DisplayLinear => {
            ((z as u64 * params.height as u64 + y as u64) * params.pitch as u64 + x as u64) * bpp
        }
        TileMode::ThinMicro => {
            let (tx, ty) = (x / MICRO_TILE_DIM, y / MICRO_TILE_DIM);
            let (mx, my) = (x % MICRO_TILE_DIM, y % MICRO_TILE_DIM);
            let micro_index = encode2(mx, my) as u64;
            let tile_index = ty as u64 * params.tiles_per_row() as u64 + tx as u64;
            let plane_tiles = params.tiles_per_row() as u64 * params.tiles_per_column() as u64;
            (z as u64 * plane_tiles + tile_index) * 64 * bpp + micro_index * bpp
        }
        TileMode::ThinMacro => {
            let (tx, ty) = (x / MICRO_TILE_DIM, y / MICRO_TILE_DIM);
            let (mx, my) = (x % MICRO_TILE_DIM, y % MICRO_TILE_DIM);
            let micro_index = encode2(mx, my) as u64;
            let (macro_tx, macro_ty) = (tx / MACRO_GROUP, ty / MACRO_GROUP);
            let (sub_x, sub_y) = (tx % MACRO_GROUP, ty % MACRO_GROUP);
            let sub_index = encode2(sub_x, sub_y) as u64;
            let macro_tiles_per_row = div_round_up(params.tiles_per_row(), MACRO_GROUP) as u64;
            let macro_index = macro_ty as u64 * macro_tiles_per_row + macro_tx as u64;
            let tile_index = macro_index * (MACRO_GROUP * MACRO_GROUP) as u64 + sub_index;
            let plane_tiles = params.tiles_per_row() as u64 * params.tiles_per_column() as u64;
            (z as u64 * plane_tiles + tile_index) * 64 * bpp + micro_index * bpp
        }
        TileMode::Thick => {
            let (tx, ty, tz) = (x / MICRO_TILE_DIM, y / MICRO_TILE_DIM, z / MICRO_TILE_DEPTH);
            let (mx, my, mz) = (x % MICRO_TILE_DIM, y % MICRO_TILE_DIM, z % MICRO_TILE_DEPTH);
            let micro_index = encode3(mx, my, mz) as u64;
            let tiles_per_row = params.tiles_per_row() as u64;
            let tiles_per_col = params.tiles_per_column() as u64;
            let tile_index = (tz as u64 * tiles_per_col + ty as u64) * tiles_per_row + tx as u64;
            tile_index * 256 * bpp + micro_index * bpp
        }
    }
}

/// Exact inverse of [`tile`]: given a byte offset produced by `tile(params, x, y, z)`,
/// recover `(x, y, z)`.
pub fn detile(params: TileParams, offset: u64) -> (u32, u32, u32) {
    let bpp = params.bpp as u64;
    let elem = offset / bpp;
    match params.tile_mode {
        TileMode::DisplayLinear => {
            let x = (elem % params.pitch as u64) as u32;
            let rem = elem / params.pitch as u64;
            let y = (rem % params.height as u64) as u32;
            let z = (rem / params.height as u64) as u32;
            (x, y, z)
        }
        TileMode::ThinMicro => {
            let micro_index = (elem % 64) as u32;
            let plane_tiles = params.tiles_per_row() as u64 * params.tiles_per_column() as u64;
            let tile_and_z = elem / 64;
            let z = (tile_and_z / plane_tiles) as u32;
            let tile_index = tile_and_z % plane_tiles;
            let ty = (tile_index / params.tiles_per_row() as u64) as u32;
            let tx = (tile_index % params.tiles_per_row() as u64) as u32;
            let (mx, my) = decode2(micro_index);
            (tx * MICRO_TILE_DIM + mx, ty * MICRO_TILE_DIM + my, z)
        }
        TileMode::ThinMacro => {
            let micro_index = (elem % 64) as u32;
            let plane_tiles = params.tiles_per_row() as u64 * params.tiles_per_column() as u64;
            let tile_and_z = elem / 64;
            let z = (tile_and_z / plane_tiles) as u32;
            let tile_index = tile_and_z % plane_tiles;
            let macro_tiles_per_row = div_round_up(params.tiles_per_row(), MACRO_GROUP) as u64;
            let sub_index = (tile_index % (MACRO_GROUP * MACRO_GROUP) as u64) as u32;
            let macro_index = tile_index / (MACRO_GROUP * MACRO_GROUP) as u64;
            let macro_ty = (macro_index / macro_tiles_per_row) as u32;
            let macro_tx = (macro_index % macro_tiles_per_row) as u32;
            let (sub_x, sub_y) = decode2(sub_index);
            let tx = macro_tx * MACRO_GROUP + sub_x;
            let ty = macro_ty * MACRO_GROUP + sub_y;
            let (mx, my) = decode2(micro_index);
            (tx * MICRO_TILE_DIM + mx, ty * MICRO_TILE_DIM + my, z)
        }
        TileMode::Thick => {
            let micro_index = (elem % 256) as u32;
            let tiles_per_row = params.tiles_per_row() as u64;
            let tiles_per_col = params.tiles_per_column() as u64;
            let tile_index = elem / 256;
            let tx = (tile_index % tiles_per_row) as u32;
            let rem = tile_index / tiles_per_row;
            let ty = (rem % tiles_per_col) as u32;
            let tz = (rem / tiles_per_col) as u32;
            let (mx, my, mz) = decode3(micro_index);
            (
                tx * MICRO_TILE_DIM + mx,
                ty * MICRO_TILE_DIM + my,
                tz * MICRO_TILE_DEPTH + mz,
            )
        }
    }
}

/// Full `(mip, array)`-aware surface: a chain of mip levels (half extent each,
/// minimum 1), repeated per array layer, matching `ImageKey`'s
/// `base_mip/mip_count`, `base_array_layer/array_layer_count` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceParams {
    pub base: TileParams,
    pub mip_count: u32,
}

impl SurfaceParams {
    /// `TileParams` for mip level `mip` (extents halved, minimum 1; pitch re-derived
    /// from the halved width so each mip packs tightly).
    pub fn mip_params(self, mip: u32) -> TileParams {
        let shift = |v: u32| (v >> mip).max(1);
        let width = shift(self.base.width);
        TileParams {
            width,
            height: shift(self.base.height),
            depth: shift(self.base.depth),
            pitch: width.max(match self.base.tile_mode {
                TileMode::DisplayLinear => width,
                _ => div_round_up(width, MICRO_TILE_DIM) * MICRO_TILE_DIM,
            }),
            bpp: self.base.bpp,
            tile_mode: self.base.tile_mode,
        }
    }

    /// Byte offset of mip level `mip`'s first texel, relative to the start of its
    /// array layer.
    pub fn mip_base_offset(self, mip: u32) -> u64 {
        (0..mip).map(|m| self.mip_params(m).total_bytes()).sum()
    }

    /// Total bytes for one array layer (every mip level's surface, concatenated).
    pub fn layer_size(self) -> u64 {
        (0..self.mip_count).map(|m| self.mip_params(m).total_bytes()).sum()
    }

    /// Absolute byte offset of texel `(x,y,z)` at `(mip, array_layer)`.
    pub fn offset(self, mip: u32, array_layer: u32, x: u32, y: u32, z: u32) -> u64 {
        array_layer as u64 * self.layer_size() + self.mip_base_offset(mip) + tile(self.mip_params(mip), x, y, z)
    }

    /// Inverse of [`SurfaceParams::offset`]: given an absolute byte offset, recover
    /// `(mip, array_layer, x, y, z)`.
    pub fn locate(self, offset: u64) -> (u32, u32, u32, u32, u32) {
        let layer_size = self.layer_size();
        let (array_layer, within_layer) = if layer_size == 0 {
            (0, offset)
        } else {
            ((offset / layer_size) as u32, offset % layer_size)
        };

        let mut mip = 0;
        let mut base = 0u64;
        for m in 0..self.mip_count {
            let size = self.mip_params(m).total_bytes();
            if within_layer < base + size || m + 1 == self.mip_count {
                mip = m;
                break;
            }
            base += size;
        }

        let (x, y, z) = detile(self.mip_params(mip), within_layer - base);
        (mip, array_layer, x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params_for(mode: TileMode) -> TileParams {
        TileParams { width: 37, height: 23, depth: 5, pitch: 40, bpp: 4, tile_mode: mode }
    }

    fn modes() -> [TileMode; 4] {
        [TileMode::DisplayLinear, TileMode::ThinMicro, TileMode::ThinMacro, TileMode::Thick]
    }

    proptest! {
        #[test]
        fn tile_detile_is_an_involution(
            xi in 0u32..37, yi in 0u32..23, zi in 0u32..5,
        ) {
            for mode in modes() {
                let params = params_for(mode);
                let off = tile(params, xi, yi, zi);
                let (x, y, z) = detile(params, off);
                prop_assert_eq!((x, y, z), (xi, yi, zi), "tile_mode = {:?}", mode);
            }
        }
    }

    #[test]
    fn distinct_coordinates_map_to_distinct_offsets() {
        for mode in modes() {
            let params = params_for(mode);
            let mut seen = std::collections::HashSet::new();
            for y in 0..params.height.min(9) {
                for x in 0..params.width.min(9) {
                    let off = tile(params, x, y, 0);
                    assert!(seen.insert(off), "collision at ({x},{y}) for {mode:?}");
                }
            }
        }
    }

    #[test]
    fn surface_params_roundtrip_through_mips_and_layers() {
        let surf = SurfaceParams {
            base: TileParams { width: 64, height: 64, depth: 1, pitch: 64, bpp: 4, tile_mode: TileMode::ThinMicro },
            mip_count: 4,
        };
        for array_layer in 0..3 {
            for mip in 0..surf.mip_count {
                let p = surf.mip_params(mip);
                let (x, y, z) = (p.width.saturating_sub(1).min(3), p.height.saturating_sub(1).min(2), 0);
                let off = surf.offset(mip, array_layer, x, y, z);
                let (got_mip, got_layer, gx, gy, gz) = surf.locate(off);
                assert_eq!((got_mip, got_layer, gx, gy, gz), (mip, array_layer, x, y, z));
            }
        }
    }
}
