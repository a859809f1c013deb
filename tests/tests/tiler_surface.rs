//! A mip-chained, multi-layer surface's `offset`/`locate` pair round-trips across
//! every mip level and array layer, not just the single-slice `tile`/`detile`
//! involution each tile mode's own unit tests already cover.

use gpu_tiler::{SurfaceParams, TileMode, TileParams};

fn surface(tile_mode: TileMode) -> SurfaceParams {
    SurfaceParams {
        base: TileParams { width: 64, height: 64, depth: 1, pitch: 64, bpp: 4, tile_mode },
        mip_count: 4,
    }
}

#[test]
fn offset_then_locate_recovers_the_same_coordinates_at_every_mip_level() {
    for tile_mode in [TileMode::DisplayLinear, TileMode::ThinMicro, TileMode::ThinMacro] {
        let surface = surface(tile_mode);
        for mip in 0..surface.mip_count {
            let params = surface.mip_params(mip);
            let (x, y) = (params.width.saturating_sub(1).min(3), params.height.saturating_sub(1).min(3));
            let array_layer = 1;
            let offset = surface.offset(mip, array_layer, x, y, 0);
            let (located_mip, located_layer, lx, ly, _lz) = surface.locate(offset);
            assert_eq!((located_mip, located_layer, lx, ly), (mip, array_layer, x, y), "tile_mode = {tile_mode:?}, mip = {mip}");
        }
    }
}

#[test]
fn successive_mip_levels_occupy_disjoint_byte_ranges() {
    let surface = surface(TileMode::ThinMicro);
    let mut previous_end = 0u64;
    for mip in 0..surface.mip_count {
        let begin = surface.mip_base_offset(mip);
        assert!(begin >= previous_end, "mip {mip} starts before the previous mip's region ends");
        previous_end = begin + surface.mip_params(mip).total_bytes();
    }
}
