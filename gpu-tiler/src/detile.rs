//! Detile SPIR-V helper-function generation: the CPU-side arithmetic in
//! [`crate::tile_mode::detile`], re-expressed as `gcn-ir` IR so `gcn-shader`'s
//! converter can splice it into a shader as an ordinary function.
//!
//! Only the [`gpu_types::TileMode::ThinMicro`] family is emitted as a shader helper:
//! it is the tile mode the flip pipeline's detile blit and sampled-texture detiling
//! actually run at shader time (linear needs no helper; macro/thick detiling happens
//! host-side during cache upload, per `gpu-cache`'s image acquisition path).

use gcn_ir::builder::FunctionBuilder;
use gcn_ir::context::Context;
use gcn_ir::handle::Handle;
use gcn_ir::ir::{BinaryOp, Function, Location};

/// Emit `uint detile_thin_micro(uint x, uint y, uint tiles_per_row)` computing the
/// byte-offset-free tile index used by [`crate::tile_mode::tile`]'s `ThinMicro` case
/// (`tile_index = (y/8)*tiles_per_row + (x/8)`; the micro-tile Morton swizzle is a
/// constant bit-permutation the caller applies separately since it does not depend on
/// `tiles_per_row`).
pub fn build_detile_thin_micro_tile_index(ctx: &mut Context) -> Handle<Function> {
    let u32_ty = ctx.type_int(32, false);
    let mut fb = FunctionBuilder::new(Some("detile_thin_micro_tile_index".to_string()))
        .with_result(Some(u32_ty))
        .with_arguments(vec![u32_ty, u32_ty, u32_ty]); // x, y, tiles_per_row

    let x = fb.emit_argument(Location::UNKNOWN, 0);
    let y = fb.emit_argument(Location::UNKNOWN, 1);
    let tiles_per_row = fb.emit_argument(Location::UNKNOWN, 2);

    let three = ctx.constant_u32(3);
    let three = fb.emit_constant(Location::UNKNOWN, three);

    let tx = fb.emit_binary(Location::UNKNOWN, BinaryOp::ShiftRight, x, three);
    let ty = fb.emit_binary(Location::UNKNOWN, BinaryOp::ShiftRight, y, three);
    let ty_times_stride = fb.emit_binary(Location::UNKNOWN, BinaryOp::Multiply, ty, tiles_per_row);
    let tile_index = fb.emit_binary(Location::UNKNOWN, BinaryOp::Add, ty_times_stride, tx);
    fb.emit_return(Some(tile_index));

    ctx.append_function(fb.finish())
}

/// Emit `uint morton_encode2(uint x, uint y)`, the micro-tile swizzle shared by
/// `ThinMicro` and `ThinMacro` (mirrors [`crate::morton::encode2`] bit-for-bit).
pub fn build_morton_encode2(ctx: &mut Context) -> Handle<Function> {
    let u32_ty = ctx.type_int(32, false);
    let mut fb = FunctionBuilder::new(Some("morton_encode2".to_string()))
        .with_result(Some(u32_ty))
        .with_arguments(vec![u32_ty, u32_ty]);

    let x = fb.emit_argument(Location::UNKNOWN, 0);
    let y = fb.emit_argument(Location::UNKNOWN, 1);

    // Three spread-and-mask rounds, same shape as `spread_bits16` for the 0..8 range
    // the micro-tile coordinates live in: one OR-shift-AND round per doubling.
    let spread = |fb: &mut FunctionBuilder, ctx: &mut Context, v: Handle<gcn_ir::ir::Expression>| {
        let shift4 = ctx.constant_u32(4);
        let shift4 = fb.emit_constant(Location::UNKNOWN, shift4);
        let mask = ctx.constant_u32(0x0F0F_0F0F);
        let mask = fb.emit_constant(Location::UNKNOWN, mask);
        let shifted = fb.emit_binary(Location::UNKNOWN, BinaryOp::ShiftLeft, v, shift4);
        let ored = fb.emit_binary(Location::UNKNOWN, BinaryOp::Or, v, shifted);
        let step1 = fb.emit_binary(Location::UNKNOWN, BinaryOp::And, ored, mask);

        let shift2 = ctx.constant_u32(2);
        let shift2 = fb.emit_constant(Location::UNKNOWN, shift2);
        let mask2 = ctx.constant_u32(0x3333_3333);
        let mask2 = fb.emit_constant(Location::UNKNOWN, mask2);
        let shifted2 = fb.emit_binary(Location::UNKNOWN, BinaryOp::ShiftLeft, step1, shift2);
        let ored2 = fb.emit_binary(Location::UNKNOWN, BinaryOp::Or, step1, shifted2);
        let step2 = fb.emit_binary(Location::UNKNOWN, BinaryOp::And, ored2, mask2);

        let shift1 = ctx.constant_u32(1);
        let shift1 = fb.emit_constant(Location::UNKNOWN, shift1);
        let mask3 = ctx.constant_u32(0x5555_5555);
        let mask3 = fb.emit_constant(Location::UNKNOWN, mask3);
        let shifted3 = fb.emit_binary(Location::UNKNOWN, BinaryOp::ShiftLeft, step2, shift1);
        let ored3 = fb.emit_binary(Location::UNKNOWN, BinaryOp::Or, step2, shifted3);
        fb.emit_binary(Location::UNKNOWN, BinaryOp::And, ored3, mask3)
    };

    let sx = spread(&mut fb, ctx, x);
    let sy = spread(&mut fb, ctx, y);
    let one = ctx.constant_u32(1);
    let one = fb.emit_constant(Location::UNKNOWN, one);
    let sy_shifted = fb.emit_binary(Location::UNKNOWN, BinaryOp::ShiftLeft, sy, one);
    let result = fb.emit_binary(Location::UNKNOWN, BinaryOp::Or, sx, sy_shifted);
    fb.emit_return(Some(result));

    ctx.append_function(fb.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detile_helper_functions_build_without_panicking() {
        let mut ctx = Context::new();
        let tile_index_fn = build_detile_thin_micro_tile_index(&mut ctx);
        let morton_fn = build_morton_encode2(&mut ctx);
        assert_ne!(ctx.region.functions.get(tile_index_fn).body.len(), 0);
        assert_ne!(ctx.region.functions.get(morton_fn).body.len(), 0);
    }
}
