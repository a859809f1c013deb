//! Struct-pointer-type resolution for the symbolic descriptor-chain walk. Building the
//! pointer type to "the struct the caller is asking about" must key off the
//! caller-supplied member list, not compare a candidate type against itself.
//! See `gcn_ir::Context::get_struct_pointer_type` for the underlying dedup.

use gcn_ir::context::Context;
use gcn_ir::handle::Handle;
use gcn_ir::ir::{StorageClass, Type};

/// Builds (or reuses) the IR struct type matching a V#/T#/S# wire layout, as a sequence
/// of scalar member types, and returns a pointer to it in physical storage buffer
/// space, the storage class every GCN memory-read op (`SMRD`, `MUBUF`, `MTBUF`,
/// `MIMG`) targets once its descriptor chain is resolved.
pub fn descriptor_pointer_type(ctx: &mut Context, member_word_count: usize) -> Handle<Type> {
    let u32_ty = ctx.type_int(32, false);
    let members: Vec<Handle<Type>> = std::iter::repeat(u32_ty).take(member_word_count).collect();
    ctx.get_struct_pointer_type(&members, StorageClass::StorageBuffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_word_count_reuses_the_same_struct_pointer() {
        let mut ctx = Context::new();
        let a = descriptor_pointer_type(&mut ctx, 4); // V#
        let b = descriptor_pointer_type(&mut ctx, 4);
        let c = descriptor_pointer_type(&mut ctx, 8); // T#
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
