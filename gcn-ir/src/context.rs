use crate::handle::Handle;
use crate::ir::{
    Capability, Constant, EntryPoint, Function, GlobalVariable, Region, StorageClass, Type,
};

/// Owns all IR storage for one translation unit. Values elsewhere in the IR are
/// [`Handle`]s into this context's arenas.
#[derive(Debug, Default)]
pub struct Context {
    pub region: Region,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn require_capability(&mut self, cap: Capability) {
        if !self.region.capabilities.contains(&cap) {
            self.region.capabilities.push(cap);
        }
    }

    pub fn type_void(&mut self) -> Handle<Type> {
        self.region.types.append_deduped(Type::Void)
    }

    pub fn type_bool(&mut self) -> Handle<Type> {
        self.region.types.append_deduped(Type::Bool)
    }

    pub fn type_int(&mut self, width: u8, signed: bool) -> Handle<Type> {
        self.region.types.append_deduped(Type::Int { width, signed })
    }

    pub fn type_float(&mut self, width: u8) -> Handle<Type> {
        self.region.types.append_deduped(Type::Float { width })
    }

    pub fn type_vector(&mut self, scalar: Handle<Type>, size: u8) -> Handle<Type> {
        self.region.types.append_deduped(Type::Vector { scalar, size })
    }

    pub fn type_pointer(&mut self, pointee: Handle<Type>, storage: StorageClass) -> Handle<Type> {
        self.region.types.append_deduped(Type::Pointer { pointee, storage })
    }

    /// Looks up (or creates) the pointer type to a struct type matching the
    /// caller-supplied `member_types`, comparing against that key rather than a
    /// candidate struct type's id against itself.
    pub fn get_struct_pointer_type(
        &mut self,
        member_types: &[Handle<Type>],
        storage: StorageClass,
    ) -> Handle<Type> {
        let struct_ty = self.region.types.append_deduped(Type::Struct {
            members: member_types.iter().copied().collect(),
        });
        self.type_pointer(struct_ty, storage)
    }

    pub fn constant_u32(&mut self, value: u32) -> Handle<Constant> {
        self.region.constants.append_deduped(Constant::U32(value))
    }

    pub fn constant_f32(&mut self, value: f32) -> Handle<Constant> {
        self.region
            .constants
            .append_deduped(Constant::F32Bits(value.to_bits()))
    }

    pub fn append_global(&mut self, global: GlobalVariable) -> Handle<GlobalVariable> {
        self.region.global_variables.append(global)
    }

    pub fn append_function(&mut self, function: Function) -> Handle<Function> {
        self.region.functions.append(function)
    }

    pub fn append_entry_point(&mut self, entry: EntryPoint) {
        self.region.entry_points.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_dedup_across_calls() {
        let mut ctx = Context::new();
        let a = ctx.type_float(32);
        let b = ctx.type_float(32);
        let c = ctx.type_float(64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn struct_pointer_keys_on_caller_supplied_members() {
        let mut ctx = Context::new();
        let f32_ty = ctx.type_float(32);
        let i32_ty = ctx.type_int(32, true);
        let p1 = ctx.get_struct_pointer_type(&[f32_ty, f32_ty], StorageClass::Uniform);
        let p2 = ctx.get_struct_pointer_type(&[f32_ty, f32_ty], StorageClass::Uniform);
        let p3 = ctx.get_struct_pointer_type(&[f32_ty, i32_ty], StorageClass::Uniform);
        assert_eq!(p1, p2, "identical member lists must resolve to the same struct");
        assert_ne!(p3, p1, "different member lists must not alias");
    }
}
