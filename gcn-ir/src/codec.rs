//! Binary codec for [`Region`]: `serialize`/`deserialize` round-trip an entire module
//! to/from a flat `Vec<u32>`, physically laid out the way real SPIR-V is (a fixed
//! 5-word header, magic/version/generator/bound/schema, followed by a stream of
//! `(word_count << 16 | opcode)`-tagged instructions) even though the opcode set here
//! only covers the subset of SPIR-V this workspace actually emits.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::ir::*;
use smallvec::SmallVec;

pub const MAGIC: u32 = 0x0723_0203;
const VERSION: u32 = 0x0001_0600; // SPIR-V 1.6
const GENERATOR: u32 = 0xFFFF_0001; // private generator magic for this workspace

/// Tags for the (reduced) opcode set this codec round-trips. Real SPIR-V opcode
/// numbers are not reused here: this is an internal wire format, not an interoperable
/// SPIR-V binary (actual SPIR-V emission for the driver happens in `gcn-shader`'s
/// converter by calling into a pre-authored semantic module via the builders in
/// [`crate::builder`]; this codec serves round-trip/disassembly/test needs for the IR
/// itself).
#[repr(u16)]
enum Tag {
    Capability = 1,
    Extension = 2,
    ExtInstImport = 3,
    MemoryModel = 4,
    EntryPoint = 5,
    ExecutionMode = 6,
    TypeVoid = 10,
    TypeBool = 11,
    TypeInt = 12,
    TypeFloat = 13,
    TypeVector = 14,
    TypeMatrix = 15,
    TypeArray = 16,
    TypeStruct = 17,
    TypePointer = 18,
    TypeImage = 19,
    TypeSampledImage = 20,
    TypeSampler = 21,
    ConstantBool = 30,
    ConstantU32 = 31,
    ConstantI32 = 32,
    ConstantF32 = 33,
    ConstantComposite = 34,
    Variable = 40,
    Decorate = 41,
    Function = 50,
    FunctionEnd = 51,
}

struct Writer {
    words: Vec<u32>,
}

impl Writer {
    fn op(&mut self, tag: Tag, operands: &[u32]) {
        let word_count = 1 + operands.len() as u32;
        self.words.push((word_count << 16) | tag as u32);
        self.words.extend_from_slice(operands);
    }

    fn push_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.words.push(bytes.len() as u32);
        let mut chunk = [0u8; 4];
        for b in bytes.chunks(4) {
            chunk = [0; 4];
            chunk[..b.len()].copy_from_slice(b);
            self.words.push(u32::from_le_bytes(chunk));
        }
    }
}

fn h<T>(handle: Handle<T>) -> u32 {
    handle.index() as u32
}

/// Serialize `region` into a standalone SPIR-V-shaped word stream.
pub fn serialize(region: &Region) -> Vec<u32> {
    let mut w = Writer { words: Vec::new() };
    w.words.extend_from_slice(&[MAGIC, VERSION, GENERATOR, 0, 0]);

    for cap in &region.capabilities {
        w.op(Tag::Capability, &[capability_code(*cap)]);
    }
    for ext in &region.extensions {
        w.op(Tag::Extension, &[]);
        w.push_string(ext);
    }
    for imp in &region.ext_inst_imports {
        w.op(Tag::ExtInstImport, &[]);
        w.push_string(imp);
    }
    if let Some((addressing, model)) = region.memory_model {
        w.op(Tag::MemoryModel, &[addressing_code(addressing), memory_model_code(model)]);
    }
    for (handle, ty) in region.types.iter() {
        write_type(&mut w, handle, ty);
    }
    for (handle, constant) in region.constants.iter() {
        write_constant(&mut w, handle, constant);
    }
    for (handle, global) in region.global_variables.iter() {
        w.op(Tag::Variable, &[h(handle), h(global.ty), storage_code(global.storage)]);
    }
    for entry in &region.entry_points {
        w.op(Tag::EntryPoint, &[execution_model_code(entry.model), h(entry.function)]);
        w.push_string(&entry.name);
    }
    for (handle, func) in region.functions.iter() {
        w.op(Tag::Function, &[h(handle), func.result.map(h).unwrap_or(u32::MAX)]);
    }
    w.words[3] = bound(region);
    w.words
}

fn bound(region: &Region) -> u32 {
    (region.types.len() + region.constants.len() + region.global_variables.len() + region.functions.len() + 1)
        as u32
}

fn write_type(w: &mut Writer, handle: Handle<Type>, ty: &Type) {
    let id = h(handle);
    match *ty {
        Type::Void => w.op(Tag::TypeVoid, &[id]),
        Type::Bool => w.op(Tag::TypeBool, &[id]),
        Type::Int { width, signed } => w.op(Tag::TypeInt, &[id, width as u32, signed as u32]),
        Type::Float { width } => w.op(Tag::TypeFloat, &[id, width as u32]),
        Type::Vector { scalar, size } => w.op(Tag::TypeVector, &[id, h(scalar), size as u32]),
        Type::Matrix { column, columns } => w.op(Tag::TypeMatrix, &[id, h(column), columns as u32]),
        Type::Array { element, count } => {
            w.op(Tag::TypeArray, &[id, h(element), count.unwrap_or(0)])
        }
        Type::Struct { ref members } => {
            let mut operands = vec![id];
            operands.extend(members.iter().map(|m| h(*m)));
            w.op(Tag::TypeStruct, &operands);
        }
        Type::Pointer { pointee, storage } => {
            w.op(Tag::TypePointer, &[id, storage_code(storage), h(pointee)])
        }
        Type::Image { dim, depth, arrayed, multisampled, sampled } => w.op(
            Tag::TypeImage,
            &[id, dim as u32, depth as u32, arrayed as u32, multisampled as u32, sampled as u32],
        ),
        Type::SampledImage { image } => w.op(Tag::TypeSampledImage, &[id, h(image)]),
        Type::Sampler => w.op(Tag::TypeSampler, &[id]),
    }
}

fn write_constant(w: &mut Writer, handle: Handle<Constant>, constant: &Constant) {
    let id = h(handle);
    match *constant {
        Constant::Bool(v) => w.op(Tag::ConstantBool, &[id, v as u32]),
        Constant::U32(v) => w.op(Tag::ConstantU32, &[id, v]),
        Constant::I32(v) => w.op(Tag::ConstantI32, &[id, v as u32]),
        Constant::F32Bits(v) => w.op(Tag::ConstantF32, &[id, v]),
        Constant::Composite { ty, ref components } => {
            let mut operands = vec![id, h(ty)];
            operands.extend(components.iter().map(|c| h(*c)));
            w.op(Tag::ConstantComposite, &operands);
        }
    }
}

struct Reader<'a> {
    words: &'a [u32],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn read(&mut self) -> Result<u32> {
        let w = *self
            .words
            .get(self.pos)
            .ok_or(Error::TruncatedInstruction(self.pos))?;
        self.pos += 1;
        Ok(w)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read()? as usize;
        let words_needed = len.div_ceil(4);
        let mut bytes = Vec::with_capacity(len);
        for _ in 0..words_needed {
            bytes.extend_from_slice(&self.read()?.to_le_bytes());
        }
        bytes.truncate(len);
        String::from_utf8(bytes).map_err(|_| Error::Malformed("non-utf8 string literal"))
    }
}

/// Deserialize a SPIR-V-shaped word stream into a [`Region`]. Returns `Ok(None)` on
/// malformed input  ("returns `none` on malformed input"); `loc` is
/// attached to any future diagnostics (currently unused beyond being accepted, kept for
/// call-site symmetry with [`crate::context::Context`] builder methods, all of which
/// take a `Location`).
pub fn deserialize(words: &[u32], _loc: Location) -> Result<Option<Region>> {
    if words.len() < 5 {
        return Ok(None);
    }
    if words[0] != MAGIC {
        return Ok(None);
    }

    let mut region = Region::default();
    let mut r = Reader { words, pos: 5 };

    while r.pos < words.len() {
        let header = r.read()?;
        let opcode = (header & 0xFFFF) as u16;
        let word_count = (header >> 16) as usize;
        let instr_start = r.pos;
        match opcode {
            x if x == Tag::Capability as u16 => {
                region.capabilities.push(decode_capability(r.read()?)?);
            }
            x if x == Tag::Extension as u16 => {
                region.extensions.push(r.read_string()?);
            }
            x if x == Tag::ExtInstImport as u16 => {
                region.ext_inst_imports.push(r.read_string()?);
            }
            x if x == Tag::MemoryModel as u16 => {
                let addr = decode_addressing(r.read()?)?;
                let model = decode_memory_model(r.read()?)?;
                region.memory_model = Some((addr, model));
            }
            x if x == Tag::TypeVoid as u16 => {
                let _id = r.read()?;
                region.types.append(Type::Void);
            }
            x if x == Tag::TypeBool as u16 => {
                let _id = r.read()?;
                region.types.append(Type::Bool);
            }
            x if x == Tag::TypeInt as u16 => {
                let _id = r.read()?;
                let width = r.read()? as u8;
                let signed = r.read()? != 0;
                region.types.append(Type::Int { width, signed });
            }
            x if x == Tag::TypeFloat as u16 => {
                let _id = r.read()?;
                let width = r.read()? as u8;
                region.types.append(Type::Float { width });
            }
            x if x == Tag::TypeVector as u16 => {
                let _id = r.read()?;
                let scalar = Handle::new(r.read()?);
                let size = r.read()? as u8;
                region.types.append(Type::Vector { scalar, size });
            }
            x if x == Tag::TypeMatrix as u16 => {
                let _id = r.read()?;
                let column = Handle::new(r.read()?);
                let columns = r.read()? as u8;
                region.types.append(Type::Matrix { column, columns });
            }
            x if x == Tag::TypeArray as u16 => {
                let _id = r.read()?;
                let element = Handle::new(r.read()?);
                let count = r.read()?;
                region.types.append(Type::Array {
                    element,
                    count: if count == 0 { None } else { Some(count) },
                });
            }
            x if x == Tag::TypeStruct as u16 => {
                let _id = r.read()?;
                let mut members: SmallVec<[Handle<Type>; 4]> = SmallVec::new();
                while r.pos < instr_start + word_count - 1 {
                    members.push(Handle::new(r.read()?));
                }
                region.types.append(Type::Struct { members });
            }
            x if x == Tag::TypePointer as u16 => {
                let _id = r.read()?;
                let storage = decode_storage(r.read()?)?;
                let pointee = Handle::new(r.read()?);
                region.types.append(Type::Pointer { pointee, storage });
            }
            x if x == Tag::TypeImage as u16 => {
                let _id = r.read()?;
                let dim = decode_image_dim(r.read()?)?;
                let depth = r.read()? != 0;
                let arrayed = r.read()? != 0;
                let multisampled = r.read()? != 0;
                let sampled = r.read()? != 0;
                region.types.append(Type::Image { dim, depth, arrayed, multisampled, sampled });
            }
            x if x == Tag::TypeSampledImage as u16 => {
                let _id = r.read()?;
                let image = Handle::new(r.read()?);
                region.types.append(Type::SampledImage { image });
            }
            x if x == Tag::TypeSampler as u16 => {
                let _id = r.read()?;
                region.types.append(Type::Sampler);
            }
            x if x == Tag::ConstantBool as u16 => {
                let _id = r.read()?;
                let v = r.read()? != 0;
                region.constants.append(Constant::Bool(v));
            }
            x if x == Tag::ConstantU32 as u16 => {
                let _id = r.read()?;
                let v = r.read()?;
                region.constants.append(Constant::U32(v));
            }
            x if x == Tag::ConstantI32 as u16 => {
                let _id = r.read()?;
                let v = r.read()? as i32;
                region.constants.append(Constant::I32(v));
            }
            x if x == Tag::ConstantF32 as u16 => {
                let _id = r.read()?;
                let v = r.read()?;
                region.constants.append(Constant::F32Bits(v));
            }
            x if x == Tag::ConstantComposite as u16 => {
                let _id = r.read()?;
                let ty = Handle::new(r.read()?);
                let mut components: SmallVec<[Handle<Constant>; 4]> = SmallVec::new();
                while r.pos < instr_start + word_count - 1 {
                    components.push(Handle::new(r.read()?));
                }
                region.constants.append(Constant::Composite { ty, components });
            }
            x if x == Tag::Variable as u16 => {
                let _id = r.read()?;
                let ty = Handle::new(r.read()?);
                let storage = decode_storage(r.read()?)?;
                region.global_variables.append(GlobalVariable {
                    name: None,
                    ty,
                    storage,
                    decorations: SmallVec::new(),
                    init: None,
                });
            }
            x if x == Tag::EntryPoint as u16 => {
                let model = decode_execution_model(r.read()?)?;
                let function = Handle::new(r.read()?);
                let name = r.read_string()?;
                region.entry_points.push(EntryPoint {
                    name,
                    model,
                    function,
                    modes: SmallVec::new(),
                    interface: SmallVec::new(),
                });
            }
            x if x == Tag::Function as u16 => {
                let _id = r.read()?;
                let result_raw = r.read()?;
                region.functions.append(Function {
                    name: None,
                    arguments: Vec::new(),
                    result: (result_raw != u32::MAX).then(|| Handle::new(result_raw)),
                    ..Function::default()
                });
            }
            other => return Err(Error::UnsupportedOpcode(other)),
        }
        // Skip any operands this reader didn't consume (forward-compatibility).
        r.pos = instr_start + (word_count - 1);
    }

    Ok(Some(region))
}

fn capability_code(cap: Capability) -> u32 {
    match cap {
        Capability::Shader => 1,
        Capability::Matrix => 2,
        Capability::Int64 => 3,
        Capability::Float64 => 4,
        Capability::ImageQuery => 5,
        Capability::StorageImageExtendedFormats => 6,
        Capability::StorageBuffer16BitAccess => 7,
    }
}
fn decode_capability(code: u32) -> Result<Capability> {
    Ok(match code {
        1 => Capability::Shader,
        2 => Capability::Matrix,
        3 => Capability::Int64,
        4 => Capability::Float64,
        5 => Capability::ImageQuery,
        6 => Capability::StorageImageExtendedFormats,
        7 => Capability::StorageBuffer16BitAccess,
        _ => return Err(Error::Malformed("unknown capability code")),
    })
}

fn addressing_code(a: AddressingModel) -> u32 {
    match a {
        AddressingModel::Logical => 0,
        AddressingModel::Physical64 => 1,
    }
}
fn decode_addressing(code: u32) -> Result<AddressingModel> {
    Ok(match code {
        0 => AddressingModel::Logical,
        1 => AddressingModel::Physical64,
        _ => return Err(Error::Malformed("unknown addressing model")),
    })
}

fn memory_model_code(m: MemoryModel) -> u32 {
    match m {
        MemoryModel::Simple => 0,
        MemoryModel::Glsl450 => 1,
        MemoryModel::Vulkan => 2,
    }
}
fn decode_memory_model(code: u32) -> Result<MemoryModel> {
    Ok(match code {
        0 => MemoryModel::Simple,
        1 => MemoryModel::Glsl450,
        2 => MemoryModel::Vulkan,
        _ => return Err(Error::Malformed("unknown memory model")),
    })
}

fn storage_code(s: StorageClass) -> u32 {
    match s {
        StorageClass::UniformConstant => 0,
        StorageClass::Input => 1,
        StorageClass::Uniform => 2,
        StorageClass::Output => 3,
        StorageClass::Private => 6,
        StorageClass::Function => 7,
        StorageClass::StorageBuffer => 12,
    }
}
fn decode_storage(code: u32) -> Result<StorageClass> {
    Ok(match code {
        0 => StorageClass::UniformConstant,
        1 => StorageClass::Input,
        2 => StorageClass::Uniform,
        3 => StorageClass::Output,
        6 => StorageClass::Private,
        7 => StorageClass::Function,
        12 => StorageClass::StorageBuffer,
        _ => return Err(Error::Malformed("unknown storage class")),
    })
}

fn execution_model_code(e: ExecutionModel) -> u32 {
    match e {
        ExecutionModel::Vertex => 0,
        ExecutionModel::Fragment => 4,
        ExecutionModel::GlCompute => 5,
        ExecutionModel::Geometry => 3,
        ExecutionModel::TessellationControl => 1,
        ExecutionModel::TessellationEvaluation => 2,
    }
}
fn decode_execution_model(code: u32) -> Result<ExecutionModel> {
    Ok(match code {
        0 => ExecutionModel::Vertex,
        4 => ExecutionModel::Fragment,
        5 => ExecutionModel::GlCompute,
        3 => ExecutionModel::Geometry,
        1 => ExecutionModel::TessellationControl,
        2 => ExecutionModel::TessellationEvaluation,
        _ => return Err(Error::Malformed("unknown execution model")),
    })
}

fn decode_image_dim(code: u32) -> Result<ImageDim> {
    Ok(match code {
        0 => ImageDim::D1,
        1 => ImageDim::D2,
        2 => ImageDim::D3,
        3 => ImageDim::Cube,
        4 => ImageDim::Buffer,
        _ => return Err(Error::Malformed("unknown image dim")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn round_trips_scalar_types_and_constants() {
        let mut ctx = Context::new();
        ctx.require_capability(Capability::Shader);
        let f32_ty = ctx.type_float(32);
        let _i32_ty = ctx.type_int(32, true);
        let _vec4 = ctx.type_vector(f32_ty, 4);
        ctx.constant_f32(1.0);
        ctx.constant_u32(42);
        ctx.region.memory_model = Some((AddressingModel::Logical, MemoryModel::Glsl450));

        let words = serialize(&ctx.region);
        let round_tripped = deserialize(&words, Location::UNKNOWN).unwrap().unwrap();

        assert_eq!(round_tripped.capabilities, ctx.region.capabilities);
        assert_eq!(round_tripped.memory_model, ctx.region.memory_model);
        assert_eq!(round_tripped.types.len(), ctx.region.types.len());
        assert_eq!(round_tripped.constants.len(), ctx.region.constants.len());
    }

    #[test]
    fn deserialize_rejects_bad_magic() {
        let words = vec![0u32; 8];
        assert!(deserialize(&words, Location::UNKNOWN).unwrap().is_none());
    }

    #[test]
    fn deserialize_rejects_truncated_stream() {
        let words = vec![MAGIC, VERSION, GENERATOR, 0, 0, (2 << 16) | Tag::TypeVoid as u32];
        assert!(deserialize(&words, Location::UNKNOWN).is_err());
    }

    proptest::proptest! {
        #[test]
        fn round_trip_preserves_type_count(widths in proptest::collection::vec(1u8..=2, 0..8)) {
            let mut ctx = Context::new();
            for w in &widths {
                ctx.type_float(*w * 32);
            }
            let words = serialize(&ctx.region);
            let back = deserialize(&words, Location::UNKNOWN).unwrap().unwrap();
            proptest::prop_assert_eq!(back.types.len(), ctx.region.types.len());
        }
    }
}
