//! The in-memory IR, laid out the way a SPIR-V module is laid out: capabilities,
//! extensions, ext-inst imports, a memory model, entry points, execution modes, debug
//! info, annotations, global types/constants/variables, and functions.

use crate::handle::{Arena, Handle};
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const UNKNOWN: Location = Location { line: 0, column: 0 };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Shader,
    Matrix,
    Int64,
    Float64,
    ImageQuery,
    StorageImageExtendedFormats,
    StorageBuffer16BitAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryModel {
    Simple,
    Glsl450,
    Vulkan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingModel {
    Logical,
    Physical64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionModel {
    Vertex,
    Fragment,
    GlCompute,
    Geometry,
    TessellationControl,
    TessellationEvaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    OriginUpperLeft,
    LocalSize(u32, u32, u32),
    DepthReplacing,
}

/// Scalar/vector/matrix/array/struct/pointer/image/sampler type, deduplicated by
/// structural equality in the [`Arena<Type>`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int { width: u8, signed: bool },
    Float { width: u8 },
    Vector { scalar: Handle<Type>, size: u8 },
    Matrix { column: Handle<Type>, columns: u8 },
    Array { element: Handle<Type>, count: Option<u32> },
    Struct { members: SmallVec<[Handle<Type>; 4]> },
    Pointer { pointee: Handle<Type>, storage: StorageClass },
    Image { dim: ImageDim, depth: bool, arrayed: bool, multisampled: bool, sampled: bool },
    SampledImage { image: Handle<Type> },
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDim {
    D1,
    D2,
    D3,
    Cube,
    Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    UniformConstant,
    Input,
    Uniform,
    Output,
    Private,
    Function,
    StorageBuffer,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Bool(bool),
    U32(u32),
    I32(i32),
    F32Bits(u32),
    Composite { ty: Handle<Type>, components: SmallVec<[Handle<Constant>; 4]> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoration {
    Binding(u32),
    DescriptorSet(u32),
    Location(u32),
    BuiltIn(BuiltIn),
    ArrayStride(u32),
    Offset(u32),
    Block,
    BufferBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltIn {
    Position,
    VertexIndex,
    InstanceIndex,
    FragCoord,
    FrontFacing,
    LocalInvocationId,
    GlobalInvocationId,
    WorkgroupId,
}

#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    pub storage: StorageClass,
    pub decorations: SmallVec<[Decoration; 2]>,
    pub init: Option<Handle<Constant>>,
}

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub name: String,
    pub model: ExecutionModel,
    pub function: Handle<Function>,
    pub modes: SmallVec<[ExecutionMode; 2]>,
    pub interface: SmallVec<[Handle<GlobalVariable>; 8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Literal {
    Bool(bool),
    U32(u32),
    I32(i32),
    F32Bits(u32),
}

/// One IR-level instruction inside a function body. Block structure is expressed via
/// [`Statement::If`]/[`Statement::Loop`] rather than explicit branch targets, which is
/// what lets C3's EXEC-mask lowering emit structured control flow
/// directly instead of reconstructing it from a CFG.
#[derive(Debug, Clone)]
pub enum Expression {
    Constant(Handle<Constant>),
    GlobalVariable(Handle<GlobalVariable>),
    LocalVariable(Handle<LocalVariable>),
    FunctionArgument(u32),
    Load(Handle<Expression>),
    AccessIndex { base: Handle<Expression>, index: u32 },
    Binary { op: BinaryOp, left: Handle<Expression>, right: Handle<Expression> },
    Unary { op: UnaryOp, expr: Handle<Expression> },
    Call { function: Handle<Function>, arguments: SmallVec<[Handle<Expression>; 4]> },
    Select { condition: Handle<Expression>, accept: Handle<Expression>, reject: Handle<Expression> },
    ImageSample { image: Handle<Expression>, sampler: Handle<Expression>, coordinate: Handle<Expression> },
    ImageLoad { image: Handle<Expression>, coordinate: Handle<Expression> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    And,
    Or,
    ExclusiveOr,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    LogicalNot,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Emit(Handle<Expression>),
    Store { pointer: Handle<Expression>, value: Handle<Expression> },
    If { condition: Handle<Expression>, accept: Vec<Statement>, reject: Vec<Statement> },
    Loop { body: Vec<Statement>, continuing: Vec<Statement> },
    Break,
    Continue,
    Return { value: Option<Handle<Expression>> },
    Kill,
}

#[derive(Debug, Clone)]
pub struct LocalVariable {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    pub init: Option<Handle<Constant>>,
}

#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: Option<String>,
    pub arguments: Vec<Handle<Type>>,
    pub result: Option<Handle<Type>>,
    pub locals: Arena<LocalVariable>,
    pub expressions: Arena<Expression>,
    pub body: Vec<Statement>,
}

impl Default for Arena<LocalVariable> {
    fn default() -> Self {
        Arena::new()
    }
}
impl Default for Arena<Expression> {
    fn default() -> Self {
        Arena::new()
    }
}

/// One complete (or mergeable) slice of IR: what `deserialize` produces and `merge`
/// consumes. A [`crate::Context`] owns one or more regions' worth of arenas merged
/// together.
#[derive(Debug, Clone, Default)]
pub struct Region {
    pub capabilities: Vec<Capability>,
    pub extensions: Vec<String>,
    pub ext_inst_imports: Vec<String>,
    pub memory_model: Option<(AddressingModel, MemoryModel)>,
    pub entry_points: Vec<EntryPoint>,
    pub types: Arena<Type>,
    pub constants: Arena<Constant>,
    pub global_variables: Arena<GlobalVariable>,
    pub functions: Arena<Function>,
}

impl Default for Arena<Type> {
    fn default() -> Self {
        Arena::new()
    }
}
impl Default for Arena<Constant> {
    fn default() -> Self {
        Arena::new()
    }
}
impl Default for Arena<GlobalVariable> {
    fn default() -> Self {
        Arena::new()
    }
}
impl Default for Arena<Function> {
    fn default() -> Self {
        Arena::new()
    }
}
