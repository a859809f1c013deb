//! Function-body builder: one method per IR instruction kind, mirroring the way a
//! SPIR-V builder exposes one method per opcode. Used by `gcn-shader`'s
//! converter to emit a GCN program's translated body.

use crate::handle::Handle;
use crate::ir::{BinaryOp, Constant, Expression, Function, GlobalVariable, Location, Statement, Type, UnaryOp};

pub struct FunctionBuilder {
    function: Function,
    block_stack: Vec<Vec<Statement>>,
}

impl FunctionBuilder {
    pub fn new(name: Option<String>) -> Self {
        FunctionBuilder {
            function: Function { name, ..Function::default() },
            block_stack: vec![Vec::new()],
        }
    }

    pub fn emit_constant(&mut self, _loc: Location, constant: Handle<Constant>) -> Handle<Expression> {
        self.function.expressions.append(Expression::Constant(constant))
    }

    /// References the `index`-th entry of [`Self::with_arguments`]'s type list.
    pub fn emit_argument(&mut self, _loc: Location, index: u32) -> Handle<Expression> {
        self.function.expressions.append(Expression::FunctionArgument(index))
    }

    pub fn emit_global_access(&mut self, _loc: Location, global: Handle<GlobalVariable>) -> Handle<Expression> {
        self.function.expressions.append(Expression::GlobalVariable(global))
    }

    pub fn emit_load(&mut self, _loc: Location, pointer: Handle<Expression>) -> Handle<Expression> {
        let handle = self.function.expressions.append(Expression::Load(pointer));
        self.current_block().push(Statement::Emit(handle));
        handle
    }

    pub fn emit_binary(
        &mut self,
        _loc: Location,
        op: BinaryOp,
        left: Handle<Expression>,
        right: Handle<Expression>,
    ) -> Handle<Expression> {
        let handle = self.function.expressions.append(Expression::Binary { op, left, right });
        self.current_block().push(Statement::Emit(handle));
        handle
    }

    pub fn emit_unary(&mut self, _loc: Location, op: UnaryOp, expr: Handle<Expression>) -> Handle<Expression> {
        let handle = self.function.expressions.append(Expression::Unary { op, expr });
        self.current_block().push(Statement::Emit(handle));
        handle
    }

    pub fn emit_select(
        &mut self,
        _loc: Location,
        condition: Handle<Expression>,
        accept: Handle<Expression>,
        reject: Handle<Expression>,
    ) -> Handle<Expression> {
        let handle = self.function.expressions.append(Expression::Select { condition, accept, reject });
        self.current_block().push(Statement::Emit(handle));
        handle
    }

    pub fn emit_call(
        &mut self,
        _loc: Location,
        function: Handle<Function>,
        arguments: &[Handle<Expression>],
    ) -> Handle<Expression> {
        let handle = self
            .function
            .expressions
            .append(Expression::Call { function, arguments: arguments.iter().copied().collect() });
        self.current_block().push(Statement::Emit(handle));
        handle
    }

    pub fn store(&mut self, _loc: Location, pointer: Handle<Expression>, value: Handle<Expression>) {
        self.current_block().push(Statement::Store { pointer, value });
    }

    /// Begins a structured `if`; [`Self::end_if`] closes it. Used to lower
    /// `S_CBRANCH_*` over the EXEC mask into structured selection instead of reconstructing structure from arbitrary branch targets.
    pub fn begin_if(&mut self, _loc: Location) {
        self.block_stack.push(Vec::new());
    }

    pub fn begin_else(&mut self) {
        self.block_stack.push(Vec::new());
    }

    pub fn end_if(&mut self, condition: Handle<Expression>) {
        let reject = self.block_stack.pop().unwrap_or_default();
        let (accept, reject) = if self.block_stack.len() >= 2 {
            // an explicit `begin_else` pushed a second pending block
            let accept = self.block_stack.pop().unwrap();
            (accept, reject)
        } else {
            (reject, Vec::new())
        };
        self.current_block().push(Statement::If { condition, accept, reject });
    }

    pub fn begin_loop(&mut self) {
        self.block_stack.push(Vec::new());
    }

    pub fn end_loop(&mut self, continuing: Vec<Statement>) {
        let body = self.block_stack.pop().unwrap_or_default();
        self.current_block().push(Statement::Loop { body, continuing });
    }

    pub fn emit_break(&mut self) {
        self.current_block().push(Statement::Break);
    }

    pub fn emit_continue(&mut self) {
        self.current_block().push(Statement::Continue);
    }

    /// Lowers `S_ENDPGM`.
    pub fn emit_return(&mut self, value: Option<Handle<Expression>>) {
        self.current_block().push(Statement::Return { value });
    }

    pub fn emit_kill(&mut self) {
        self.current_block().push(Statement::Kill);
    }

    fn current_block(&mut self) -> &mut Vec<Statement> {
        self.block_stack.last_mut().expect("block stack is never empty")
    }

    pub fn with_result(mut self, result: Option<Handle<Type>>) -> Self {
        self.function.result = result;
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<Handle<Type>>) -> Self {
        self.function.arguments = arguments;
        self
    }

    pub fn finish(mut self) -> Function {
        self.function.body = self.block_stack.pop().unwrap_or_default();
        debug_assert!(self.block_stack.is_empty(), "unbalanced begin_if/begin_loop");
        self.function
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn builds_a_function_that_returns_a_constant() {
        let mut ctx = Context::new();
        let f32_ty = ctx.type_float(32);
        let one = ctx.constant_f32(1.0);

        let mut fb = FunctionBuilder::new(Some("main".into())).with_result(Some(f32_ty));
        let expr = fb.emit_constant(Location::UNKNOWN, one);
        fb.emit_return(Some(expr));
        let func = fb.finish();

        assert_eq!(func.body.len(), 1);
        assert!(matches!(func.body[0], Statement::Return { value: Some(_) }));
    }

    #[test]
    fn if_else_nests_correctly() {
        let mut fb = FunctionBuilder::new(None);
        let cond = fb.function.expressions.append(Expression::Constant(Handle::new(0)));
        fb.begin_if(Location::UNKNOWN);
        fb.emit_break();
        fb.begin_else();
        fb.emit_continue();
        fb.end_if(cond);
        let func = fb.finish();
        match &func.body[0] {
            Statement::If { accept, reject, .. } => {
                assert_eq!(accept.len(), 1);
                assert_eq!(reject.len(), 1);
            }
            _ => panic!("expected If"),
        }
    }
}
