#![allow(dead_code)]

use std::sync::Arc;

use ember::bytecode::{
    bytecode::Bytecode,
    debug_info::FunctionDebugInfo,
    op_code::{make, Instructions, OpCode},
};
use ember::runtime::{
    compiled_function::CompiledFunction, error::Traceback, value::Value, vm::VM,
};

/// Tiny assembler for hand-built instruction streams.
pub struct Asm {
    pub code: Instructions,
}

impl Asm {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    pub fn pos(&self) -> usize {
        self.code.len()
    }

    /// Emits an instruction, returning its offset for jump patching.
    pub fn op(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let at = self.code.len();
        self.code.extend(make(op, operands));
        at
    }

    pub fn patch_u16(&mut self, at: usize, value: usize) {
        self.code[at + 1] = (value >> 8) as u8;
        self.code[at + 2] = value as u8;
    }
}

/// Builds a program around a main function; `build` appends the trailing
/// `OpSuspend` the compiler would emit.
pub struct Program {
    pub main: Asm,
    pub constants: Vec<Value>,
    pub num_locals: usize,
}

impl Program {
    pub fn new() -> Self {
        Self {
            main: Asm::new(),
            constants: Vec::new(),
            num_locals: 0,
        }
    }

    pub fn constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn function(
        &mut self,
        params: usize,
        locals: usize,
        var_args: bool,
        code: Instructions,
    ) -> usize {
        self.constant(Value::Function(Arc::new(CompiledFunction::new(
            code, locals, params, var_args, None,
        ))))
    }

    pub fn function_with_debug(
        &mut self,
        params: usize,
        locals: usize,
        var_args: bool,
        code: Instructions,
        debug_info: FunctionDebugInfo,
    ) -> usize {
        self.constant(Value::Function(Arc::new(CompiledFunction::new(
            code,
            locals,
            params,
            var_args,
            Some(debug_info),
        ))))
    }

    pub fn op(&mut self, op: OpCode, operands: &[usize]) -> usize {
        self.main.op(op, operands)
    }

    pub fn build(mut self) -> Bytecode {
        self.main.op(OpCode::OpSuspend, &[]);
        Bytecode {
            main_function: Arc::new(CompiledFunction::new(
                self.main.code,
                self.num_locals,
                0,
                false,
                None,
            )),
            constants: self.constants,
        }
    }

    pub fn run(self) -> VM {
        let mut vm = VM::new(self.build(), None, -1);
        vm.run().unwrap();
        vm
    }

    pub fn run_with_globals(self, globals: Vec<Value>) -> VM {
        let mut vm = VM::new(self.build(), Some(globals), -1);
        vm.run().unwrap();
        vm
    }

    pub fn run_err(self) -> Traceback {
        let mut vm = VM::new(self.build(), None, -1);
        vm.run().unwrap_err()
    }
}
