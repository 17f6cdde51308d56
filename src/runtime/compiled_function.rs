use std::sync::Arc;

use crate::bytecode::{
    debug_info::FunctionDebugInfo,
    op_code::{Instructions, OpCode},
};
use crate::runtime::value::ObjectPtr;

/// A compiled bytecode function.
///
/// `num_locals` counts parameters plus local slots; a variadic function's
/// last parameter receives the packed surplus arguments as an array.
/// Closures share the instruction and debug-info storage of their constant
/// and differ only in `free`.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub instructions: Arc<Instructions>,
    pub num_locals: usize,
    pub num_parameters: usize,
    pub var_args: bool,
    /// Captured cells; indexed by `OpGetFree`/`OpSetFree`/`OpGetFreePtr`.
    pub free: Vec<ObjectPtr>,
    pub debug_info: Option<Arc<FunctionDebugInfo>>,
}

impl CompiledFunction {
    pub fn new(
        instructions: Instructions,
        num_locals: usize,
        num_parameters: usize,
        var_args: bool,
        debug_info: Option<FunctionDebugInfo>,
    ) -> Self {
        Self {
            instructions: Arc::new(instructions),
            num_locals,
            num_parameters,
            var_args,
            free: Vec::new(),
            debug_info: debug_info.map(Arc::new),
        }
    }

    /// The closure constructor: same code, its own captured cells.
    pub fn with_free(&self, free: Vec<ObjectPtr>) -> Self {
        Self {
            instructions: Arc::clone(&self.instructions),
            num_locals: self.num_locals,
            num_parameters: self.num_parameters,
            var_args: self.var_args,
            free,
            debug_info: self.debug_info.clone(),
        }
    }

    /// One-shot `OpCall n; OpSuspend` stub used to re-enter the dispatch
    /// loop from host code and as the entry frame of spawned threads.
    pub(crate) fn micro_call(num_args: usize) -> Self {
        Self {
            instructions: Arc::new(vec![
                OpCode::OpCall as u8,
                num_args as u8,
                OpCode::OpSuspend as u8,
            ]),
            num_locals: 0,
            num_parameters: 0,
            var_args: false,
            free: Vec::new(),
            debug_info: None,
        }
    }
}
