use std::sync::Arc;

use crate::runtime::compiled_function::CompiledFunction;

/// An activation record: the function being executed, its suspended
/// instruction pointer, and the base of its local slots on the operand
/// stack. `ip` starts at -1 because the dispatch loop pre-increments.
#[derive(Debug, Clone)]
pub struct Frame {
    pub func: Arc<CompiledFunction>,
    pub ip: i64,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(func: Arc<CompiledFunction>, base_pointer: usize) -> Self {
        Self {
            func,
            ip: -1,
            base_pointer,
        }
    }
}
