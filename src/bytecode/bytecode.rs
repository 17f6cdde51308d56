use std::sync::Arc;

use crate::runtime::{compiled_function::CompiledFunction, value::Value};

/// A compiled program as handed over by the compiler.
///
/// The constant pool is immutable for the lifetime of the VM; functions in
/// it carry their own instructions and debug info. Running the program means
/// invoking `main_function`, which takes no parameters and ends with
/// `OpSuspend`.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub main_function: Arc<CompiledFunction>,
    pub constants: Vec<Value>,
}
