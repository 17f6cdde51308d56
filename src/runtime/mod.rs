//! Runtime core: the value universe, its operation protocol, and the
//! bytecode virtual machine with its cooperative thread model.
//!
//! # Sharing model
//! Primitives travel by value. Arrays, maps, bytes, class instances,
//! errors, functions, and closure cells are `Arc`-shared; mutation through
//! any reference is visible through all. Value graphs are acyclic by
//! construction (no language feature creates back-edges), so reference
//! counting is sufficient to reclaim unreachable values.
use crate::runtime::{error::RuntimeError, value::Value};

pub mod builtins;
pub mod class;
pub mod class_instance;
pub mod compiled_function;
pub mod convert;
pub mod error;
pub mod format;
pub mod frame;
pub mod host;
pub mod index;
pub mod iterator;
pub mod native_function;
pub mod ops;
pub mod value;
pub mod vm;

/// Longest string the runtime will materialize.
pub const MAX_STRING_LEN: usize = 0x7fff_ffff;

/// Longest byte buffer the runtime will materialize.
pub const MAX_BYTES_LEN: usize = 0x7fff_ffff;

/// Runtime handle passed to builtin and native functions so host code can
/// re-enter the virtual machine.
///
/// The implementor is the executing thread context, which holds the global
/// interpreter lock for the whole call; nested host and script frames may
/// interleave arbitrarily deep through this hook, but no other script
/// thread can run until the call returns.
pub trait Interop {
    fn call_value(&mut self, callee: &Value, args: &[Value]) -> Result<Value, RuntimeError>;
}

pub type BuiltinFn = fn(&mut dyn Interop, &[Value]) -> Result<Value, RuntimeError>;
