use std::{fmt, sync::Arc};

use crate::runtime::{error::RuntimeError, value::Value, BuiltinFn, Interop};

/// Entry in the fixed builtin table addressed by `OpGetBuiltin`.
#[derive(Clone)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinFunction({})", self.name)
    }
}

impl PartialEq for BuiltinFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// A host-provided callable carrying captured state: embedder callbacks,
/// `bind` results, and bound class methods.
pub struct NativeFunction {
    pub name: String,
    func: Box<dyn Fn(&mut dyn Interop, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut dyn Interop, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn invoke(&self, rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.func)(rt, args)
    }

    /// Partial application: the result prepends `bound` to its callers'
    /// arguments and forwards to `callee` through the runtime hook. Method
    /// binding is this with `bound = [self]`.
    pub fn bind(name: impl Into<String>, callee: Value, bound: Vec<Value>) -> Value {
        Value::Native(Arc::new(NativeFunction::new(name, move |rt, args| {
            let mut full = Vec::with_capacity(bound.len() + args.len());
            full.extend_from_slice(&bound);
            full.extend_from_slice(args);
            rt.call_value(&callee, &full)
        })))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}
