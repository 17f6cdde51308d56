use std::{borrow::Cow, fmt};

use crate::runtime::{error::RuntimeError, value::Value, Interop};

/// Embedder value plugged into the runtime behind `Value::Host`.
///
/// Implementations opt into the parts of the value protocol they support;
/// the defaults refuse with the matching typed error. Implementors must be
/// thread-safe: host values can cross script threads through globals and
/// thread results.
pub trait HostObject: fmt::Debug + Send + Sync {
    fn type_name(&self) -> Cow<'static, str>;

    fn to_display(&self) -> String;

    fn is_falsy(&self) -> bool {
        false
    }

    fn index_get(&self, _key: &Value) -> Result<Value, RuntimeError> {
        Err(RuntimeError::NotIndexable(self.type_name().into_owned()))
    }

    fn index_set(&self, _key: &Value, _value: Value) -> Result<(), RuntimeError> {
        Err(RuntimeError::NotIndexAssignable(
            self.type_name().into_owned(),
        ))
    }

    fn can_call(&self) -> bool {
        false
    }

    fn call(&self, _rt: &mut dyn Interop, _args: &[Value]) -> Result<Value, RuntimeError> {
        Err(RuntimeError::NotCallable(self.type_name().into_owned()))
    }

    fn can_iterate(&self) -> bool {
        false
    }

    fn iterate(&self) -> Option<Box<dyn HostIterator>> {
        None
    }
}

/// Cursor over a host collection, produced by [`HostObject::iterate`].
///
/// Starts before the first element: the runtime calls `advance` before the
/// first `key`/`current` pair, mirroring the iterator opcodes.
pub trait HostIterator: fmt::Debug + Send + Sync {
    fn advance(&mut self) -> bool;
    fn key(&self) -> Value;
    fn current(&self) -> Value;
}
