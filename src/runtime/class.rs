use std::{collections::HashMap, sync::Arc};

use crate::runtime::{
    class_instance::ClassInstance, error::RuntimeError, native_function::NativeFunction,
    value::Value, Interop,
};

/// A user-defined class: a name, an optional base class, and a body
/// mapping attribute names to values. Keys starting with `_` are private
/// by convention.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub base: Option<Arc<Class>>,
    pub body: HashMap<String, Value>,
}

impl Class {
    pub fn new(name: impl Into<String>, base: Option<Arc<Class>>, body: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            base,
            body,
        }
    }

    /// Calling a class constructs an instance.
    ///
    /// Attribute tables start empty and the inheritance chain is walked
    /// root to leaf: methods bind to the instance's `self` handle (private
    /// ones into the private table), non-callables are stored after a
    /// copy, and `init` entries collect into the constructor list. The
    /// constructors then run root to leaf with `self` prepended to the
    /// caller's arguments; one returning an `Error` aborts instantiation.
    pub fn instantiate(
        self: &Arc<Self>,
        rt: &mut dyn Interop,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let instance = Arc::new(ClassInstance::new(Arc::clone(self)));
        let self_handle = Value::InstanceSelf(Arc::clone(&instance));

        let mut constructors = Vec::new();
        self.init_instance(&instance, &self_handle, &mut constructors);

        let mut init_args = Vec::with_capacity(args.len() + 1);
        init_args.push(self_handle);
        init_args.extend_from_slice(args);
        for constructor in &constructors {
            let ret = rt.call_value(constructor, &init_args)?;
            if let Value::Error(_) = &ret {
                return Err(RuntimeError::Message(ret.to_string()));
            }
        }

        Ok(Value::Instance(instance))
    }

    fn init_instance(
        &self,
        instance: &Arc<ClassInstance>,
        self_handle: &Value,
        constructors: &mut Vec<Value>,
    ) {
        if let Some(base) = &self.base {
            base.init_instance(instance, self_handle, constructors);
        }

        for (key, value) in &self.body {
            if key.starts_with('_') {
                let stored = if value.can_call() {
                    self.bind_method(key, value, self_handle)
                } else {
                    value.copy_value()
                };
                instance.private.write().insert(key.clone(), stored);
                continue;
            }

            if value.can_call() {
                if key == "init" {
                    constructors.push(value.clone());
                } else {
                    let bound = self.bind_method(key, value, self_handle);
                    instance.public.write().insert(key.clone(), bound);
                }
                continue;
            }

            instance.public.write().insert(key.clone(), value.copy_value());
        }
    }

    fn bind_method(&self, key: &str, method: &Value, self_handle: &Value) -> Value {
        NativeFunction::bind(
            format!("{}.{}", self.name, key),
            method.copy_value(),
            vec![self_handle.clone()],
        )
    }
}
