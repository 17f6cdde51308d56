use std::{borrow::Cow, collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

use crate::runtime::{
    class::Class,
    class_instance::ClassInstance,
    compiled_function::CompiledFunction,
    host::HostObject,
    iterator::ValueIterator,
    native_function::{BuiltinFunction, NativeFunction},
};

/// A heap cell holding a single value.
///
/// Closure cells give multiple closures (and the stack slot they were
/// captured from) one shared, mutable location. Cells live only on the
/// operand stack and in `CompiledFunction::free`; they never escape into
/// arrays, maps, or return values.
pub type ObjectPtr = Arc<RwLock<Value>>;

/// A first-class runtime value.
///
/// The variant set is closed: every value a script can observe is one of
/// these. Mutable containers use `Arc<RwLock<_>>` so references can be
/// shared across script threads; the GIL serializes all logical access, the
/// locks only make that sharing sound.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    String(Arc<str>),
    Bytes(Arc<RwLock<Vec<u8>>>),
    /// Absolute timestamp, nanoseconds since the Unix epoch.
    Time(i64),
    Array(Arc<RwLock<Vec<Value>>>),
    ImmutableArray(Arc<Vec<Value>>),
    Map(Arc<RwLock<HashMap<String, Value>>>),
    ImmutableMap(Arc<HashMap<String, Value>>),
    Error(Arc<Value>),
    /// Compiled bytecode function. A closure is a `CompiledFunction` whose
    /// `free` vector is non-empty.
    Function(Arc<CompiledFunction>),
    /// Entry of the fixed builtin table.
    Builtin(BuiltinFunction),
    /// Host-provided callable: embedder callbacks, `bind` results, bound
    /// methods.
    Native(Arc<NativeFunction>),
    Class(Arc<Class>),
    /// External view of a class instance: public attributes only.
    Instance(Arc<ClassInstance>),
    /// Privileged `self` view handed to methods: private attributes too.
    InstanceSelf(Arc<ClassInstance>),
    Iterator(Arc<RwLock<ValueIterator>>),
    /// Closure cell in slot position; reads and writes dereference it.
    Cell(ObjectPtr),
    /// Transient wrapper for `xs...` at call and array-literal sites.
    Spread(Arc<Vec<Value>>),
    /// Embedder value behind a trait object.
    Host(Arc<dyn HostObject>),
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(elements)))
    }

    pub fn map(entries: HashMap<String, Value>) -> Value {
        Value::Map(Arc::new(RwLock::new(entries)))
    }

    pub fn bytes(data: Vec<u8>) -> Value {
        Value::Bytes(Arc::new(RwLock::new(data)))
    }

    pub fn error(inner: Value) -> Value {
        Value::Error(Arc::new(inner))
    }

    /// Stable short name used in errors and reflection. Class instances
    /// report their class name.
    pub fn type_name(&self) -> Cow<'static, str> {
        match self {
            Value::Undefined => Cow::Borrowed("undefined"),
            Value::Bool(_) => Cow::Borrowed("bool"),
            Value::Int(_) => Cow::Borrowed("int"),
            Value::Float(_) => Cow::Borrowed("float"),
            Value::Char(_) => Cow::Borrowed("char"),
            Value::String(_) => Cow::Borrowed("string"),
            Value::Bytes(_) => Cow::Borrowed("bytes"),
            Value::Time(_) => Cow::Borrowed("time"),
            Value::Array(_) => Cow::Borrowed("array"),
            Value::ImmutableArray(_) => Cow::Borrowed("immutable-array"),
            Value::Map(_) => Cow::Borrowed("map"),
            Value::ImmutableMap(_) => Cow::Borrowed("immutable-map"),
            Value::Error(_) => Cow::Borrowed("error"),
            Value::Function(_) => Cow::Borrowed("compiled-function"),
            Value::Builtin(_) => Cow::Borrowed("builtin-function"),
            Value::Native(_) => Cow::Borrowed("native-function"),
            Value::Class(_) => Cow::Borrowed("class"),
            Value::Instance(instance) | Value::InstanceSelf(instance) => {
                Cow::Owned(instance.class.name.clone())
            }
            Value::Iterator(_) => Cow::Borrowed("iterator"),
            Value::Cell(_) => Cow::Borrowed("object-ptr"),
            Value::Spread(_) => Cow::Borrowed("spread"),
            Value::Host(host) => host.type_name(),
        }
    }

    /// Falsiness: `undefined`, `false`, numeric zero, the NUL char, zero
    /// time, and empty strings/bytes/arrays/maps are falsy; all else is
    /// truthy.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Undefined => true,
            Value::Bool(value) => !value,
            Value::Int(value) => *value == 0,
            Value::Float(value) => *value == 0.0,
            Value::Char(value) => *value == '\0',
            Value::String(value) => value.is_empty(),
            Value::Bytes(value) => value.read().is_empty(),
            Value::Time(value) => *value == 0,
            Value::Array(value) => value.read().is_empty(),
            Value::ImmutableArray(value) => value.is_empty(),
            Value::Map(value) => value.read().is_empty(),
            Value::ImmutableMap(value) => value.is_empty(),
            Value::Host(host) => host.is_falsy(),
            _ => false,
        }
    }

    /// Value equality for primitives (with Int/Float numeric cross-type
    /// equality), reference identity for shared containers, structural for
    /// errors. Compiled functions never compare equal, not even to
    /// themselves.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Int(l), Value::Int(r)) => l == r,
            (Value::Int(l), Value::Float(r)) => (*l as f64) == *r,
            (Value::Float(l), Value::Int(r)) => *l == (*r as f64),
            (Value::Float(l), Value::Float(r)) => l == r,
            (Value::Char(l), Value::Char(r)) => l == r,
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Time(l), Value::Time(r)) => l == r,
            (Value::Bytes(l), Value::Bytes(r)) => Arc::ptr_eq(l, r),
            (Value::Array(l), Value::Array(r)) => Arc::ptr_eq(l, r),
            (Value::ImmutableArray(l), Value::ImmutableArray(r)) => Arc::ptr_eq(l, r),
            (Value::Map(l), Value::Map(r)) => Arc::ptr_eq(l, r),
            (Value::ImmutableMap(l), Value::ImmutableMap(r)) => Arc::ptr_eq(l, r),
            (Value::Error(l), Value::Error(r)) => l.equals(r),
            (Value::Function(_), Value::Function(_)) => false,
            (Value::Builtin(l), Value::Builtin(r)) => l == r,
            (Value::Native(l), Value::Native(r)) => Arc::ptr_eq(l, r),
            (Value::Class(l), Value::Class(r)) => Arc::ptr_eq(l, r),
            (
                Value::Instance(l) | Value::InstanceSelf(l),
                Value::Instance(r) | Value::InstanceSelf(r),
            ) => Arc::ptr_eq(l, r),
            (Value::Cell(l), Value::Cell(r)) => Arc::ptr_eq(l, r),
            (Value::Host(l), Value::Host(r)) => Arc::ptr_eq(l, r),
            _ => false,
        }
    }

    /// Shallow clone for mutable containers, a structurally copied error,
    /// identity for everything shared-immutable (functions, classes,
    /// instances, host values).
    pub fn copy_value(&self) -> Value {
        match self {
            Value::Array(items) => Value::array(items.read().clone()),
            Value::ImmutableArray(items) => Value::array(items.as_ref().clone()),
            Value::Map(entries) => Value::map(entries.read().clone()),
            Value::ImmutableMap(entries) => Value::map(entries.as_ref().clone()),
            Value::Bytes(data) => Value::bytes(data.read().clone()),
            Value::Error(inner) => Value::error(inner.copy_value()),
            _ => self.clone(),
        }
    }

    pub fn can_call(&self) -> bool {
        match self {
            Value::Function(_) | Value::Builtin(_) | Value::Native(_) | Value::Class(_) => true,
            Value::Host(host) => host.can_call(),
            _ => false,
        }
    }

    pub fn can_iterate(&self) -> bool {
        match self {
            Value::Array(_)
            | Value::ImmutableArray(_)
            | Value::Map(_)
            | Value::ImmutableMap(_)
            | Value::String(_)
            | Value::Bytes(_) => true,
            Value::Host(host) => host.can_iterate(),
            _ => false,
        }
    }

    pub fn iterate(&self) -> Option<ValueIterator> {
        ValueIterator::for_value(self)
    }

    pub fn can_spread(&self) -> bool {
        matches!(self, Value::Array(_) | Value::ImmutableArray(_))
    }

    pub fn spread_values(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.read().clone()),
            Value::ImmutableArray(items) => Some(items.as_ref().clone()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "<undefined>"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Char(value) => write!(f, "{}", value),
            Value::String(value) => write!(f, "{:?}", value),
            Value::Bytes(value) => write!(f, "{}", String::from_utf8_lossy(&value.read())),
            Value::Time(value) => write!(f, "time({})", value),
            Value::Array(items) => write_array(f, &items.read()),
            Value::ImmutableArray(items) => write_array(f, items),
            Value::Map(entries) => write_map(f, &entries.read()),
            Value::ImmutableMap(entries) => write_map(f, entries),
            Value::Error(inner) => write!(f, "error: {}", inner),
            Value::Function(_) => write!(f, "<compiled-function>"),
            Value::Builtin(builtin) => write!(f, "<builtin-function: {}>", builtin.name),
            Value::Native(native) => write!(f, "<native-function: {}>", native.name),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Instance(instance) | Value::InstanceSelf(instance) => {
                write!(f, "<{} instance>", instance.class.name)
            }
            Value::Iterator(_) => write!(f, "<iterator>"),
            Value::Cell(_) => write!(f, "<object-ptr>"),
            Value::Spread(_) => write!(f, "<spread>"),
            Value::Host(host) => write!(f, "{}", host.to_display()),
        }
    }
}

fn write_array(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    let rendered: Vec<String> = items.iter().map(|item| item.to_string()).collect();
    write!(f, "[{}]", rendered.join(", "))
}

fn write_map(f: &mut fmt::Formatter<'_>, entries: &HashMap<String, Value>) -> fmt::Result {
    // Sorted so the representation is stable despite map iteration order.
    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort();
    let rendered: Vec<String> = keys
        .iter()
        .map(|key| format!("{}: {}", key, entries[*key]))
        .collect();
    write!(f, "{{{}}}", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Undefined.to_string(), "<undefined>");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::String("hi".into()).to_string(), "\"hi\"");
        assert_eq!(
            Value::array(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
        assert_eq!(
            Value::error(Value::String("boom".into())).to_string(),
            "error: \"boom\""
        );
    }

    #[test]
    fn test_is_falsy() {
        assert!(Value::Undefined.is_falsy());
        assert!(Value::Bool(false).is_falsy());
        assert!(Value::Int(0).is_falsy());
        assert!(Value::Float(0.0).is_falsy());
        assert!(Value::Char('\0').is_falsy());
        assert!(Value::String("".into()).is_falsy());
        assert!(Value::array(vec![]).is_falsy());
        assert!(Value::Time(0).is_falsy());

        assert!(!Value::Int(1).is_falsy());
        assert!(!Value::String("x".into()).is_falsy());
        assert!(!Value::error(Value::Undefined).is_falsy());
        assert!(!Value::array(vec![Value::Undefined]).is_falsy());
    }

    #[test]
    fn test_equals_primitives() {
        assert!(Value::Int(1).equals(&Value::Int(1)));
        assert!(Value::Int(1).equals(&Value::Float(1.0)));
        assert!(Value::Float(2.5).equals(&Value::Float(2.5)));
        assert!(Value::String("a".into()).equals(&Value::String("a".into())));
        assert!(!Value::Int(1).equals(&Value::Int(2)));
        assert!(!Value::Undefined.equals(&Value::Int(0)));
    }

    #[test]
    fn test_equals_reference_identity() {
        let array = Value::array(vec![Value::Int(1)]);
        let alias = array.clone();
        let other = Value::array(vec![Value::Int(1)]);
        assert!(array.equals(&alias));
        assert!(!array.equals(&other));

        let error = Value::error(Value::Int(1));
        let error_twin = Value::error(Value::Int(1));
        assert!(error.equals(&error_twin));
    }

    #[test]
    fn test_copy_is_shallow_and_detached() {
        let inner = Value::array(vec![Value::Int(1)]);
        let outer = Value::array(vec![inner.clone(), Value::Int(2)]);
        let copy = outer.copy_value();

        // The copy is a distinct container...
        assert!(!outer.equals(&copy));
        if let Value::Array(items) = &outer {
            items.write().push(Value::Int(3));
        }
        if let Value::Array(items) = &copy {
            assert_eq!(items.read().len(), 2);
        }

        // ...but shares its elements.
        if let (Value::Array(copied), Value::Array(original_inner)) = (&copy, &inner) {
            match &copied.read()[0] {
                Value::Array(first) => assert!(Arc::ptr_eq(first, original_inner)),
                other => panic!("expected array element, got {}", other.type_name()),
            }
        }
    }

    #[test]
    fn test_copy_immutable_yields_mutable() {
        let frozen = Value::ImmutableArray(Arc::new(vec![Value::Int(1)]));
        assert!(matches!(frozen.copy_value(), Value::Array(_)));

        let frozen_map = Value::ImmutableMap(Arc::new(HashMap::new()));
        assert!(matches!(frozen_map.copy_value(), Value::Map(_)));
    }

    #[test]
    fn test_clone_shares_container() {
        let array = Value::array(vec![Value::Int(1)]);
        let alias = array.clone();
        if let Value::Array(items) = &alias {
            items.write().push(Value::Int(2));
        }
        if let Value::Array(items) = &array {
            assert_eq!(items.read().len(), 2);
        }
    }

    #[test]
    fn test_spread_values() {
        let array = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            array.spread_values(),
            Some(vec![Value::Int(1), Value::Int(2)])
        );
        assert!(Value::Int(1).spread_values().is_none());
        assert!(!Value::String("ab".into()).can_spread());
    }

    #[test]
    fn test_type_name() {
        assert_eq!(Value::Undefined.type_name(), "undefined");
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::array(vec![]).type_name(), "array");
        assert_eq!(
            Value::ImmutableArray(Arc::new(vec![])).type_name(),
            "immutable-array"
        );
        assert_eq!(Value::error(Value::Undefined).type_name(), "error");
    }
}
