use std::{collections::HashMap, sync::Arc};

use crate::runtime::{
    class::Class,
    convert,
    error::RuntimeError,
    format as value_format,
    native_function::{BuiltinFunction, NativeFunction},
    value::Value,
    Interop, MAX_BYTES_LEN, MAX_STRING_LEN,
};

fn wrong_arity(want: &str, got: usize) -> RuntimeError {
    RuntimeError::WrongNumArguments(format!("want={}, got={}", want, got))
}

fn check_arity(args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(wrong_arity(&expected.to_string(), args.len()));
    }
    Ok(())
}

/// Conversions take the value plus an optional fallback.
fn check_conversion_arity(args: &[Value]) -> Result<(), RuntimeError> {
    if args.is_empty() || args.len() > 2 {
        return Err(wrong_arity("1..2", args.len()));
    }
    Ok(())
}

fn fallback_or_undefined(args: &[Value]) -> Value {
    if args.len() == 2 {
        args[1].clone()
    } else {
        Value::Undefined
    }
}

// len(value) => int
fn builtin_len(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    let len = match &args[0] {
        Value::Array(items) => items.read().len(),
        Value::ImmutableArray(items) => items.len(),
        Value::String(value) => value.len(),
        Value::Bytes(data) => data.read().len(),
        Value::Map(entries) => entries.read().len(),
        Value::ImmutableMap(entries) => entries.len(),
        other => {
            return Err(RuntimeError::InvalidArgumentType {
                name: "first",
                expected: "array/string/bytes/map",
                found: other.type_name().into_owned(),
            })
        }
    };
    Ok(Value::Int(len as i64))
}

// copy(value) => shallow clone
fn builtin_copy(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(args[0].copy_value())
}

// append(array, items...) => new array, even from an immutable one;
// append(array) alone is a fresh copy
fn builtin_append(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.is_empty() {
        return Err(wrong_arity(">=1", args.len()));
    }
    let mut elements = match &args[0] {
        Value::Array(items) => items.read().clone(),
        Value::ImmutableArray(items) => items.as_ref().clone(),
        other => {
            return Err(RuntimeError::InvalidArgumentType {
                name: "first",
                expected: "array",
                found: other.type_name().into_owned(),
            })
        }
    };
    elements.extend_from_slice(&args[1..]);
    Ok(Value::array(elements))
}

fn builtin_string(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_conversion_arity(args)?;
    if let Value::String(_) = &args[0] {
        return Ok(args[0].clone());
    }
    if let Some(text) = convert::to_string_value(&args[0]) {
        if text.len() > MAX_STRING_LEN {
            return Err(RuntimeError::StringLimit);
        }
        return Ok(Value::String(text.into()));
    }
    Ok(fallback_or_undefined(args))
}

fn builtin_int(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_conversion_arity(args)?;
    if let Value::Int(_) = &args[0] {
        return Ok(args[0].clone());
    }
    if let Some(value) = convert::to_int(&args[0]) {
        return Ok(Value::Int(value));
    }
    Ok(fallback_or_undefined(args))
}

fn builtin_bool(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    if let Value::Bool(_) = &args[0] {
        return Ok(args[0].clone());
    }
    match convert::to_bool(&args[0]) {
        Some(value) => Ok(Value::Bool(value)),
        None => Ok(Value::Undefined),
    }
}

fn builtin_float(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_conversion_arity(args)?;
    if let Value::Float(_) = &args[0] {
        return Ok(args[0].clone());
    }
    if let Some(value) = convert::to_float(&args[0]) {
        return Ok(Value::Float(value));
    }
    Ok(fallback_or_undefined(args))
}

fn builtin_char(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_conversion_arity(args)?;
    if let Value::Char(_) = &args[0] {
        return Ok(args[0].clone());
    }
    if let Some(value) = convert::to_char(&args[0]) {
        return Ok(Value::Char(value));
    }
    Ok(fallback_or_undefined(args))
}

// bytes(n) preallocates n zero bytes; bytes(value) converts
fn builtin_bytes(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_conversion_arity(args)?;
    if let Value::Int(size) = &args[0] {
        if *size < 0 {
            return Err(RuntimeError::InvalidArgumentType {
                name: "first",
                expected: "non-negative int",
                found: "negative int".to_string(),
            });
        }
        if *size as usize > MAX_BYTES_LEN {
            return Err(RuntimeError::BytesLimit);
        }
        return Ok(Value::bytes(vec![0; *size as usize]));
    }
    if let Some(data) = convert::to_byte_vec(&args[0]) {
        if data.len() > MAX_BYTES_LEN {
            return Err(RuntimeError::BytesLimit);
        }
        return Ok(Value::bytes(data));
    }
    Ok(fallback_or_undefined(args))
}

fn builtin_time(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_conversion_arity(args)?;
    if let Value::Time(_) = &args[0] {
        return Ok(args[0].clone());
    }
    if let Some(value) = convert::to_time(&args[0]) {
        return Ok(Value::Time(value));
    }
    Ok(fallback_or_undefined(args))
}

fn builtin_is_int(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Int(_))))
}

fn builtin_is_float(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Float(_))))
}

fn builtin_is_string(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::String(_))))
}

fn builtin_is_bool(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Bool(_))))
}

fn builtin_is_char(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Char(_))))
}

fn builtin_is_bytes(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Bytes(_))))
}

fn builtin_is_array(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Array(_))))
}

fn builtin_is_immutable_array(
    _rt: &mut dyn Interop,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::ImmutableArray(_))))
}

fn builtin_is_map(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Map(_))))
}

fn builtin_is_immutable_map(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::ImmutableMap(_))))
}

fn builtin_is_iterable(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(args[0].can_iterate()))
}

fn builtin_is_time(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Time(_))))
}

fn builtin_is_error(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Error(_))))
}

fn builtin_is_undefined(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Undefined)))
}

fn builtin_is_function(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Function(_))))
}

fn builtin_is_callable(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::Bool(args[0].can_call()))
}

fn builtin_type_name(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    check_arity(args, 1)?;
    Ok(Value::String(args[0].type_name().into_owned().into()))
}

// format(fmt, args...) => string
fn builtin_format(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.is_empty() {
        return Err(wrong_arity(">=1", 0));
    }
    let template = match &args[0] {
        Value::String(template) => template,
        other => {
            return Err(RuntimeError::InvalidArgumentType {
                name: "format",
                expected: "string",
                found: other.type_name().into_owned(),
            })
        }
    };
    if args.len() == 1 {
        // strings are immutable, returning the template is safe
        return Ok(args[0].clone());
    }
    let rendered = value_format::format(template, &args[1..])?;
    Ok(Value::String(rendered.into()))
}

// bind(fn, args...) => native function prepending args
fn builtin_bind(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.is_empty() {
        return Err(wrong_arity(">=1", 0));
    }
    Ok(NativeFunction::bind(
        "bind",
        args[0].clone(),
        args[1..].to_vec(),
    ))
}

// class(name, body) or class(base, name, body)
fn builtin_class(_rt: &mut dyn Interop, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(wrong_arity("2..3", args.len()));
    }

    let (base, name, body) = if args.len() == 3 {
        let base = match &args[0] {
            Value::Class(class) => Arc::clone(class),
            other => {
                return Err(RuntimeError::Message(format!(
                    "class: extended object must be a class, got {}",
                    other.type_name()
                )))
            }
        };
        (Some(base), &args[1], &args[2])
    } else {
        (None, &args[0], &args[1])
    };

    let name = match convert::to_string_value(name) {
        Some(name) if !name.is_empty() => name,
        _ => {
            return Err(RuntimeError::Message(
                "class: name must be a non-empty string".to_string(),
            ))
        }
    };

    let mut body_map = HashMap::new();
    match body {
        Value::Map(entries) => {
            for (key, value) in entries.read().iter() {
                body_map.insert(key.clone(), value.copy_value());
            }
        }
        Value::ImmutableMap(entries) => {
            for (key, value) in entries.iter() {
                body_map.insert(key.clone(), value.copy_value());
            }
        }
        other => {
            return Err(RuntimeError::Message(format!(
                "class: body must be map or immutable-map, got {}",
                other.type_name()
            )))
        }
    }

    Ok(Value::Class(Arc::new(Class::new(name, base, body_map))))
}

/// All builtin functions in table order; `OpGetBuiltin` indexes into this.
pub static BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction {
        name: "len",
        func: builtin_len,
    },
    BuiltinFunction {
        name: "copy",
        func: builtin_copy,
    },
    BuiltinFunction {
        name: "append",
        func: builtin_append,
    },
    BuiltinFunction {
        name: "string",
        func: builtin_string,
    },
    BuiltinFunction {
        name: "int",
        func: builtin_int,
    },
    BuiltinFunction {
        name: "bool",
        func: builtin_bool,
    },
    BuiltinFunction {
        name: "float",
        func: builtin_float,
    },
    BuiltinFunction {
        name: "char",
        func: builtin_char,
    },
    BuiltinFunction {
        name: "bytes",
        func: builtin_bytes,
    },
    BuiltinFunction {
        name: "time",
        func: builtin_time,
    },
    BuiltinFunction {
        name: "is_int",
        func: builtin_is_int,
    },
    BuiltinFunction {
        name: "is_float",
        func: builtin_is_float,
    },
    BuiltinFunction {
        name: "is_string",
        func: builtin_is_string,
    },
    BuiltinFunction {
        name: "is_bool",
        func: builtin_is_bool,
    },
    BuiltinFunction {
        name: "is_char",
        func: builtin_is_char,
    },
    BuiltinFunction {
        name: "is_bytes",
        func: builtin_is_bytes,
    },
    BuiltinFunction {
        name: "is_array",
        func: builtin_is_array,
    },
    BuiltinFunction {
        name: "is_immutable_array",
        func: builtin_is_immutable_array,
    },
    BuiltinFunction {
        name: "is_map",
        func: builtin_is_map,
    },
    BuiltinFunction {
        name: "is_immutable_map",
        func: builtin_is_immutable_map,
    },
    BuiltinFunction {
        name: "is_iterable",
        func: builtin_is_iterable,
    },
    BuiltinFunction {
        name: "is_time",
        func: builtin_is_time,
    },
    BuiltinFunction {
        name: "is_error",
        func: builtin_is_error,
    },
    BuiltinFunction {
        name: "is_undefined",
        func: builtin_is_undefined,
    },
    BuiltinFunction {
        name: "is_function",
        func: builtin_is_function,
    },
    BuiltinFunction {
        name: "is_callable",
        func: builtin_is_callable,
    },
    BuiltinFunction {
        name: "type_name",
        func: builtin_type_name,
    },
    BuiltinFunction {
        name: "format",
        func: builtin_format,
    },
    BuiltinFunction {
        name: "bind",
        func: builtin_bind,
    },
    BuiltinFunction {
        name: "class",
        func: builtin_class,
    },
];

pub fn get_builtin(name: &str) -> Option<&'static BuiltinFunction> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub fn get_builtin_index(name: &str) -> Option<usize> {
    BUILTINS.iter().position(|builtin| builtin.name == name)
}
