use crate::runtime::{convert, error::RuntimeError, value::Value, MAX_STRING_LEN};

/// Printf-style formatting over runtime values.
///
/// Supported verbs: `%v` and `%s` (raw text), `%d`, `%f`, `%t`, `%c`,
/// `%q` (quoted), `%x` (lower hex int), `%%`. Surplus arguments are
/// ignored; missing arguments and unknown verbs are errors.
pub fn format(template: &str, args: &[Value]) -> Result<String, RuntimeError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    let mut next_arg = 0;

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let verb = chars
            .next()
            .ok_or_else(|| RuntimeError::Message("format: dangling '%'".to_string()))?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let arg = args.get(next_arg).ok_or_else(|| {
            RuntimeError::Message(format!("format: missing argument for '%{}'", verb))
        })?;
        next_arg += 1;

        match verb {
            'v' | 's' => out.push_str(&raw_text(arg)),
            'd' => match convert::to_int(arg) {
                Some(v) => out.push_str(&v.to_string()),
                None => return Err(verb_mismatch('d', "int", arg)),
            },
            'f' => match convert::to_float(arg) {
                Some(v) => out.push_str(&format!("{:.6}", v)),
                None => return Err(verb_mismatch('f', "float", arg)),
            },
            't' => out.push_str(if arg.is_falsy() { "false" } else { "true" }),
            'c' => match convert::to_char(arg) {
                Some(v) => out.push(v),
                None => return Err(verb_mismatch('c', "char", arg)),
            },
            'q' => out.push_str(&format!("{:?}", raw_text(arg))),
            'x' => match convert::to_int(arg) {
                Some(v) => out.push_str(&format!("{:x}", v)),
                None => return Err(verb_mismatch('x', "int", arg)),
            },
            other => {
                return Err(RuntimeError::Message(format!(
                    "format: unknown verb '%{}'",
                    other
                )))
            }
        }
        if out.len() > MAX_STRING_LEN {
            return Err(RuntimeError::StringLimit);
        }
    }

    Ok(out)
}

/// Unquoted text form: strings and chars raw, everything else the display
/// representation (so `undefined` renders as `<undefined>`).
fn raw_text(value: &Value) -> String {
    match value {
        Value::String(v) => v.to_string(),
        Value::Char(v) => v.to_string(),
        other => other.to_string(),
    }
}

fn verb_mismatch(verb: char, expected: &'static str, found: &Value) -> RuntimeError {
    RuntimeError::Message(format!(
        "format: '%{}' expects {}, got {}",
        verb,
        expected,
        found.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_verbs() {
        let out = format(
            "%s=%d (%f, %t, %c)",
            &[
                Value::String("n".into()),
                Value::Int(42),
                Value::Float(1.5),
                Value::Bool(true),
                Value::Char('x'),
            ],
        )
        .unwrap();
        assert_eq!(out, "n=42 (1.500000, true, x)");
    }

    #[test]
    fn test_undefined_renders_via_s() {
        let out = format("%s|%s", &[Value::String("a".into()), Value::Undefined]).unwrap();
        assert_eq!(out, "a|<undefined>");
    }

    #[test]
    fn test_percent_escape() {
        assert_eq!(format("100%%", &[]).unwrap(), "100%");
    }

    #[test]
    fn test_missing_argument() {
        let err = format("%d", &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::Message(_)));
    }

    #[test]
    fn test_unknown_verb() {
        let err = format("%z", &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::Message(_)));
    }
}
