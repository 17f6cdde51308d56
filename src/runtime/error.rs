use std::fmt;

use thiserror::Error;

/// Error currency of the runtime.
///
/// Every fallible value operation and every opcode returns one of these;
/// the dispatch loop ends on the first error and the VM surface wraps it
/// into a [`Traceback`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("wrong number of arguments: {0}")]
    WrongNumArguments(String),
    #[error("invalid type for argument '{name}': expected {expected}, found {found}")]
    InvalidArgumentType {
        name: &'static str,
        expected: &'static str,
        found: String,
    },
    #[error("invalid operation: {0}")]
    InvalidOperator(String),
    #[error("invalid index type: {0}")]
    InvalidIndexType(String),
    #[error("invalid index value type: {0}")]
    InvalidIndexValueType(String),
    #[error("not indexable: {0}")]
    NotIndexable(String),
    #[error("not index-assignable: {0}")]
    NotIndexAssignable(String),
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(i64),
    #[error("invalid slice range: {low} > {high}")]
    InvalidSliceRange { low: i64, high: i64 },
    #[error("string size limit exceeded")]
    StringLimit,
    #[error("bytes size limit exceeded")]
    BytesLimit,
    #[error("object allocation limit exceeded")]
    ObjectAllocLimit,
    #[error("stack overflow")]
    StackOverflow,
    #[error("not callable: {0}")]
    NotCallable(String),
    #[error("not iterable: {0}")]
    NotIterable(String),
    #[error("cannot spread value of type {0}")]
    NotSpreadable(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0}")]
    Message(String),
}

/// One resolved frame of a failing call stack, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub name: String,
    /// Preformatted `file:line:column`, when the function carries debug info.
    pub location: Option<String>,
}

/// A runtime error annotated with the source positions of the active frames
/// at the moment of failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Traceback {
    pub error: RuntimeError,
    pub frames: Vec<TraceEntry>,
}

impl fmt::Display for Traceback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime Error: {}", self.error)?;
        for entry in &self.frames {
            write!(f, "\n\tat {}", entry.name)?;
            if let Some(location) = &entry.location {
                write!(f, " ({})", location)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Traceback {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traceback_display() {
        let traceback = Traceback {
            error: RuntimeError::DivisionByZero,
            frames: vec![
                TraceEntry {
                    name: "inner".to_string(),
                    location: Some("demo.em:2:5".to_string()),
                },
                TraceEntry {
                    name: "<anonymous>".to_string(),
                    location: None,
                },
            ],
        };
        assert_eq!(
            traceback.to_string(),
            "Runtime Error: division by zero\n\tat inner (demo.em:2:5)\n\tat <anonymous>"
        );
    }
}
