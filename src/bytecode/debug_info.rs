use std::collections::HashMap;

/// A 1-based source position recorded by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

/// Per-function source map, keyed by instruction offset.
///
/// Only the first byte of each instruction is mapped, so lookups walk
/// backwards until they hit a mapped offset. This lets callers resolve an
/// `ip` that points at an operand byte.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionDebugInfo {
    pub name: Option<String>,
    pub file: String,
    pub positions: HashMap<usize, SourcePos>,
}

impl FunctionDebugInfo {
    pub fn new(name: Option<String>, file: impl Into<String>) -> Self {
        Self {
            name,
            file: file.into(),
            positions: HashMap::new(),
        }
    }

    pub fn record(&mut self, ip: usize, pos: SourcePos) {
        self.positions.insert(ip, pos);
    }

    pub fn position_at(&self, ip: usize) -> Option<SourcePos> {
        let mut ip = ip as i64;
        while ip >= 0 {
            if let Some(pos) = self.positions.get(&(ip as usize)) {
                return Some(*pos);
            }
            ip -= 1;
        }
        None
    }
}
