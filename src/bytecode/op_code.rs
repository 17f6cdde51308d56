use std::fmt;

/// One-byte opcodes of the Ember virtual machine.
///
/// The discriminant values and the operand widths reported by
/// [`operand_widths`] are the binary contract between the compiler and the
/// interpreter; changing either breaks every compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    OpConstant = 0,
    OpNull = 1,
    OpTrue = 2,
    OpFalse = 3,
    OpGetGlobal = 4,
    OpSetGlobal = 5,
    OpGetLocal = 6,
    OpSetLocal = 7,
    OpDefineLocal = 8,
    OpGetBuiltin = 9,
    OpGetFree = 10,
    OpSetFree = 11,
    OpGetFreePtr = 12,
    OpGetLocalPtr = 13,
    OpBinaryOp = 14,
    OpEqual = 15,
    OpNotEqual = 16,
    OpLNot = 17,
    OpBComplement = 18,
    OpMinus = 19,
    OpJump = 20,
    OpJumpFalsy = 21,
    OpAndJump = 22,
    OpOrJump = 23,
    OpPop = 24,
    OpReturn = 25,
    OpSuspend = 26,
    OpArray = 27,
    OpMap = 28,
    OpError = 29,
    OpImmutable = 30,
    OpIndex = 31,
    OpSliceIndex = 32,
    OpSetSelGlobal = 33,
    OpSetSelLocal = 34,
    OpSetSelFree = 35,
    OpClosure = 36,
    OpCall = 37,
    OpSpread = 38,
    OpIteratorInit = 39,
    OpIteratorNext = 40,
    OpIteratorKey = 41,
    OpIteratorValue = 42,
    OpSpawn = 43,
    OpWait = 44,
    OpSleep = 45,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        let op = match byte {
            0 => OpCode::OpConstant,
            1 => OpCode::OpNull,
            2 => OpCode::OpTrue,
            3 => OpCode::OpFalse,
            4 => OpCode::OpGetGlobal,
            5 => OpCode::OpSetGlobal,
            6 => OpCode::OpGetLocal,
            7 => OpCode::OpSetLocal,
            8 => OpCode::OpDefineLocal,
            9 => OpCode::OpGetBuiltin,
            10 => OpCode::OpGetFree,
            11 => OpCode::OpSetFree,
            12 => OpCode::OpGetFreePtr,
            13 => OpCode::OpGetLocalPtr,
            14 => OpCode::OpBinaryOp,
            15 => OpCode::OpEqual,
            16 => OpCode::OpNotEqual,
            17 => OpCode::OpLNot,
            18 => OpCode::OpBComplement,
            19 => OpCode::OpMinus,
            20 => OpCode::OpJump,
            21 => OpCode::OpJumpFalsy,
            22 => OpCode::OpAndJump,
            23 => OpCode::OpOrJump,
            24 => OpCode::OpPop,
            25 => OpCode::OpReturn,
            26 => OpCode::OpSuspend,
            27 => OpCode::OpArray,
            28 => OpCode::OpMap,
            29 => OpCode::OpError,
            30 => OpCode::OpImmutable,
            31 => OpCode::OpIndex,
            32 => OpCode::OpSliceIndex,
            33 => OpCode::OpSetSelGlobal,
            34 => OpCode::OpSetSelLocal,
            35 => OpCode::OpSetSelFree,
            36 => OpCode::OpClosure,
            37 => OpCode::OpCall,
            38 => OpCode::OpSpread,
            39 => OpCode::OpIteratorInit,
            40 => OpCode::OpIteratorNext,
            41 => OpCode::OpIteratorKey,
            42 => OpCode::OpIteratorValue,
            43 => OpCode::OpSpawn,
            44 => OpCode::OpWait,
            45 => OpCode::OpSleep,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Binary operator token carried as the operand byte of [`OpCode::OpBinaryOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Rem = 4,
    BitAnd = 5,
    BitOr = 6,
    BitXor = 7,
    Shl = 8,
    Shr = 9,
    Less = 10,
    Greater = 11,
    LessEq = 12,
    GreaterEq = 13,
}

impl BinOp {
    pub fn from_byte(byte: u8) -> Option<BinOp> {
        let op = match byte {
            0 => BinOp::Add,
            1 => BinOp::Sub,
            2 => BinOp::Mul,
            3 => BinOp::Div,
            4 => BinOp::Rem,
            5 => BinOp::BitAnd,
            6 => BinOp::BitOr,
            7 => BinOp::BitXor,
            8 => BinOp::Shl,
            9 => BinOp::Shr,
            10 => BinOp::Less,
            11 => BinOp::Greater,
            12 => BinOp::LessEq,
            13 => BinOp::GreaterEq,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Less => "<",
            BinOp::Greater => ">",
            BinOp::LessEq => "<=",
            BinOp::GreaterEq => ">=",
        };
        write!(f, "{}", symbol)
    }
}

pub fn operand_widths(op: OpCode) -> Vec<usize> {
    match op {
        OpCode::OpConstant
        | OpCode::OpGetGlobal
        | OpCode::OpSetGlobal
        | OpCode::OpJump
        | OpCode::OpJumpFalsy
        | OpCode::OpAndJump
        | OpCode::OpOrJump
        | OpCode::OpArray
        | OpCode::OpMap => vec![2],
        OpCode::OpGetLocal
        | OpCode::OpSetLocal
        | OpCode::OpDefineLocal
        | OpCode::OpGetBuiltin
        | OpCode::OpGetFree
        | OpCode::OpSetFree
        | OpCode::OpGetFreePtr
        | OpCode::OpGetLocalPtr
        | OpCode::OpBinaryOp
        | OpCode::OpReturn
        | OpCode::OpCall => vec![1],
        OpCode::OpClosure | OpCode::OpSetSelGlobal => vec![2, 1],
        OpCode::OpSetSelLocal | OpCode::OpSetSelFree => vec![1, 1],
        _ => vec![],
    }
}

pub type Instructions = Vec<u8>;

/// Encodes an instruction: the opcode byte followed by its operands in
/// big-endian order, each truncated to the width [`operand_widths`] reports.
pub fn make(op: OpCode, operands: &[usize]) -> Instructions {
    let widths = operand_widths(op);
    let mut instruction = vec![op as u8];

    for (i, operand) in operands.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(0);
        match width {
            1 => instruction.push(*operand as u8),
            2 => {
                instruction.push((*operand >> 8) as u8);
                instruction.push(*operand as u8);
            }
            _ => {}
        }
    }

    instruction
}

pub fn read_u16(instructions: &[u8], offset: usize) -> u16 {
    ((instructions[offset] as u16) << 8) | (instructions[offset + 1] as u16)
}

pub fn read_u8(instructions: &[u8], offset: usize) -> u8 {
    instructions[offset]
}

pub fn disassemble(instructions: &Instructions) -> String {
    let mut result = String::new();
    let mut i = 0;

    while i < instructions.len() {
        let op = match OpCode::from_byte(instructions[i]) {
            Some(op) => op,
            None => {
                result.push_str(&format!("{:04} <bad opcode {}>\n", i, instructions[i]));
                i += 1;
                continue;
            }
        };
        let widths = operand_widths(op);

        let mut operands = Vec::new();
        let mut offset = i + 1;

        for width in widths {
            match width {
                1 => {
                    operands.push(read_u8(instructions, offset) as usize);
                    offset += 1;
                }
                2 => {
                    operands.push(read_u16(instructions, offset) as usize);
                    offset += 2;
                }
                _ => {}
            }
        }

        if operands.is_empty() {
            result.push_str(&format!("{:04} {}\n", i, op));
        } else {
            let operand_str = operands
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            result.push_str(&format!("{:04} {} {}\n", i, op, operand_str));
        }
        i = offset;
    }

    result
}
