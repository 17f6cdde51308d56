use std::cmp::Ordering;

use crate::bytecode::op_code::BinOp;
use crate::runtime::{error::RuntimeError, value::Value, MAX_BYTES_LEN, MAX_STRING_LEN};

impl Value {
    /// Applies a binary operator, producing a new value.
    ///
    /// Int promotes to Float when the other operand is Float. `+`
    /// concatenates strings, bytes, and arrays into fresh values; ordering
    /// operators are lexicographic on strings and bytes. Unsupported
    /// combinations fail with `InvalidOperator`.
    pub fn binary_op(&self, op: BinOp, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(l), Value::Int(r)) => int_op(*l, op, *r),
            (Value::Int(l), Value::Float(r)) => float_op(*l as f64, op, *r),
            (Value::Float(l), Value::Int(r)) => float_op(*l, op, *r as f64),
            (Value::Float(l), Value::Float(r)) => float_op(*l, op, *r),
            (Value::Int(l), Value::Char(r)) if op == BinOp::Add => char_shift(*r, *l),
            (Value::Char(l), Value::Int(r)) => match op {
                BinOp::Add => char_shift(*l, *r),
                BinOp::Sub => char_shift(*l, -*r),
                _ => Err(invalid(self, op, rhs)),
            },
            (Value::Char(l), Value::Char(r)) => match op {
                BinOp::Sub => Ok(Value::Int(*l as i64 - *r as i64)),
                _ => ordering_op(op, l.cmp(r)).ok_or_else(|| invalid(self, op, rhs)),
            },
            (Value::String(l), Value::String(r)) => match op {
                BinOp::Add => {
                    if l.len() + r.len() > MAX_STRING_LEN {
                        return Err(RuntimeError::StringLimit);
                    }
                    Ok(Value::String(format!("{}{}", l, r).into()))
                }
                _ => ordering_op(op, l.as_ref().cmp(r.as_ref()))
                    .ok_or_else(|| invalid(self, op, rhs)),
            },
            (Value::String(l), Value::Char(r)) if op == BinOp::Add => {
                if l.len() + r.len_utf8() > MAX_STRING_LEN {
                    return Err(RuntimeError::StringLimit);
                }
                Ok(Value::String(format!("{}{}", l, r).into()))
            }
            (Value::Char(l), Value::String(r)) if op == BinOp::Add => {
                if l.len_utf8() + r.len() > MAX_STRING_LEN {
                    return Err(RuntimeError::StringLimit);
                }
                Ok(Value::String(format!("{}{}", l, r).into()))
            }
            (Value::Bytes(l), Value::Bytes(r)) => match op {
                BinOp::Add => {
                    let left = l.read();
                    let right = r.read();
                    if left.len() + right.len() > MAX_BYTES_LEN {
                        return Err(RuntimeError::BytesLimit);
                    }
                    let mut joined = Vec::with_capacity(left.len() + right.len());
                    joined.extend_from_slice(&left);
                    joined.extend_from_slice(&right);
                    Ok(Value::bytes(joined))
                }
                _ => ordering_op(op, l.read().as_slice().cmp(r.read().as_slice()))
                    .ok_or_else(|| invalid(self, op, rhs)),
            },
            (Value::Array(_) | Value::ImmutableArray(_), Value::Array(_) | Value::ImmutableArray(_))
                if op == BinOp::Add =>
            {
                // spread_values is infallible for array variants
                let mut joined = self.spread_values().unwrap_or_default();
                joined.extend(rhs.spread_values().unwrap_or_default());
                Ok(Value::array(joined))
            }
            (Value::Time(l), Value::Int(r)) => match op {
                BinOp::Add => Ok(Value::Time(l.wrapping_add(*r))),
                BinOp::Sub => Ok(Value::Time(l.wrapping_sub(*r))),
                _ => Err(invalid(self, op, rhs)),
            },
            (Value::Int(l), Value::Time(r)) if op == BinOp::Add => {
                Ok(Value::Time(l.wrapping_add(*r)))
            }
            (Value::Time(l), Value::Time(r)) => match op {
                BinOp::Sub => Ok(Value::Int(l.wrapping_sub(*r))),
                _ => ordering_op(op, l.cmp(r)).ok_or_else(|| invalid(self, op, rhs)),
            },
            _ => Err(invalid(self, op, rhs)),
        }
    }
}

fn invalid(left: &Value, op: BinOp, right: &Value) -> RuntimeError {
    RuntimeError::InvalidOperator(format!(
        "{} {} {}",
        left.type_name(),
        op,
        right.type_name()
    ))
}

fn int_op(l: i64, op: BinOp, r: i64) -> Result<Value, RuntimeError> {
    let value = match op {
        BinOp::Add => Value::Int(l.wrapping_add(r)),
        BinOp::Sub => Value::Int(l.wrapping_sub(r)),
        BinOp::Mul => Value::Int(l.wrapping_mul(r)),
        BinOp::Div => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Int(l.wrapping_div(r))
        }
        BinOp::Rem => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Int(l.wrapping_rem(r))
        }
        BinOp::BitAnd => Value::Int(l & r),
        BinOp::BitOr => Value::Int(l | r),
        BinOp::BitXor => Value::Int(l ^ r),
        BinOp::Shl => {
            if r < 0 {
                return Err(RuntimeError::InvalidOperator(format!("int << {}", r)));
            }
            Value::Int(l.checked_shl(r as u32).unwrap_or(0))
        }
        BinOp::Shr => {
            if r < 0 {
                return Err(RuntimeError::InvalidOperator(format!("int >> {}", r)));
            }
            // shifting past the width keeps the sign
            Value::Int(l.checked_shr(r as u32).unwrap_or(l >> 63))
        }
        BinOp::Less => Value::Bool(l < r),
        BinOp::Greater => Value::Bool(l > r),
        BinOp::LessEq => Value::Bool(l <= r),
        BinOp::GreaterEq => Value::Bool(l >= r),
    };
    Ok(value)
}

fn float_op(l: f64, op: BinOp, r: f64) -> Result<Value, RuntimeError> {
    let value = match op {
        BinOp::Add => Value::Float(l + r),
        BinOp::Sub => Value::Float(l - r),
        BinOp::Mul => Value::Float(l * r),
        BinOp::Div => Value::Float(l / r),
        BinOp::Rem => Value::Float(l % r),
        BinOp::Less => Value::Bool(l < r),
        BinOp::Greater => Value::Bool(l > r),
        BinOp::LessEq => Value::Bool(l <= r),
        BinOp::GreaterEq => Value::Bool(l >= r),
        _ => {
            return Err(RuntimeError::InvalidOperator(format!(
                "float {} float",
                op
            )))
        }
    };
    Ok(value)
}

fn char_shift(c: char, offset: i64) -> Result<Value, RuntimeError> {
    let code = c as i64 + offset;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| {
            RuntimeError::InvalidOperator(format!("char shifted out of range: {}", code))
        })
}

fn ordering_op(op: BinOp, ordering: Ordering) -> Option<Value> {
    let value = match op {
        BinOp::Less => Value::Bool(ordering == Ordering::Less),
        BinOp::Greater => Value::Bool(ordering == Ordering::Greater),
        BinOp::LessEq => Value::Bool(ordering != Ordering::Greater),
        BinOp::GreaterEq => Value::Bool(ordering != Ordering::Less),
        _ => return None,
    };
    Some(value)
}
