use std::sync::{atomic::Ordering, Arc};
use std::time::Duration;

use parking_lot::RwLock;

use crate::{
    bytecode::op_code::{read_u8, read_u16, BinOp, OpCode},
    runtime::{
        builtins::BUILTINS,
        convert,
        error::RuntimeError,
        index::{index_assign, slice_value},
        value::Value,
    },
};

use super::{Gil, Thread, MAIN_THREAD_ID, MAX_THREADS};

impl Thread {
    /// The dispatch loop: pre-increments `ip`, decodes, executes.
    ///
    /// Returns on `OpSuspend` (normal completion of a main/micro frame),
    /// when `ip` runs off the end of the entry function, when the abort
    /// flag is raised, or with the first runtime error.
    pub(crate) fn run(&mut self, gil: &mut Gil<'_>) -> Result<(), RuntimeError> {
        let mut func = self.current_function();

        while !self.vm.aborting.load(Ordering::Relaxed) {
            self.ip += 1;
            let ip = self.ip as usize;
            if ip >= func.instructions.len() {
                break;
            }

            let byte = func.instructions[ip];
            let op = OpCode::from_byte(byte)
                .ok_or_else(|| RuntimeError::Message(format!("unknown opcode: {}", byte)))?;

            match op {
                OpCode::OpSuspend => return Ok(()),

                OpCode::OpConstant => {
                    let idx = read_u16(&func.instructions, ip + 1) as usize;
                    self.ip += 2;
                    let constant = self.vm.constants[idx].clone();
                    self.push(constant)?;
                }

                OpCode::OpNull => self.push(Value::Undefined)?,
                OpCode::OpTrue => self.push(Value::Bool(true))?,
                OpCode::OpFalse => self.push(Value::Bool(false))?,

                OpCode::OpBinaryOp => {
                    let op_byte = read_u8(&func.instructions, ip + 1);
                    self.ip += 1;
                    let bin_op = BinOp::from_byte(op_byte).ok_or_else(|| {
                        RuntimeError::Message(format!("unknown binary operator: {}", op_byte))
                    })?;
                    let right = self.pop();
                    let left = self.pop();
                    let result = left.binary_op(bin_op, &right)?;
                    gil.charge_alloc()?;
                    self.push(result)?;
                }

                OpCode::OpEqual => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(Value::Bool(left.equals(&right)))?;
                }
                OpCode::OpNotEqual => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(Value::Bool(!left.equals(&right)))?;
                }

                OpCode::OpLNot => {
                    let operand = self.pop();
                    self.push(Value::Bool(operand.is_falsy()))?;
                }

                OpCode::OpBComplement => {
                    let operand = self.pop();
                    match operand {
                        Value::Int(value) => {
                            gil.charge_alloc()?;
                            self.push(Value::Int(!value))?;
                        }
                        other => {
                            return Err(RuntimeError::InvalidOperator(format!(
                                "^{}",
                                other.type_name()
                            )))
                        }
                    }
                }

                OpCode::OpMinus => {
                    let operand = self.pop();
                    match operand {
                        Value::Int(value) => {
                            gil.charge_alloc()?;
                            self.push(Value::Int(value.wrapping_neg()))?;
                        }
                        Value::Float(value) => {
                            gil.charge_alloc()?;
                            self.push(Value::Float(-value))?;
                        }
                        other => {
                            return Err(RuntimeError::InvalidOperator(format!(
                                "-{}",
                                other.type_name()
                            )))
                        }
                    }
                }

                OpCode::OpJump => {
                    let target = read_u16(&func.instructions, ip + 1) as i64;
                    self.ip = target - 1;
                }
                OpCode::OpJumpFalsy => {
                    let target = read_u16(&func.instructions, ip + 1) as i64;
                    self.ip += 2;
                    let condition = self.pop();
                    if condition.is_falsy() {
                        self.ip = target - 1;
                    }
                }
                OpCode::OpAndJump => {
                    // jump keeps the falsy operand on the stack as the
                    // expression result; otherwise it is discarded
                    let target = read_u16(&func.instructions, ip + 1) as i64;
                    self.ip += 2;
                    if self.stack[self.sp - 1].is_falsy() {
                        self.ip = target - 1;
                    } else {
                        self.pop();
                    }
                }
                OpCode::OpOrJump => {
                    let target = read_u16(&func.instructions, ip + 1) as i64;
                    self.ip += 2;
                    if self.stack[self.sp - 1].is_falsy() {
                        self.pop();
                    } else {
                        self.ip = target - 1;
                    }
                }

                OpCode::OpPop => {
                    self.pop();
                }

                OpCode::OpGetGlobal => {
                    let idx = read_u16(&func.instructions, ip + 1) as usize;
                    self.ip += 2;
                    let value = gil.state().globals[idx].clone();
                    self.push(value)?;
                }
                OpCode::OpSetGlobal => {
                    let idx = read_u16(&func.instructions, ip + 1) as usize;
                    self.ip += 2;
                    let value = self.pop();
                    gil.state().globals[idx] = value;
                }
                OpCode::OpSetSelGlobal => {
                    let idx = read_u16(&func.instructions, ip + 1) as usize;
                    let num_selectors = read_u8(&func.instructions, ip + 3) as usize;
                    self.ip += 3;
                    let (value, selectors) = self.pop_selectors(num_selectors);
                    let dst = gil.state().globals[idx].clone();
                    index_assign(&dst, &value, &selectors)?;
                }

                OpCode::OpDefineLocal => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    let base_pointer = self.frames[self.frames_index - 1].base_pointer;
                    let value = self.pop();
                    self.stack[base_pointer + idx] = value;
                }
                OpCode::OpSetLocal => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    let base_pointer = self.frames[self.frames_index - 1].base_pointer;
                    let value = self.pop();
                    let slot = base_pointer + idx;
                    // assign through a captured cell so closures observe
                    // the write; the cell itself stays in the slot
                    if let Value::Cell(cell) = &self.stack[slot] {
                        *cell.write() = value;
                    } else {
                        self.stack[slot] = value;
                    }
                }
                OpCode::OpGetLocal => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    let base_pointer = self.frames[self.frames_index - 1].base_pointer;
                    let value = match &self.stack[base_pointer + idx] {
                        Value::Cell(cell) => cell.read().clone(),
                        other => other.clone(),
                    };
                    self.push(value)?;
                }
                OpCode::OpGetLocalPtr => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    let base_pointer = self.frames[self.frames_index - 1].base_pointer;
                    let slot = base_pointer + idx;
                    let cell = match &self.stack[slot] {
                        Value::Cell(cell) => Arc::clone(cell),
                        _ => {
                            // upgrade the slot so later SetLocal writes
                            // reach the closures capturing it
                            let current =
                                std::mem::replace(&mut self.stack[slot], Value::Undefined);
                            let cell = Arc::new(RwLock::new(current));
                            self.stack[slot] = Value::Cell(Arc::clone(&cell));
                            cell
                        }
                    };
                    self.push(Value::Cell(cell))?;
                }
                OpCode::OpSetSelLocal => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    let num_selectors = read_u8(&func.instructions, ip + 2) as usize;
                    self.ip += 2;
                    let (value, selectors) = self.pop_selectors(num_selectors);
                    let base_pointer = self.frames[self.frames_index - 1].base_pointer;
                    let dst = match &self.stack[base_pointer + idx] {
                        Value::Cell(cell) => cell.read().clone(),
                        other => other.clone(),
                    };
                    index_assign(&dst, &value, &selectors)?;
                }

                OpCode::OpGetFree => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    let value = func.free[idx].read().clone();
                    self.push(value)?;
                }
                OpCode::OpSetFree => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    let value = self.pop();
                    *func.free[idx].write() = value;
                }
                OpCode::OpGetFreePtr => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    self.push(Value::Cell(Arc::clone(&func.free[idx])))?;
                }
                OpCode::OpSetSelFree => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    let num_selectors = read_u8(&func.instructions, ip + 2) as usize;
                    self.ip += 2;
                    let (value, selectors) = self.pop_selectors(num_selectors);
                    let dst = func.free[idx].read().clone();
                    index_assign(&dst, &value, &selectors)?;
                }

                OpCode::OpGetBuiltin => {
                    let idx = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    self.push(Value::Builtin(BUILTINS[idx].clone()))?;
                }

                OpCode::OpClosure => {
                    let const_idx = read_u16(&func.instructions, ip + 1) as usize;
                    let num_free = read_u8(&func.instructions, ip + 3) as usize;
                    self.ip += 3;
                    let base_fn = match &self.vm.constants[const_idx] {
                        Value::Function(base_fn) => Arc::clone(base_fn),
                        other => {
                            return Err(RuntimeError::Message(format!(
                                "not a function: {}",
                                other.type_name()
                            )))
                        }
                    };
                    let start = self.sp - num_free;
                    let mut free = Vec::with_capacity(num_free);
                    for i in start..self.sp {
                        let value = std::mem::replace(&mut self.stack[i], Value::Undefined);
                        match value {
                            Value::Cell(cell) => free.push(cell),
                            other => free.push(Arc::new(RwLock::new(other))),
                        }
                    }
                    self.sp = start;
                    gil.charge_alloc()?;
                    let closure = base_fn.with_free(free);
                    self.push(Value::Function(Arc::new(closure)))?;
                }

                OpCode::OpCall => {
                    let num_args = read_u8(&func.instructions, ip + 1) as usize;
                    self.ip += 1;
                    self.execute_call(gil, num_args)?;
                    func = self.current_function();
                }

                OpCode::OpReturn => {
                    let has_value = read_u8(&func.instructions, ip + 1) == 1;
                    self.ip += 1;
                    if self.frames_index <= 1 {
                        return Err(RuntimeError::Message(
                            "return from top-level frame".to_string(),
                        ));
                    }
                    let ret = if has_value {
                        self.stack[self.sp - 1].clone()
                    } else {
                        Value::Undefined
                    };
                    self.frames_index -= 1;
                    let base_pointer = self.frames[self.frames_index].base_pointer;
                    self.ip = self.frames[self.frames_index - 1].ip;
                    for i in base_pointer..self.sp {
                        self.stack[i] = Value::Undefined;
                    }
                    self.sp = base_pointer;
                    // the callee slot receives the return value
                    self.stack[self.sp - 1] = ret;
                    func = self.current_function();
                }

                OpCode::OpArray => {
                    let num_elements = read_u16(&func.instructions, ip + 1) as usize;
                    self.ip += 2;
                    let start = self.sp - num_elements;
                    let mut elements = Vec::with_capacity(num_elements);
                    for i in start..self.sp {
                        let element = std::mem::replace(&mut self.stack[i], Value::Undefined);
                        if let Value::Spread(values) = element {
                            elements.extend(values.iter().cloned());
                        } else {
                            elements.push(element);
                        }
                    }
                    self.sp = start;
                    gil.charge_alloc()?;
                    self.push(Value::array(elements))?;
                }

                OpCode::OpMap => {
                    let num_elements = read_u16(&func.instructions, ip + 1) as usize;
                    self.ip += 2;
                    let start = self.sp - num_elements;
                    let mut entries = std::collections::HashMap::with_capacity(num_elements / 2);
                    let mut i = start;
                    while i < self.sp {
                        let key = std::mem::replace(&mut self.stack[i], Value::Undefined);
                        let value = std::mem::replace(&mut self.stack[i + 1], Value::Undefined);
                        match key {
                            Value::String(key) => entries.insert(key.to_string(), value),
                            other => {
                                return Err(RuntimeError::InvalidIndexType(
                                    other.type_name().into_owned(),
                                ))
                            }
                        };
                        i += 2;
                    }
                    self.sp = start;
                    gil.charge_alloc()?;
                    self.push(Value::map(entries))?;
                }

                OpCode::OpError => {
                    let value = self.pop();
                    gil.charge_alloc()?;
                    self.push(Value::error(value))?;
                }

                OpCode::OpImmutable => {
                    let value = self.pop();
                    match value {
                        Value::Array(items) => {
                            gil.charge_alloc()?;
                            let frozen = items.read().clone();
                            self.push(Value::ImmutableArray(Arc::new(frozen)))?;
                        }
                        Value::Map(entries) => {
                            gil.charge_alloc()?;
                            let frozen = entries.read().clone();
                            self.push(Value::ImmutableMap(Arc::new(frozen)))?;
                        }
                        other => self.push(other)?,
                    }
                }

                OpCode::OpIndex => {
                    let index = self.pop();
                    let left = self.pop();
                    let value = left.index_get(&index)?;
                    self.push(value)?;
                }

                OpCode::OpSliceIndex => {
                    let high = self.pop();
                    let low = self.pop();
                    let left = self.pop();
                    let value = slice_value(&left, &low, &high)?;
                    gil.charge_alloc()?;
                    self.push(value)?;
                }

                OpCode::OpSpread => {
                    let target = self.pop();
                    let values = target.spread_values().ok_or_else(|| {
                        RuntimeError::NotSpreadable(target.type_name().into_owned())
                    })?;
                    self.push(Value::Spread(Arc::new(values)))?;
                }

                OpCode::OpIteratorInit => {
                    let target = self.pop();
                    let iterator = target
                        .iterate()
                        .ok_or_else(|| RuntimeError::NotIterable(target.type_name().into_owned()))?;
                    gil.charge_alloc()?;
                    self.push(Value::Iterator(Arc::new(RwLock::new(iterator))))?;
                }
                OpCode::OpIteratorNext => {
                    let iterator = self.pop();
                    let more = match &iterator {
                        Value::Iterator(iterator) => iterator.write().advance(),
                        other => {
                            return Err(RuntimeError::Message(format!(
                                "not an iterator: {}",
                                other.type_name()
                            )))
                        }
                    };
                    self.push(Value::Bool(more))?;
                }
                OpCode::OpIteratorKey => {
                    let iterator = self.pop();
                    let key = match &iterator {
                        Value::Iterator(iterator) => iterator.read().key(),
                        other => {
                            return Err(RuntimeError::Message(format!(
                                "not an iterator: {}",
                                other.type_name()
                            )))
                        }
                    };
                    self.push(key)?;
                }
                OpCode::OpIteratorValue => {
                    let iterator = self.pop();
                    let value = match &iterator {
                        Value::Iterator(iterator) => iterator.read().current(),
                        other => {
                            return Err(RuntimeError::Message(format!(
                                "not an iterator: {}",
                                other.type_name()
                            )))
                        }
                    };
                    self.push(value)?;
                }

                OpCode::OpSpawn => {
                    let value = self.pop();
                    let thread_fn = match value {
                        Value::Function(thread_fn) => thread_fn,
                        other => {
                            return Err(RuntimeError::Message(format!(
                                "cannot spawn thread with non-function {}",
                                other.type_name()
                            )))
                        }
                    };
                    if thread_fn.num_parameters != 0 {
                        return Err(RuntimeError::Message(
                            "thread function must take no parameters".to_string(),
                        ));
                    }
                    let child = {
                        let state = gil.state();
                        let slot = state.pool.pop().ok_or_else(|| {
                            RuntimeError::Message(format!(
                                "thread pool exhausted (max {} threads)",
                                MAX_THREADS
                            ))
                        })?;
                        state.thread_count += 1;
                        let id = state.thread_count;
                        state.threads.insert(id);
                        Thread::spawned(Arc::clone(&self.vm), id, slot, thread_fn)
                    };
                    let id = child.id();
                    tracing::trace!(thread = id, "spawned thread");
                    self.push(Value::Int(id as i64))?;
                    // the child races for the lock; it blocks until this
                    // thread suspends or finishes
                    std::thread::spawn(move || child.execute());
                }

                OpCode::OpWait => {
                    let value = self.pop();
                    let tid = convert::to_int(&value).unwrap_or(0) as u64;
                    if tid == MAIN_THREAD_ID {
                        return Err(RuntimeError::Message(
                            "invalid wait: cannot wait on main thread".to_string(),
                        ));
                    }
                    {
                        let state = gil.state();
                        if !state.threads.contains(&tid)
                            && !state.thread_results.contains_key(&tid)
                        {
                            return Err(RuntimeError::Message(format!(
                                "invalid wait: no such thread {}",
                                tid
                            )));
                        }
                    }
                    let result = loop {
                        if self.vm.aborting.load(Ordering::Relaxed) {
                            return Ok(());
                        }
                        if let Some(result) = gil.state().thread_results.remove(&tid) {
                            break result;
                        }
                        gil.suspend(Duration::from_millis(100));
                    };
                    tracing::trace!(thread = tid, "wait resolved");
                    self.push(result)?;
                }

                OpCode::OpSleep => {
                    let value = self.pop();
                    let millis = convert::to_int(&value).unwrap_or(0).max(0) as u64;
                    gil.suspend(Duration::from_millis(millis));
                }
            }
        }

        Ok(())
    }
}
