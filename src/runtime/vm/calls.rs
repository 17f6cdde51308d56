use std::sync::Arc;

use crate::{
    bytecode::op_code::OpCode,
    runtime::{compiled_function::CompiledFunction, error::RuntimeError, frame::Frame, value::Value, Interop},
};

use super::{thread::Runtime, Gil, Thread, MAX_FRAMES, STACK_SIZE};

impl Thread {
    /// `OpCall n` with the stack laid out as `[callee, arg1, .., argN]`.
    ///
    /// In order: splice a trailing spread into place, pack variadic
    /// surplus into an array, check arity, rewrite self-tail-calls in
    /// place, and only then push a frame (or invoke the host callable
    /// directly).
    pub(super) fn execute_call(
        &mut self,
        gil: &mut Gil<'_>,
        num_args: usize,
    ) -> Result<(), RuntimeError> {
        let mut num_args = num_args;

        if num_args > 0 {
            if let Value::Spread(values) = &self.stack[self.sp - 1] {
                let values = Arc::clone(values);
                self.pop();
                if self.sp + values.len() >= STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }
                for value in values.iter() {
                    self.push(value.clone())?;
                }
                num_args = num_args - 1 + values.len();
            }
        }

        let callee_idx = self.sp - 1 - num_args;
        let callee = self.stack[callee_idx].clone();
        match callee {
            Value::Function(func) => self.call_function(func, num_args),
            other if other.can_call() => {
                let args: Vec<Value> = self.stack[self.sp - num_args..self.sp].to_vec();
                for i in callee_idx..self.sp {
                    self.stack[i] = Value::Undefined;
                }
                self.sp = callee_idx;

                let ret = {
                    let mut rt = Runtime {
                        thread: &mut *self,
                        gil: &mut *gil,
                    };
                    rt.call_value(&other, &args)?
                };
                gil.charge_alloc()?;
                self.push(ret)
            }
            other => Err(RuntimeError::NotCallable(other.type_name().into_owned())),
        }
    }

    fn call_function(
        &mut self,
        func: Arc<CompiledFunction>,
        mut num_args: usize,
    ) -> Result<(), RuntimeError> {
        if func.var_args {
            // roll surplus arguments into the last parameter slot
            let fixed = func.num_parameters - 1;
            if num_args >= fixed {
                let var_count = num_args - fixed;
                let start = self.sp - var_count;
                let mut packed = Vec::with_capacity(var_count);
                for i in start..self.sp {
                    packed.push(std::mem::replace(&mut self.stack[i], Value::Undefined));
                }
                self.stack[start] = Value::array(packed);
                self.sp = start + 1;
                num_args = fixed + 1;
            }
        }

        if num_args != func.num_parameters {
            let detail = if func.var_args {
                format!("want>={}, got={}", func.num_parameters - 1, num_args)
            } else {
                format!("want={}, got={}", func.num_parameters, num_args)
            };
            return Err(RuntimeError::WrongNumArguments(detail));
        }

        // a self-recursive call in tail position reuses the current frame
        let current_func = self.current_function();
        let current_bp = self.frames[self.frames_index - 1].base_pointer;
        if Arc::ptr_eq(&func, &current_func) {
            let next = current_func.instructions.get((self.ip + 1) as usize).copied();
            let after = current_func.instructions.get((self.ip + 2) as usize).copied();
            let in_tail_position = next == Some(OpCode::OpReturn as u8)
                || (next == Some(OpCode::OpPop as u8) && after == Some(OpCode::OpReturn as u8));
            if in_tail_position {
                for p in 0..num_args {
                    self.stack[current_bp + p] = self.stack[self.sp - num_args + p].clone();
                }
                let new_sp = self.sp - num_args - 1;
                for i in new_sp..self.sp {
                    self.stack[i] = Value::Undefined;
                }
                self.sp = new_sp;
                self.ip = -1;
                return Ok(());
            }
        }

        if self.frames_index >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow);
        }
        let base_pointer = self.sp - num_args;
        if base_pointer + func.num_locals >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.frames[self.frames_index - 1].ip = self.ip;
        let num_locals = func.num_locals;
        self.push_frame(Frame::new(func, base_pointer));
        self.ip = -1;
        self.sp = base_pointer + num_locals;
        Ok(())
    }
}
