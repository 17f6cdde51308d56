use std::sync::Arc;

use crate::runtime::{
    compiled_function::CompiledFunction,
    error::{RuntimeError, TraceEntry, Traceback},
    frame::Frame,
    value::Value,
    Interop,
};

use super::{Gil, Shared, Thread, ThreadSlot, MAIN_THREAD_ID, MAX_FRAMES, STACK_SIZE};

impl Thread {
    /// Main thread: runs the program's main function in frame 0. The main
    /// function ends with `OpSuspend` rather than `OpReturn`, so its frame
    /// never pops.
    pub(crate) fn main(vm: Arc<Shared>, slot: ThreadSlot) -> Self {
        let main_fn = Arc::clone(&vm.main_fn);
        let sp = main_fn.num_locals;
        let mut thread = Thread {
            vm,
            id: MAIN_THREAD_ID,
            is_main: true,
            stack: slot.stack,
            sp,
            frames: slot.frames,
            frames_index: 1,
            ip: -1,
        };
        thread.frames.clear();
        thread.frames.push(Frame::new(main_fn, 0));
        thread
    }

    /// Spawned thread: the entry frame is the `OpCall 0; OpSuspend` stub
    /// with the thread function as callee, so at suspension the thread's
    /// result is simply the top of its stack.
    pub(crate) fn spawned(
        vm: Arc<Shared>,
        id: u64,
        slot: ThreadSlot,
        func: Arc<CompiledFunction>,
    ) -> Self {
        let mut thread = Thread {
            vm,
            id,
            is_main: false,
            stack: slot.stack,
            sp: 0,
            frames: slot.frames,
            frames_index: 1,
            ip: -1,
        };
        thread.frames.clear();
        thread
            .frames
            .push(Frame::new(Arc::new(CompiledFunction::micro_call(0)), 0));
        thread.stack[0] = Value::Function(func);
        thread.sp = 1;
        thread
    }

    /// Entry point of a spawned OS thread: race for the lock, run, publish
    /// the result, recycle the context.
    pub(crate) fn execute(mut self) {
        let vm = Arc::clone(&self.vm);
        let mut gil = Gil::acquire(&vm);
        let result = self.run(&mut gil);

        if !self.is_main {
            let id = self.id;
            let outcome = match result {
                Ok(()) => {
                    if self.sp > 0 {
                        self.stack[self.sp - 1].clone()
                    } else {
                        Value::Undefined
                    }
                }
                Err(error) => Value::error(Value::String(error.to_string().into())),
            };
            tracing::trace!(thread = id, "thread finished");
            let state = gil.state();
            state.thread_results.insert(id, outcome);
            state.threads.remove(&id);
            state.pool.push(self.into_slot());
        }
    }

    fn into_slot(mut self) -> ThreadSlot {
        for slot in self.stack.iter_mut() {
            *slot = Value::Undefined;
        }
        self.frames.clear();
        ThreadSlot {
            stack: self.stack,
            frames: self.frames,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn sp(&self) -> usize {
        self.sp
    }

    pub(crate) fn stack_top(&self) -> Option<Value> {
        if self.sp > 0 {
            Some(self.stack[self.sp - 1].clone())
        } else {
            None
        }
    }

    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Well-formed bytecode never pops an empty stack; the static stack
    /// effect of every opcode guarantees it.
    pub(crate) fn pop(&mut self) -> Value {
        self.sp -= 1;
        std::mem::replace(&mut self.stack[self.sp], Value::Undefined)
    }

    pub(crate) fn current_function(&self) -> Arc<CompiledFunction> {
        Arc::clone(&self.frames[self.frames_index - 1].func)
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        if self.frames_index < self.frames.len() {
            self.frames[self.frames_index] = frame;
        } else {
            self.frames.push(frame);
        }
        self.frames_index += 1;
    }

    /// Pops `count` selector values plus the value beneath them.
    pub(crate) fn pop_selectors(&mut self, count: usize) -> (Value, Vec<Value>) {
        let mut selectors = Vec::with_capacity(count);
        for i in self.sp - count..self.sp {
            selectors.push(std::mem::replace(&mut self.stack[i], Value::Undefined));
        }
        self.sp -= count;
        let value = self.pop();
        (value, selectors)
    }

    /// Re-entrant call from host code into the runtime.
    ///
    /// Synthesizes a one-shot `OpCall n; OpSuspend` function, pushes a
    /// frame for it with the callee and arguments above it, and resumes
    /// the dispatch loop until the suspend hands back control. The lock is
    /// held throughout (minus any suspension points the called code hits).
    pub(crate) fn call_compiled(
        &mut self,
        gil: &mut Gil<'_>,
        callee: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        if self.sp + args.len() + 1 >= STACK_SIZE || self.frames_index >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow);
        }
        if args.len() > u8::MAX as usize {
            return Err(RuntimeError::WrongNumArguments(format!(
                "want<=255, got={}",
                args.len()
            )));
        }

        let micro = Arc::new(CompiledFunction::micro_call(args.len()));
        self.frames[self.frames_index - 1].ip = self.ip;
        let base_pointer = self.sp;
        self.push_frame(Frame::new(micro, base_pointer));
        self.ip = -1;

        self.push(callee.clone())?;
        for arg in args {
            self.push(arg.clone())?;
        }

        // an error leaves the frames in place for the traceback
        self.run(gil)?;

        let ret = if self.sp > base_pointer {
            self.stack[self.sp - 1].clone()
        } else {
            Value::Undefined
        };

        self.frames_index -= 1;
        self.ip = self.frames[self.frames_index - 1].ip;
        for i in base_pointer..self.sp {
            self.stack[i] = Value::Undefined;
        }
        self.sp = base_pointer;

        Ok(ret)
    }

    /// Resolves the active frames against their debug info, innermost
    /// first.
    pub(crate) fn traceback(&self, error: RuntimeError) -> Traceback {
        let mut entries = Vec::with_capacity(self.frames_index);
        for idx in (0..self.frames_index).rev() {
            let frame = &self.frames[idx];
            let frame_ip = if idx + 1 == self.frames_index {
                self.ip
            } else {
                frame.ip
            };
            entries.push(trace_entry(&frame.func, frame_ip));
        }
        Traceback {
            error,
            frames: entries,
        }
    }
}

fn trace_entry(func: &CompiledFunction, ip: i64) -> TraceEntry {
    let debug_info = func.debug_info.as_deref();
    let name = debug_info
        .and_then(|info| info.name.clone())
        .unwrap_or_else(|| "<anonymous>".to_string());
    let location = debug_info.and_then(|info| {
        info.position_at(ip.max(0) as usize)
            .map(|pos| format!("{}:{}:{}", info.file, pos.line, pos.column))
    });
    TraceEntry { name, location }
}

/// The `Interop` implementation handed to builtin and native functions:
/// the executing thread plus the lock it holds.
pub(crate) struct Runtime<'a, 'vm> {
    pub(crate) thread: &'a mut Thread,
    pub(crate) gil: &'a mut Gil<'vm>,
}

impl Interop for Runtime<'_, '_> {
    fn call_value(&mut self, callee: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(_) => self.thread.call_compiled(self.gil, callee, args),
            Value::Builtin(builtin) => (builtin.func)(self, args),
            Value::Native(native) => {
                let native = Arc::clone(native);
                native.invoke(self, args)
            }
            Value::Class(class) => {
                let class = Arc::clone(class);
                class.instantiate(self, args)
            }
            Value::Host(host) => {
                let host = Arc::clone(host);
                host.call(self, args)
            }
            other => Err(RuntimeError::NotCallable(other.type_name().into_owned())),
        }
    }
}
