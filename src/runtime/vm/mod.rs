use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, MutexGuard};

use crate::{
    bytecode::bytecode::Bytecode,
    runtime::{
        compiled_function::CompiledFunction,
        error::{RuntimeError, Traceback},
        frame::Frame,
        value::Value,
    },
};

mod calls;
mod dispatch;
mod thread;

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 1024;
pub const MAX_FRAMES: usize = 1024;
pub const MAX_THREADS: usize = 8;
pub const MAIN_THREAD_ID: u64 = 1;

/// The virtual machine: executes a compiled program on the calling thread
/// and schedules spawned script threads cooperatively under the global
/// interpreter lock.
pub struct VM {
    shared: Arc<Shared>,
    max_allocs: i64,
    main_sp: usize,
    main_result: Option<Value>,
}

/// State shared by every script thread. The constant pool is immutable and
/// read without the lock; everything else lives behind `state`.
pub(crate) struct Shared {
    pub(crate) constants: Vec<Value>,
    pub(crate) main_fn: Arc<CompiledFunction>,
    pub(crate) state: Mutex<State>,
    pub(crate) aborting: AtomicBool,
}

/// Everything the GIL protects.
pub(crate) struct State {
    pub(crate) globals: Vec<Value>,
    /// Ids of live threads (including main while it runs).
    pub(crate) threads: HashSet<u64>,
    /// Results of finished threads, consumed exactly once by `OpWait`.
    pub(crate) thread_results: HashMap<u64, Value>,
    /// Monotonic id source; main is always 1.
    pub(crate) thread_count: u64,
    /// Reusable thread contexts. `OpSpawn` fails when this is empty.
    pub(crate) pool: Vec<ThreadSlot>,
    /// Allocation budget: decremented on every allocating opcode, trips at
    /// zero. Seeded with `max_allocs + 1`, so -1 disables the budget.
    pub(crate) allocs: i64,
    /// VM-wide error (the allocation budget is shared across threads, so
    /// its exhaustion must surface from `run` no matter which thread hit it).
    pub(crate) vm_err: Option<RuntimeError>,
}

/// Recyclable per-thread allocations.
pub(crate) struct ThreadSlot {
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
}

impl ThreadSlot {
    fn new() -> Self {
        Self {
            stack: vec![Value::Undefined; STACK_SIZE],
            frames: Vec::with_capacity(16),
        }
    }
}

/// The global interpreter lock, held by the executing thread.
///
/// Owning a `Gil` is the capability for touching `State`; `suspend` is the
/// only way to release the lock while a thread stays alive, so bytecode
/// between suspension points is atomic with respect to other script
/// threads.
pub(crate) struct Gil<'vm> {
    vm: &'vm Shared,
    state: Option<MutexGuard<'vm, State>>,
}

impl<'vm> Gil<'vm> {
    pub(crate) fn acquire(vm: &'vm Shared) -> Self {
        Self {
            vm,
            state: Some(vm.state.lock()),
        }
    }

    pub(crate) fn state(&mut self) -> &mut State {
        match &mut self.state {
            Some(state) => state,
            // the guard is absent only inside suspend(), which never
            // overlaps a state access
            None => unreachable!("global lock accessed while released"),
        }
    }

    /// Releases the lock, sleeps, re-acquires. Spawned threads racing for
    /// the lock get their chance to run here.
    pub(crate) fn suspend(&mut self, duration: Duration) {
        self.state = None;
        std::thread::sleep(duration);
        self.state = Some(self.vm.state.lock());
    }

    /// Burns one unit of the allocation budget.
    pub(crate) fn charge_alloc(&mut self) -> Result<(), RuntimeError> {
        let state = self.state();
        state.allocs -= 1;
        if state.allocs == 0 {
            state.vm_err = Some(RuntimeError::ObjectAllocLimit);
            return Err(RuntimeError::ObjectAllocLimit);
        }
        Ok(())
    }
}

/// Cooperative cancellation handle; safe to use from any host thread while
/// the VM runs.
#[derive(Clone)]
pub struct AbortHandle {
    shared: Arc<Shared>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.shared.aborting.store(true, Ordering::Relaxed);
    }
}

/// A script thread context: its own operand stack and frame stack. Globals,
/// constants, and the thread tables are shared through `Shared`.
pub(crate) struct Thread {
    vm: Arc<Shared>,
    id: u64,
    is_main: bool,
    stack: Vec<Value>,
    sp: usize,
    frames: Vec<Frame>,
    frames_index: usize,
    ip: i64,
}

impl VM {
    /// Builds a VM over a compiled program. `globals` seeds the global
    /// table (resized up to `GLOBALS_SIZE`); `max_allocs` caps the number
    /// of allocating opcodes, -1 for no limit.
    pub fn new(bytecode: Bytecode, globals: Option<Vec<Value>>, max_allocs: i64) -> Self {
        let mut globals = globals.unwrap_or_default();
        if globals.len() < GLOBALS_SIZE {
            globals.resize(GLOBALS_SIZE, Value::Undefined);
        }

        let shared = Shared {
            constants: bytecode.constants,
            main_fn: bytecode.main_function,
            state: Mutex::new(State {
                globals,
                threads: HashSet::new(),
                thread_results: HashMap::new(),
                thread_count: 0,
                pool: Vec::new(),
                allocs: 0,
                vm_err: None,
            }),
            aborting: AtomicBool::new(false),
        };

        Self {
            shared: Arc::new(shared),
            max_allocs,
            main_sp: 0,
            main_result: None,
        }
    }

    /// Executes the main function to completion. Spawned threads keep the
    /// shared state alive if they outlive the main thread.
    pub fn run(&mut self) -> Result<(), Traceback> {
        self.shared.aborting.store(false, Ordering::Relaxed);

        let mut thread = {
            let mut state = self.shared.state.lock();
            state.allocs = self.max_allocs + 1;
            state.vm_err = None;
            state.thread_count = 0;
            state.threads.clear();
            state.thread_results.clear();
            state.pool.clear();
            for _ in 0..MAX_THREADS {
                state.pool.push(ThreadSlot::new());
            }

            let slot = state.pool.pop().unwrap_or_else(ThreadSlot::new);
            state.thread_count += 1;
            state.threads.insert(MAIN_THREAD_ID);
            Thread::main(Arc::clone(&self.shared), slot)
        };

        tracing::debug!(max_allocs = self.max_allocs, "virtual machine starting");

        let (run_result, vm_err) = {
            let mut gil = Gil::acquire(&self.shared);
            let run_result = thread.run(&mut gil);
            let state = gil.state();
            state.threads.remove(&MAIN_THREAD_ID);
            (run_result, state.vm_err.take())
        };

        self.main_sp = thread.sp();
        self.main_result = thread.stack_top();

        let error = vm_err.or(run_result.err());
        match error {
            None => {
                tracing::debug!("virtual machine finished");
                Ok(())
            }
            Some(error) => {
                tracing::debug!(%error, "runtime error");
                Err(thread.traceback(error))
            }
        }
    }

    /// Signals cooperative termination; checked at the top of the dispatch
    /// loop of every thread.
    pub fn abort(&self) {
        self.shared.aborting.store(true, Ordering::Relaxed);
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// True when the main thread left nothing on its operand stack; holds
    /// for every well-formed program after `run`.
    pub fn is_stack_empty(&self) -> bool {
        self.main_sp == 0
    }

    pub fn global(&self, index: usize) -> Option<Value> {
        self.shared.state.lock().globals.get(index).cloned()
    }

    /// Top of the main thread's stack when it suspended, for embedder
    /// introspection.
    pub fn result(&self) -> Option<Value> {
        self.main_result.clone()
    }
}

#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::bytecode::{
        bytecode::Bytecode,
        debug_info::FunctionDebugInfo,
        op_code::{make, Instructions, OpCode},
    };
    use crate::runtime::{
        compiled_function::CompiledFunction, error::Traceback, value::Value,
    };

    use super::VM;

    /// Tiny assembler for hand-built instruction streams.
    pub(crate) struct Asm {
        pub(crate) code: Instructions,
    }

    impl Asm {
        pub(crate) fn new() -> Self {
            Self { code: Vec::new() }
        }

        pub(crate) fn pos(&self) -> usize {
            self.code.len()
        }

        /// Emits an instruction, returning its offset for jump patching.
        pub(crate) fn op(&mut self, op: OpCode, operands: &[usize]) -> usize {
            let at = self.code.len();
            self.code.extend(make(op, operands));
            at
        }

        pub(crate) fn patch_u16(&mut self, at: usize, value: usize) {
            self.code[at + 1] = (value >> 8) as u8;
            self.code[at + 2] = value as u8;
        }
    }

    /// Builds a program around a main function; `build` appends the
    /// trailing `OpSuspend` the compiler would emit.
    pub(crate) struct Program {
        pub(crate) main: Asm,
        pub(crate) constants: Vec<Value>,
        pub(crate) num_locals: usize,
    }

    impl Program {
        pub(crate) fn new() -> Self {
            Self {
                main: Asm::new(),
                constants: Vec::new(),
                num_locals: 0,
            }
        }

        pub(crate) fn constant(&mut self, value: Value) -> usize {
            self.constants.push(value);
            self.constants.len() - 1
        }

        pub(crate) fn function(
            &mut self,
            params: usize,
            locals: usize,
            var_args: bool,
            code: Instructions,
        ) -> usize {
            self.constant(Value::Function(Arc::new(CompiledFunction::new(
                code, locals, params, var_args, None,
            ))))
        }

        pub(crate) fn function_with_debug(
            &mut self,
            params: usize,
            locals: usize,
            var_args: bool,
            code: Instructions,
            debug_info: FunctionDebugInfo,
        ) -> usize {
            self.constant(Value::Function(Arc::new(CompiledFunction::new(
                code,
                locals,
                params,
                var_args,
                Some(debug_info),
            ))))
        }

        pub(crate) fn op(&mut self, op: OpCode, operands: &[usize]) -> usize {
            self.main.op(op, operands)
        }

        pub(crate) fn build(mut self) -> Bytecode {
            self.main.op(OpCode::OpSuspend, &[]);
            Bytecode {
                main_function: Arc::new(CompiledFunction::new(
                    self.main.code,
                    self.num_locals,
                    0,
                    false,
                    None,
                )),
                constants: self.constants,
            }
        }

        pub(crate) fn run(self) -> VM {
            let mut vm = VM::new(self.build(), None, -1);
            vm.run().unwrap();
            vm
        }

        pub(crate) fn run_err(self) -> Traceback {
            let mut vm = VM::new(self.build(), None, -1);
            vm.run().unwrap_err()
        }
    }
}

#[cfg(test)]
mod dispatch_test;
