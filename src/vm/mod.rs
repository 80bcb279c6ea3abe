//! Global VM state, grounded on the teacher's `lua_vm/mod.rs`: owns the heap,
//! the collector, the registry/globals tables, and the thread set, and
//! exposes the host-facing API (`compile`, `call_main`, `do_string`,
//! `set_global`/`get_global`, coroutine creation). The actual decode-execute
//! loop lives in `dispatch`; this module is the "LuaVM" surface the rest of
//! the crate (and embedders) call into.

mod coroutine;
mod dispatch;
pub mod error;
mod opcode;
mod upvalue;

pub use error::{LuaError, LuaResult};
pub use opcode::{Instruction, OpCode, OpMode};

use crate::compiler;
use crate::gc::{Gc, GcPhase, Heap, Roots, TableId, ThreadId};
use crate::object::{Closure, LuaTable, Prototype, Thread, ThreadStatus};
use crate::value::LuaValue;
use std::rc::Rc;

/// Signature for host (Rust) functions callable from Lua: receives the VM and
/// the count of arguments pushed onto the current thread's stack starting at
/// its call frame's base, returns the count of results left on the stack.
pub type CFunction = fn(&mut LuaVM, nargs: usize) -> LuaResult<usize>;

pub struct LuaVM {
    pub heap: Heap,
    pub gc: Gc,
    pub registry: TableId,
    pub globals: TableId,
    pub main_thread: ThreadId,
    pub current_thread: ThreadId,
    pub string_metatable: Option<TableId>,
    /// Maximum Lua call depth before raising `StackOverflow`, mirroring
    /// `LUAI_MAXCCALLS`.
    pub max_call_depth: usize,
    /// Open file handles for the `io` library, addressed by index from a
    /// userdata's byte payload — `CFunction`s are plain `fn` pointers with no
    /// captured state of their own, so a file's Rust-side handle has to live
    /// somewhere the VM owns rather than inside the closure.
    pub io_files: Vec<Option<std::fs::File>>,
}

const DEFAULT_MAX_CALL_DEPTH: usize = 200;

impl LuaVM {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let gc = Gc::new();
        let white = gc.current_white;

        let registry = heap.create_table(LuaTable::with_capacity(0, 4), white);
        let globals = heap.create_table(LuaTable::with_capacity(0, 32), white);
        let main_thread = heap.create_thread(Thread::new(true), white);

        heap.table_mut(registry).raw_set(LuaValue::integer(1), LuaValue::Table(globals));

        let mut vm = LuaVM {
            heap,
            gc,
            registry,
            globals,
            main_thread,
            current_thread: main_thread,
            string_metatable: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            io_files: Vec::new(),
        };
        vm.set_global("_G", LuaValue::Table(globals));
        vm
    }

    fn roots(&self) -> Roots {
        Roots {
            registry: self.registry,
            globals: self.globals,
            main_thread: self.main_thread,
            current_thread: self.current_thread,
            current_error: self.heap.thread(self.current_thread).error_value,
        }
    }

    /// Run one bounded collector step if a cycle is in progress, or start one
    /// if the allocation threshold has been crossed. Called at VM safepoints
    /// (allocation sites, call-dispatch back-edges, `yield`).
    pub fn gc_safepoint(&mut self) {
        self.gc.maybe_start_cycle(&self.heap);
        if self.gc.phase != GcPhase::Pause {
            let roots = self.roots();
            let pending = self.gc.step(&mut self.heap, &roots);
            self.run_finalizers(pending);
        }
    }

    pub fn collect_garbage(&mut self) {
        let roots = self.roots();
        let pending = self.gc.collect_full(&mut self.heap, &roots);
        self.run_finalizers(pending);
    }

    /// Invoke `__gc` on each userdata the sweep queued, then free its slot.
    /// The collector can't call into Lua itself, so this runs at the `LuaVM`
    /// layer once a cycle's finalize phase hands back the pending list.
    fn run_finalizers(&mut self, pending: Vec<crate::gc::UserdataId>) {
        for id in pending {
            let value = LuaValue::Userdata(id);
            if let Some(gc_fn) = self.get_metamethod(value, "__gc") {
                let _ = self.call(gc_fn, &[value]);
            }
            self.heap.userdata.free(id.0);
        }
    }

    // ---------------- allocation helpers ----------------

    pub fn new_string(&mut self, s: &str) -> LuaValue {
        let white = self.gc.current_white;
        LuaValue::String(self.heap.intern(s.as_bytes(), white))
    }

    pub fn new_table(&mut self) -> LuaValue {
        let white = self.gc.current_white;
        LuaValue::Table(self.heap.create_table(LuaTable::new(), white))
    }

    pub fn new_host_function(&mut self, name: &str, func: CFunction) -> LuaValue {
        let white = self.gc.current_white;
        let id = self.heap.create_closure(
            Closure::Host {
                func,
                name: name.into(),
                upvalues: Vec::new(),
            },
            white,
        );
        LuaValue::Function(id)
    }

    pub fn runtime_error(&mut self, message: impl Into<String>) -> LuaError {
        let white = self.gc.current_white;
        LuaError::runtime(message, &mut self.heap, white)
    }

    pub fn describe_error(&mut self, err: &LuaError) -> String {
        match err {
            LuaError::RuntimeError { value, .. } => value.to_display_string(&self.heap),
            other => other.to_string(),
        }
    }

    // ---------------- globals & registry ----------------

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        let key = self.new_string(name);
        self.raw_set(self.globals, key, value);
    }

    pub fn get_global(&mut self, name: &str) -> LuaValue {
        let key = self.new_string(name);
        self.heap.table(self.globals).raw_get(&key)
    }

    pub fn raw_set(&mut self, table: TableId, key: LuaValue, value: LuaValue) {
        self.heap.table_mut(table).raw_set(key, value);
        self.gc.barrier_back_table(&mut self.heap, table);
    }

    // ---------------- compiling & running ----------------

    pub fn compile(&mut self, source: &str) -> LuaResult<Prototype> {
        self.compile_named(source, "=(load)")
    }

    pub fn compile_named(&mut self, source: &str, chunk_name: &str) -> LuaResult<Prototype> {
        let white = self.gc.current_white;
        compiler::compile(source, chunk_name, &mut self.heap, white)
    }

    /// Wrap `proto` as a closure (Lua 5.1 main chunks take no upvalues —
    /// globals are reached through `GETGLOBAL`/`SETGLOBAL`, not an `_ENV`
    /// upvalue, unlike 5.2+) and call it with no arguments.
    pub fn call_main(&mut self, proto: Rc<Prototype>) -> LuaResult<Vec<LuaValue>> {
        let white = self.gc.current_white;
        let closure = self
            .heap
            .create_closure(Closure::Lua { proto, upvalues: Vec::new() }, white);
        self.call(LuaValue::Function(closure), &[])
    }

    pub fn do_string(&mut self, source: &str) -> LuaResult<Vec<LuaValue>> {
        let proto = self.compile(source)?;
        self.call_main(Rc::new(proto))
    }

    pub fn open_libs(&mut self) {
        crate::stdlib::open_all(self);
    }

    // ---------------- calling ----------------

    /// Call a Lua or host value with `args` on the current thread, running
    /// the dispatch loop to completion and returning all results.
    pub fn call(&mut self, func: LuaValue, args: &[LuaValue]) -> LuaResult<Vec<LuaValue>> {
        dispatch::call_value(self, func, args)
    }

    /// Event lookup through a value's metatable (`__index`, `__add`, ...),
    /// exposed for the stdlib since `dispatch` itself is private to this module.
    pub fn get_metamethod(&mut self, value: LuaValue, event: &str) -> Option<LuaValue> {
        dispatch::get_metamethod(self, value, event)
    }

    pub fn index_get(&mut self, table: LuaValue, key: LuaValue) -> LuaResult<LuaValue> {
        dispatch::index_get(self, table, key)
    }

    pub fn index_set(&mut self, table: LuaValue, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        dispatch::index_set(self, table, key, value)
    }

    pub fn new_thread(&mut self) -> ThreadId {
        let white = self.gc.current_white;
        self.heap.create_thread(Thread::new(false), white)
    }

    pub fn thread_status(&self, thread: ThreadId) -> ThreadStatus {
        self.heap.thread(thread).status
    }

    /// `coroutine.resume(thread, ...)`.
    pub fn resume(&mut self, thread: ThreadId, args: &[LuaValue]) -> LuaResult<Vec<LuaValue>> {
        coroutine::resume(self, thread, args)
    }

    /// `coroutine.yield(...)`, called from within a host function running on
    /// the coroutine being suspended.
    pub fn coroutine_yield(&mut self, values: Vec<LuaValue>) -> LuaResult<usize> {
        coroutine::do_yield(self, values)
    }
}

impl Default for LuaVM {
    fn default() -> Self {
        Self::new()
    }
}
