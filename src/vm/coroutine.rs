//! Coroutine resume/yield scheduling, grounded on the teacher's
//! `lua_vm/lua_coroutine.rs` status machine but reworked around this
//! runtime's arena-addressed threads instead of raw thread pointers.
//!
//! Lua coroutines are cooperative: `resume` runs the target thread's
//! dispatch loop until it either returns, errors, or calls `yield`. There is
//! no OS-level suspension here — `yield` unwinds the Rust call stack back to
//! the nearest `resume` by returning `LuaError::Yield`, which `run_loop`
//! propagates without touching the thread's frames (so they're intact for
//! the next `resume`) and which `resume` itself catches and turns back into
//! an ordinary `Ok`.

use crate::gc::ThreadId;
use crate::object::ThreadStatus;
use crate::value::LuaValue;
use crate::vm::dispatch;
use crate::vm::{LuaError, LuaResult, LuaVM};

pub fn resume(vm: &mut LuaVM, thread: ThreadId, args: &[LuaValue]) -> LuaResult<Vec<LuaValue>> {
    match vm.heap.thread(thread).status {
        ThreadStatus::Dead => {
            return Err(LuaError::CoroutineError("cannot resume dead coroutine".into()));
        }
        ThreadStatus::Running | ThreadStatus::Normal => {
            return Err(LuaError::CoroutineError("cannot resume non-suspended coroutine".into()));
        }
        ThreadStatus::Suspended => {}
    }

    let resumer = vm.current_thread;
    vm.heap.thread_mut(resumer).status = ThreadStatus::Normal;
    vm.heap.thread_mut(thread).resumer = Some(resumer);
    vm.heap.thread_mut(thread).status = ThreadStatus::Running;
    vm.current_thread = thread;

    let starting_fresh = vm.heap.thread(thread).call_infos.is_empty() && vm.heap.thread(thread).pending_yield.is_none();
    let result = if starting_fresh {
        start_thread(vm, thread, args)
    } else {
        continue_thread(vm, thread, args)
    };

    vm.current_thread = resumer;
    vm.heap.thread_mut(resumer).status = ThreadStatus::Running;

    match result {
        Ok(values) => {
            let done = vm.heap.thread(thread).call_infos.is_empty();
            vm.heap.thread_mut(thread).status = if done { ThreadStatus::Dead } else { ThreadStatus::Suspended };
            Ok(values)
        }
        Err(e) => {
            vm.heap.thread_mut(thread).status = ThreadStatus::Dead;
            Err(e)
        }
    }
}

/// First `resume` of a coroutine. `thread.stack[0]` must already hold the
/// function to run (placed there by `coroutine.create`).
fn start_thread(vm: &mut LuaVM, thread: ThreadId, args: &[LuaValue]) -> LuaResult<Vec<LuaValue>> {
    let func = vm
        .heap
        .thread(thread)
        .stack
        .first()
        .copied()
        .ok_or_else(|| LuaError::CoroutineError("coroutine has no body".into()))?;
    let arg_base = 1;
    {
        let t = vm.heap.thread_mut(thread);
        if t.stack.len() < arg_base + args.len() {
            t.stack.resize(arg_base + args.len(), LuaValue::Nil);
        }
        for (i, a) in args.iter().enumerate() {
            t.stack[arg_base + i] = *a;
        }
        t.top = arg_base + args.len();
        t.entry_results_at = arg_base;
    }
    dispatch::do_call(vm, thread, func, arg_base, args.len(), arg_base, None)?;
    run_to_yield_or_done(vm, thread)
}

/// Resume a thread that previously yielded: place `args` where the
/// interrupted `coroutine.yield` call's results were expected, then keep
/// running from the saved program counter.
fn continue_thread(vm: &mut LuaVM, thread: ThreadId, args: &[LuaValue]) -> LuaResult<Vec<LuaValue>> {
    let (results_at, expected) = vm
        .heap
        .thread_mut(thread)
        .pending_yield
        .take()
        .expect("suspended non-fresh coroutine must have a pending yield point");
    let tmp = vm.heap.thread(thread).top;
    {
        let t = vm.heap.thread_mut(thread);
        if t.stack.len() < tmp + args.len() {
            t.stack.resize(tmp + args.len(), LuaValue::Nil);
        }
        for (i, a) in args.iter().enumerate() {
            t.stack[tmp + i] = *a;
        }
        t.top = tmp + args.len();
    }
    dispatch::relocate_results(vm, thread, tmp, args.len(), results_at, expected);
    run_to_yield_or_done(vm, thread)
}

fn run_to_yield_or_done(vm: &mut LuaVM, thread: ThreadId) -> LuaResult<Vec<LuaValue>> {
    match dispatch::run_loop(vm, thread, 0) {
        Ok(()) => {
            let results_at = vm.heap.thread(thread).entry_results_at;
            let top = vm.heap.thread(thread).top;
            let results = vm.heap.thread(thread).stack[results_at..top.max(results_at)].to_vec();
            Ok(results)
        }
        Err(LuaError::Yield(values)) => Ok(values),
        Err(e) => Err(e),
    }
}

/// `coroutine.yield(...)`: suspend the current thread by unwinding back to
/// its `resume` call. Errors if called on the main thread, or while a host
/// function is on the call stack (`c_call_depth > 0`) — "attempt to yield
/// across a C-call boundary", matching Lua 5.1 (unlike 5.2+, which permits it).
pub fn do_yield(vm: &mut LuaVM, values: Vec<LuaValue>) -> LuaResult<usize> {
    let thread = vm.current_thread;
    if vm.heap.thread(thread).is_main {
        return Err(LuaError::CoroutineError("attempt to yield from outside a coroutine".into()));
    }
    if vm.heap.thread(thread).c_call_depth > 1 {
        return Err(LuaError::CoroutineError("attempt to yield across a C-call boundary".into()));
    }
    Err(LuaError::Yield(values))
}
