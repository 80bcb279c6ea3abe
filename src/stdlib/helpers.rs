//! Shared argument-checking and result-pushing helpers for the library
//! modules, grounded on the `ExecutionContext::get_arg`/`check_arg_count`
//! pattern other Lua-in-Rust runtimes build their stdlib on — adapted here to
//! this crate's convention: a `CFunction` finds its `nargs` arguments at the
//! top of the current thread's stack and leaves its results in their place.

use crate::gc::TableId;
use crate::value::LuaValue;
use crate::vm::{CFunction, LuaResult, LuaVM};

pub fn arg_base(vm: &LuaVM, nargs: usize) -> usize {
    let t = vm.current_thread;
    vm.heap.thread(t).top - nargs
}

pub fn arg(vm: &LuaVM, nargs: usize, i: usize) -> LuaValue {
    if i >= nargs {
        return LuaValue::Nil;
    }
    let base = arg_base(vm, nargs);
    vm.heap.thread(vm.current_thread).stack[base + i]
}

fn bad_arg(vm: &mut LuaVM, i: usize, fname: &str, expected: &str, got: LuaValue) -> crate::vm::LuaError {
    vm.runtime_error(format!(
        "bad argument #{} to '{}' ({} expected, got {})",
        i + 1,
        fname,
        expected,
        got.type_name()
    ))
}

pub fn check_number(vm: &mut LuaVM, nargs: usize, i: usize, fname: &str) -> LuaResult<f64> {
    let v = arg(vm, nargs, i);
    v.to_number(&vm.heap).ok_or_else(|| bad_arg(vm, i, fname, "number", v))
}

pub fn opt_number(vm: &mut LuaVM, nargs: usize, i: usize, fname: &str, default: f64) -> LuaResult<f64> {
    let v = arg(vm, nargs, i);
    if v.is_nil() {
        Ok(default)
    } else {
        v.to_number(&vm.heap).ok_or_else(|| bad_arg(vm, i, fname, "number", v))
    }
}

pub fn check_int(vm: &mut LuaVM, nargs: usize, i: usize, fname: &str) -> LuaResult<i64> {
    Ok(check_number(vm, nargs, i, fname)? as i64)
}

pub fn opt_int(vm: &mut LuaVM, nargs: usize, i: usize, fname: &str, default: i64) -> LuaResult<i64> {
    Ok(opt_number(vm, nargs, i, fname, default as f64)? as i64)
}

pub fn check_string(vm: &mut LuaVM, nargs: usize, i: usize, fname: &str) -> LuaResult<Vec<u8>> {
    let v = arg(vm, nargs, i);
    match v {
        LuaValue::String(id) => Ok(vm.heap.string_bytes(id).to_vec()),
        LuaValue::Number(n) => Ok(crate::value::format_number(n).into_bytes()),
        _ => Err(bad_arg(vm, i, fname, "string", v)),
    }
}

pub fn opt_string(vm: &mut LuaVM, nargs: usize, i: usize, fname: &str, default: &[u8]) -> LuaResult<Vec<u8>> {
    if arg(vm, nargs, i).is_nil() {
        Ok(default.to_vec())
    } else {
        check_string(vm, nargs, i, fname)
    }
}

pub fn check_table(vm: &mut LuaVM, nargs: usize, i: usize, fname: &str) -> LuaResult<TableId> {
    match arg(vm, nargs, i) {
        LuaValue::Table(id) => Ok(id),
        v => Err(bad_arg(vm, i, fname, "table", v)),
    }
}

pub fn check_function(vm: &mut LuaVM, nargs: usize, i: usize, fname: &str) -> LuaResult<LuaValue> {
    match arg(vm, nargs, i) {
        v @ LuaValue::Function(_) => Ok(v),
        v => Err(bad_arg(vm, i, fname, "function", v)),
    }
}

/// Write `results` back over the call's argument window and report how many
/// there are, the shape every stdlib `CFunction` returns.
pub fn push_result(vm: &mut LuaVM, nargs: usize, results: &[LuaValue]) -> usize {
    let base = arg_base(vm, nargs);
    let t = vm.current_thread;
    let thread = vm.heap.thread_mut(t);
    if thread.stack.len() < base + results.len() {
        thread.stack.resize(base + results.len(), LuaValue::Nil);
    }
    for (i, v) in results.iter().enumerate() {
        thread.stack[base + i] = *v;
    }
    results.len()
}

pub fn register(vm: &mut LuaVM, table: TableId, name: &str, f: CFunction) {
    let func = vm.new_host_function(name, f);
    let key = vm.new_string(name);
    vm.raw_set(table, key, func);
}

pub fn new_lib_table(vm: &mut LuaVM, global_name: &str) -> TableId {
    let t = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    vm.set_global(global_name, LuaValue::Table(t));
    t
}
