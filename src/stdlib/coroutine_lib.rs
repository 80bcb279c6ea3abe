//! `coroutine` library: thin wrapper over `vm::coroutine`/`LuaVM::resume`/
//! `LuaVM::coroutine_yield`/`LuaVM::new_thread`.

use crate::object::ThreadStatus;
use crate::stdlib::helpers::*;
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};

pub fn open(vm: &mut LuaVM) {
    let lib = new_lib_table(vm, "coroutine");
    register(vm, lib, "create", l_create);
    register(vm, lib, "resume", l_resume);
    register(vm, lib, "yield", l_yield);
    register(vm, lib, "status", l_status);
    register(vm, lib, "wrap", l_wrap);
    register(vm, lib, "running", l_running);
    register(vm, lib, "isyieldable", l_isyieldable);
}

fn l_create(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let f = check_function(vm, nargs, 0, "create")?;
    let thread = vm.new_thread();
    vm.heap.thread_mut(thread).stack.push(f);
    vm.heap.thread_mut(thread).top = 1;
    Ok(push_result(vm, nargs, &[LuaValue::Thread(thread)]))
}

fn l_resume(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let thread = match arg(vm, nargs, 0) {
        LuaValue::Thread(id) => id,
        v => return Err(vm.runtime_error(format!("bad argument #1 to 'resume' (coroutine expected, got {})", v.type_name()))),
    };
    let extra: Vec<LuaValue> = (1..nargs).map(|i| arg(vm, nargs, i)).collect();
    match vm.resume(thread, &extra) {
        Ok(mut results) => {
            let mut out = vec![LuaValue::Boolean(true)];
            out.append(&mut results);
            Ok(push_result(vm, nargs, &out))
        }
        Err(e) => {
            let white = vm.gc.current_white;
            let v = e.to_value(&mut vm.heap, white);
            Ok(push_result(vm, nargs, &[LuaValue::Boolean(false), v]))
        }
    }
}

fn l_yield(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let values: Vec<LuaValue> = (0..nargs).map(|i| arg(vm, nargs, i)).collect();
    vm.coroutine_yield(values)
}

fn l_status(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let thread = match arg(vm, nargs, 0) {
        LuaValue::Thread(id) => id,
        v => return Err(vm.runtime_error(format!("bad argument #1 to 'status' (coroutine expected, got {})", v.type_name()))),
    };
    let status = vm.thread_status(thread);
    let name = match status {
        ThreadStatus::Suspended => "suspended",
        ThreadStatus::Running => {
            if thread == vm.current_thread {
                "running"
            } else {
                "normal"
            }
        }
        ThreadStatus::Normal => "normal",
        ThreadStatus::Dead => "dead",
    };
    let v = vm.new_string(name);
    Ok(push_result(vm, nargs, &[v]))
}

/// `coroutine.wrap` hands back a callable table (`__call`) rather than a
/// closure capturing the thread id, for the same reason `gmatch`/`lines` do.
fn l_wrap(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let f = check_function(vm, nargs, 0, "wrap")?;
    let thread = vm.new_thread();
    vm.heap.thread_mut(thread).stack.push(f);
    vm.heap.thread_mut(thread).top = 1;

    let state = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let k_thread = vm.new_string("thread");
    vm.raw_set(state, k_thread, LuaValue::Thread(thread));
    let mt = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let call_fn = vm.new_host_function("wrapped_coroutine", wrap_call);
    let k_call = vm.new_string("__call");
    vm.raw_set(mt, k_call, call_fn);
    vm.heap.table_mut(state).set_metatable(Some(mt));
    Ok(push_result(vm, nargs, &[LuaValue::Table(state)]))
}

fn wrap_call(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let state = check_table(vm, nargs, 0, "wrapped_coroutine")?;
    let thread = {
        let k = vm.new_string("thread");
        match vm.heap.table(state).raw_get(&k) {
            LuaValue::Thread(id) => id,
            _ => return Err(vm.runtime_error("invalid coroutine wrapper")),
        }
    };
    let extra: Vec<LuaValue> = (1..nargs).map(|i| arg(vm, nargs, i)).collect();
    let results = vm.resume(thread, &extra)?;
    Ok(push_result(vm, nargs, &results))
}

fn l_running(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = vm.current_thread;
    let is_main = t == vm.main_thread;
    Ok(push_result(vm, nargs, &[LuaValue::Thread(t), LuaValue::Boolean(is_main)]))
}

fn l_isyieldable(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let yieldable = vm.current_thread != vm.main_thread;
    Ok(push_result(vm, nargs, &[LuaValue::Boolean(yieldable)]))
}
