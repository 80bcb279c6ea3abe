//! `debug` library: `traceback`/`getinfo` read straight from `Prototype`'s
//! debug info; `sethook`/`gethook` are stubs — this VM has no instruction-count
//! hook mechanism wired into `dispatch`, so they just record/return the
//! registered hook without ever firing it.

use crate::object::Closure;
use crate::stdlib::helpers::*;
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};

pub fn open(vm: &mut LuaVM) {
    let lib = new_lib_table(vm, "debug");
    register(vm, lib, "traceback", l_traceback);
    register(vm, lib, "getinfo", l_getinfo);
    register(vm, lib, "sethook", l_sethook);
    register(vm, lib, "gethook", l_gethook);
}

fn l_traceback(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let msg = opt_string(vm, nargs, 0, "traceback", b"")?;
    let mut out = String::from_utf8_lossy(&msg).to_string();
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str("stack traceback:");
    let t = vm.current_thread;
    let depth = vm.heap.thread(t).call_infos.len();
    for i in (0..depth).rev() {
        let ci = vm.heap.thread(t).call_infos[i];
        if let LuaValue::Function(fid) = ci.func {
            if let Closure::Lua { proto, .. } = vm.heap.closure(fid) {
                let line = proto.debug.lines.get(ci.saved_pc).copied().unwrap_or(0);
                out.push_str(&format!("\n\t{}:{}: in function", proto.debug.source, line));
            } else if let Closure::Host { name, .. } = vm.heap.closure(fid) {
                out.push_str(&format!("\n\t[C]: in function '{}'", name));
            }
        }
    }
    let v = vm.heap.intern(out.as_bytes(), vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn l_getinfo(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let f = check_function(vm, nargs, 0, "getinfo")?;
    let t = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    if let LuaValue::Function(fid) = f {
        match vm.heap.closure(fid) {
            Closure::Lua { proto, .. } => {
                let source = proto.debug.source.to_string();
                let line = proto.debug.lines.first().copied().unwrap_or(0);
                let nparams = proto.num_params;
                let is_vararg = proto.is_vararg;
                let k = vm.new_string("source");
                let v = vm.new_string(&source);
                vm.raw_set(t, k, v);
                let k = vm.new_string("linedefined");
                vm.raw_set(t, k, LuaValue::integer(line as i64));
                let k = vm.new_string("what");
                let v = vm.new_string("Lua");
                vm.raw_set(t, k, v);
                let k = vm.new_string("nparams");
                vm.raw_set(t, k, LuaValue::integer(nparams as i64));
                let k = vm.new_string("isvararg");
                vm.raw_set(t, k, LuaValue::Boolean(is_vararg));
            }
            Closure::Host { name, .. } => {
                let k = vm.new_string("source");
                let v = vm.new_string("=[C]");
                vm.raw_set(t, k, v);
                let k = vm.new_string("what");
                let v = vm.new_string("C");
                vm.raw_set(t, k, v);
                let k = vm.new_string("name");
                let v = vm.new_string(name);
                vm.raw_set(t, k, v);
            }
        }
    }
    Ok(push_result(vm, nargs, &[LuaValue::Table(t)]))
}

fn l_sethook(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    Ok(push_result(vm, nargs, &[]))
}

fn l_gethook(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    Ok(push_result(vm, nargs, &[LuaValue::Nil]))
}
