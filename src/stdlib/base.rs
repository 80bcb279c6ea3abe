//! The base library: installed straight into `_G`, not a sub-table, matching
//! Lua 5.1's own `luaopen_base`.

use crate::stdlib::helpers::*;
use crate::value::LuaValue;
use crate::vm::{LuaError, LuaResult, LuaVM};

pub fn open(vm: &mut LuaVM) {
    let g = vm.globals;
    register(vm, g, "print", l_print);
    register(vm, g, "type", l_type);
    register(vm, g, "tostring", l_tostring);
    register(vm, g, "tonumber", l_tonumber);
    register(vm, g, "pairs", l_pairs);
    register(vm, g, "ipairs", l_ipairs);
    register(vm, g, "next", l_next);
    register(vm, g, "select", l_select);
    register(vm, g, "rawget", l_rawget);
    register(vm, g, "rawset", l_rawset);
    register(vm, g, "rawequal", l_rawequal);
    register(vm, g, "rawlen", l_rawlen);
    register(vm, g, "setmetatable", l_setmetatable);
    register(vm, g, "getmetatable", l_getmetatable);
    register(vm, g, "pcall", l_pcall);
    register(vm, g, "xpcall", l_xpcall);
    register(vm, g, "error", l_error);
    register(vm, g, "assert", l_assert);
    register(vm, g, "unpack", l_unpack);
}

fn l_print(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let mut out = String::new();
    for i in 0..nargs {
        if i > 0 {
            out.push('\t');
        }
        out.push_str(&display(vm, arg(vm, nargs, i))?);
    }
    println!("{out}");
    Ok(push_result(vm, nargs, &[]))
}

/// `tostring`'s semantics: honors `__tostring`, otherwise falls back to raw
/// display formatting.
fn display(vm: &mut LuaVM, v: LuaValue) -> LuaResult<String> {
    if let Some(mm) = vm.get_metamethod(v, "__tostring") {
        let r = vm.call(mm, &[v])?;
        let s = r.into_iter().next().unwrap_or(LuaValue::Nil);
        return Ok(s.to_display_string(&vm.heap));
    }
    Ok(v.to_display_string(&vm.heap))
}

fn l_tostring(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let v = arg(vm, nargs, 0);
    let s = display(vm, v)?;
    let result = vm.new_string(&s);
    Ok(push_result(vm, nargs, &[result]))
}

fn l_tonumber(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let v = arg(vm, nargs, 0);
    if nargs >= 2 && !arg(vm, nargs, 1).is_nil() {
        let base = check_int(vm, nargs, 1, "tonumber")?;
        let bytes = check_string(vm, nargs, 0, "tonumber")?;
        let s = String::from_utf8_lossy(&bytes);
        let n = i64::from_str_radix(s.trim(), base as u32).ok().map(|v| v as f64);
        return Ok(push_result(vm, nargs, &[n.map(LuaValue::Number).unwrap_or(LuaValue::Nil)]));
    }
    let n = v.to_number(&vm.heap);
    Ok(push_result(vm, nargs, &[n.map(LuaValue::Number).unwrap_or(LuaValue::Nil)]))
}

fn l_type(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let v = arg(vm, nargs, 0);
    let s = vm.new_string(v.type_name());
    Ok(push_result(vm, nargs, &[s]))
}

fn l_next(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "next")?;
    let key = arg(vm, nargs, 1);
    match vm.heap.table(t).next(&key) {
        Some((k, v)) => Ok(push_result(vm, nargs, &[k, v])),
        None => Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    }
}

fn l_pairs(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = arg(vm, nargs, 0);
    check_table(vm, nargs, 0, "pairs")?;
    let next_fn = vm.new_host_function("next", l_next);
    Ok(push_result(vm, nargs, &[next_fn, t, LuaValue::Nil]))
}

fn ipairs_iter(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "ipairs")?;
    let i = check_int(vm, nargs, 1, "ipairs")? + 1;
    let v = vm.heap.table(t).raw_get(&LuaValue::integer(i));
    if v.is_nil() {
        Ok(push_result(vm, nargs, &[LuaValue::Nil]))
    } else {
        Ok(push_result(vm, nargs, &[LuaValue::integer(i), v]))
    }
}

fn l_ipairs(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = arg(vm, nargs, 0);
    check_table(vm, nargs, 0, "ipairs")?;
    let iter_fn = vm.new_host_function("ipairs_iterator", ipairs_iter);
    Ok(push_result(vm, nargs, &[iter_fn, t, LuaValue::integer(0)]))
}

fn l_select(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let sel = arg(vm, nargs, 0);
    if let LuaValue::String(id) = sel {
        if vm.heap.string_bytes(id) == b"#" {
            return Ok(push_result(vm, nargs, &[LuaValue::integer(nargs as i64 - 1)]));
        }
    }
    let n = check_int(vm, nargs, 0, "select")?;
    if n < 0 {
        return Err(vm.runtime_error("bad argument #1 to 'select' (index out of range)"));
    }
    let start = n as usize;
    let rest: Vec<LuaValue> = (start..nargs).map(|i| arg(vm, nargs, i)).collect();
    Ok(push_result(vm, nargs, &rest))
}

fn l_rawget(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "rawget")?;
    let k = arg(vm, nargs, 1);
    let v = vm.heap.table(t).raw_get(&k);
    Ok(push_result(vm, nargs, &[v]))
}

fn l_rawset(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "rawset")?;
    let k = arg(vm, nargs, 1);
    let v = arg(vm, nargs, 2);
    if k.is_nil() {
        return Err(vm.runtime_error("table index is nil"));
    }
    vm.raw_set(t, k, v);
    Ok(push_result(vm, nargs, &[LuaValue::Table(t)]))
}

fn l_rawequal(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let a = arg(vm, nargs, 0);
    let b = arg(vm, nargs, 1);
    Ok(push_result(vm, nargs, &[LuaValue::Boolean(a.raw_equal(&b))]))
}

fn l_rawlen(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    match arg(vm, nargs, 0) {
        LuaValue::Table(id) => Ok(push_result(vm, nargs, &[LuaValue::integer(vm.heap.table(id).length())])),
        LuaValue::String(id) => Ok(push_result(vm, nargs, &[LuaValue::integer(vm.heap.string_len(id) as i64)])),
        v => Err(bad_arg_plain(vm, "rawlen", "table or string", v)),
    }
}

fn bad_arg_plain(vm: &mut LuaVM, fname: &str, expected: &str, got: LuaValue) -> crate::vm::LuaError {
    vm.runtime_error(format!("bad argument #1 to '{}' ({} expected, got {})", fname, expected, got.type_name()))
}

fn l_setmetatable(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "setmetatable")?;
    let mt = arg(vm, nargs, 1);
    match mt {
        LuaValue::Nil => vm.heap.table_mut(t).set_metatable(None),
        LuaValue::Table(id) => vm.heap.table_mut(t).set_metatable(Some(id)),
        v => return Err(bad_arg_plain(vm, "setmetatable", "nil or table", v)),
    }
    Ok(push_result(vm, nargs, &[LuaValue::Table(t)]))
}

fn l_getmetatable(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let v = arg(vm, nargs, 0);
    let mt = match v {
        LuaValue::Table(id) => vm.heap.table(id).metatable(),
        LuaValue::Userdata(id) => vm.heap.userdata(id).metatable,
        LuaValue::String(_) => vm.string_metatable,
        _ => None,
    };
    match mt {
        Some(id) => Ok(push_result(vm, nargs, &[LuaValue::Table(id)])),
        None => Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    }
}

fn l_pcall(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    if nargs == 0 {
        return Err(vm.runtime_error("bad argument #1 to 'pcall' (value expected)"));
    }
    let func = arg(vm, nargs, 0);
    let call_args: Vec<LuaValue> = (1..nargs).map(|i| arg(vm, nargs, i)).collect();
    match vm.call(func, &call_args) {
        Ok(results) => {
            let mut out = vec![LuaValue::Boolean(true)];
            out.extend(results);
            Ok(push_result(vm, nargs, &out))
        }
        Err(e @ LuaError::Yield(_)) => Err(e),
        Err(e) => {
            let white = vm.gc.current_white;
            let val = e.to_value(&mut vm.heap, white);
            Ok(push_result(vm, nargs, &[LuaValue::Boolean(false), val]))
        }
    }
}

fn l_xpcall(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    if nargs < 2 {
        return Err(vm.runtime_error("bad argument #2 to 'xpcall' (value expected)"));
    }
    let func = arg(vm, nargs, 0);
    let handler = arg(vm, nargs, 1);
    let call_args: Vec<LuaValue> = (2..nargs).map(|i| arg(vm, nargs, i)).collect();
    match vm.call(func, &call_args) {
        Ok(results) => {
            let mut out = vec![LuaValue::Boolean(true)];
            out.extend(results);
            Ok(push_result(vm, nargs, &out))
        }
        Err(e @ LuaError::Yield(_)) => Err(e),
        Err(e) => {
            let white = vm.gc.current_white;
            let val = e.to_value(&mut vm.heap, white);
            let handled = vm.call(handler, &[val]).unwrap_or_else(|_| vec![LuaValue::Nil]);
            let mut out = vec![LuaValue::Boolean(false)];
            out.extend(handled);
            Ok(push_result(vm, nargs, &out))
        }
    }
}

fn l_error(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let value = arg(vm, nargs, 0);
    let level = opt_int(vm, nargs, 1, "error", 1)?;
    Err(LuaError::RuntimeError { value, level: level.max(0) as u32 })
}

fn l_assert(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let v = arg(vm, nargs, 0);
    if v.truthy() {
        let out: Vec<LuaValue> = (0..nargs).map(|i| arg(vm, nargs, i)).collect();
        return Ok(push_result(vm, nargs, &out));
    }
    let msg = if nargs >= 2 {
        arg(vm, nargs, 1)
    } else {
        vm.new_string("assertion failed!")
    };
    Err(LuaError::RuntimeError { value: msg, level: 1 })
}

fn l_unpack(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "unpack")?;
    let i = opt_int(vm, nargs, 1, "unpack", 1)?;
    let j = opt_int(vm, nargs, 2, "unpack", vm.heap.table(t).length())?;
    if i > j {
        return Ok(push_result(vm, nargs, &[]));
    }
    let values: Vec<LuaValue> = (i..=j).map(|k| vm.heap.table(t).raw_get(&LuaValue::integer(k))).collect();
    Ok(push_result(vm, nargs, &values))
}
