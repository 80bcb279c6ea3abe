//! `table` library: `insert`/`remove`/`concat`/`sort`/`unpack` over
//! `LuaTable`'s array part.

use crate::stdlib::helpers::*;
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};

pub fn open(vm: &mut LuaVM) {
    let lib = new_lib_table(vm, "table");
    register(vm, lib, "insert", l_insert);
    register(vm, lib, "remove", l_remove);
    register(vm, lib, "concat", l_concat);
    register(vm, lib, "sort", l_sort);
    register(vm, lib, "unpack", l_unpack);
}

fn l_insert(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "insert")?;
    let len = vm.heap.table(t).length();
    if nargs == 2 {
        let v = arg(vm, nargs, 1);
        vm.raw_set(t, LuaValue::integer(len + 1), v);
    } else if nargs >= 3 {
        let pos = check_int(vm, nargs, 1, "insert")?;
        let v = arg(vm, nargs, 2);
        if pos < 1 || pos > len + 1 {
            return Err(vm.runtime_error("bad argument #2 to 'insert' (position out of bounds)"));
        }
        let mut i = len + 1;
        while i > pos {
            let prev = vm.heap.table(t).raw_get(&LuaValue::integer(i - 1));
            vm.raw_set(t, LuaValue::integer(i), prev);
            i -= 1;
        }
        vm.raw_set(t, LuaValue::integer(pos), v);
    } else {
        return Err(vm.runtime_error("wrong number of arguments to 'insert'"));
    }
    Ok(push_result(vm, nargs, &[]))
}

fn l_remove(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "remove")?;
    let len = vm.heap.table(t).length();
    if len == 0 && nargs < 2 {
        return Ok(push_result(vm, nargs, &[LuaValue::Nil]));
    }
    let pos = opt_int(vm, nargs, 1, "remove", len)?;
    if len == 0 {
        return Ok(push_result(vm, nargs, &[LuaValue::Nil]));
    }
    if pos < 1 || pos > len + 1 {
        return Err(vm.runtime_error("bad argument #2 to 'remove' (position out of bounds)"));
    }
    let removed = vm.heap.table(t).raw_get(&LuaValue::integer(pos));
    let mut i = pos;
    while i < len {
        let next = vm.heap.table(t).raw_get(&LuaValue::integer(i + 1));
        vm.raw_set(t, LuaValue::integer(i), next);
        i += 1;
    }
    vm.raw_set(t, LuaValue::integer(len), LuaValue::Nil);
    Ok(push_result(vm, nargs, &[removed]))
}

fn l_concat(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "concat")?;
    let sep = opt_string(vm, nargs, 1, "concat", b"")?;
    let len = vm.heap.table(t).length();
    let i = opt_int(vm, nargs, 2, "concat", 1)?;
    let j = opt_int(vm, nargs, 3, "concat", len)?;
    let mut out = Vec::new();
    let mut k = i;
    while k <= j {
        let v = vm.heap.table(t).raw_get(&LuaValue::integer(k));
        let piece = match v {
            LuaValue::String(id) => vm.heap.string_bytes(id).to_vec(),
            LuaValue::Number(n) => crate::value::format_number(n).into_bytes(),
            _ => {
                return Err(vm.runtime_error(format!("invalid value (at index {}) in table for 'concat'", k)));
            }
        };
        if k > i {
            out.extend(&sep);
        }
        out.extend(piece);
        k += 1;
    }
    let v = vm.heap.intern(&out, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn l_unpack(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "unpack")?;
    let len = vm.heap.table(t).length();
    let i = opt_int(vm, nargs, 1, "unpack", 1)?;
    let j = opt_int(vm, nargs, 2, "unpack", len)?;
    if i > j {
        return Ok(push_result(vm, nargs, &[]));
    }
    let mut values = Vec::with_capacity((j - i + 1).max(0) as usize);
    let mut k = i;
    while k <= j {
        values.push(vm.heap.table(t).raw_get(&LuaValue::integer(k)));
        k += 1;
    }
    Ok(push_result(vm, nargs, &values))
}

/// `table.sort` needs comparisons through a user comparator, which can error
/// or yield — so unlike the other table functions this one routes through
/// `vm.call` rather than touching raw Rust comparisons directly.
fn l_sort(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t = check_table(vm, nargs, 0, "sort")?;
    let cmp = if nargs >= 2 && !arg(vm, nargs, 1).is_nil() {
        Some(check_function(vm, nargs, 1, "sort")?)
    } else {
        None
    };
    let len = vm.heap.table(t).length();
    let mut items: Vec<LuaValue> = (1..=len).map(|i| vm.heap.table(t).raw_get(&LuaValue::integer(i))).collect();

    // Simple insertion sort: the comparator can error (propagated via `?`),
    // which a library sort needs to tolerate mid-sequence.
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 {
            let less = less_than(vm, cmp, items[j], items[j - 1])?;
            if !less {
                break;
            }
            items.swap(j, j - 1);
            j -= 1;
        }
    }
    for (idx, v) in items.into_iter().enumerate() {
        vm.raw_set(t, LuaValue::integer(idx as i64 + 1), v);
    }
    Ok(push_result(vm, nargs, &[]))
}

fn less_than(vm: &mut LuaVM, cmp: Option<LuaValue>, a: LuaValue, b: LuaValue) -> LuaResult<bool> {
    match cmp {
        Some(f) => {
            let results = vm.call(f, &[a, b])?;
            Ok(results.first().map(|v| v.truthy()).unwrap_or(false))
        }
        None => match (a, b) {
            (LuaValue::Number(x), LuaValue::Number(y)) => Ok(x < y),
            (LuaValue::String(x), LuaValue::String(y)) => Ok(vm.heap.string_bytes(x) < vm.heap.string_bytes(y)),
            _ => Err(vm.runtime_error("attempt to compare two incompatible values")),
        },
    }
}
