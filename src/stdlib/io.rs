//! `io` library: a minimal host-side surface over `std::fs`/`std::io`.
//! `write`/`read` target stdout/stdin directly; `open` hands back a file
//! value backed by `LuaVM::io_files`, addressed through a userdata's byte
//! payload since a `CFunction` cannot itself own a `std::fs::File`.

use crate::object::Userdata;
use crate::stdlib::helpers::*;
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};
use std::io::{BufRead, Read, Write};

pub fn open(vm: &mut LuaVM) {
    let lib = new_lib_table(vm, "io");
    register(vm, lib, "write", l_write);
    register(vm, lib, "read", l_read);
    register(vm, lib, "open", l_open);
    register(vm, lib, "close", l_close);
    register(vm, lib, "lines", l_lines);
}

fn file_index(vm: &mut LuaVM, file: std::fs::File) -> LuaValue {
    let idx = vm.io_files.len();
    vm.io_files.push(Some(file));
    let ud = vm.heap.create_userdata(Userdata::new(idx.to_le_bytes().to_vec()), vm.gc.current_white);
    LuaValue::Userdata(ud)
}

fn l_write(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for i in 0..nargs {
        let v = arg(vm, nargs, i);
        let bytes = match v {
            LuaValue::String(id) => vm.heap.string_bytes(id).to_vec(),
            LuaValue::Number(n) => crate::value::format_number(n).into_bytes(),
            _ => return Err(vm.runtime_error("invalid argument to 'write'")),
        };
        out.write_all(&bytes).map_err(|e| vm.runtime_error(e.to_string()))?;
    }
    Ok(push_result(vm, nargs, &[]))
}

fn l_read(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let fmt = opt_string(vm, nargs, 0, "read", b"l")?;
    let fmt = String::from_utf8_lossy(&fmt);
    let fmt = fmt.trim_start_matches('*');
    let stdin = std::io::stdin();
    let mut locked = stdin.lock();
    match fmt {
        "l" | "L" => {
            let mut line = String::new();
            let n = locked.read_line(&mut line).map_err(|e| vm.runtime_error(e.to_string()))?;
            if n == 0 {
                return Ok(push_result(vm, nargs, &[LuaValue::Nil]));
            }
            if fmt == "l" && line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            let v = vm.heap.intern(line.as_bytes(), vm.gc.current_white);
            Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
        }
        "a" => {
            let mut buf = String::new();
            locked.read_to_string(&mut buf).map_err(|e| vm.runtime_error(e.to_string()))?;
            let v = vm.heap.intern(buf.as_bytes(), vm.gc.current_white);
            Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
        }
        "n" => {
            let mut line = String::new();
            locked.read_line(&mut line).map_err(|e| vm.runtime_error(e.to_string()))?;
            match crate::value::parse_lua_number(line.trim().as_bytes()) {
                Some(n) => Ok(push_result(vm, nargs, &[LuaValue::Number(n)])),
                None => Ok(push_result(vm, nargs, &[LuaValue::Nil])),
            }
        }
        _ => Err(vm.runtime_error("invalid format to 'read'")),
    }
}

fn l_open(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let path_bytes = check_string(vm, nargs, 0, "open")?;
    let path = String::from_utf8_lossy(&path_bytes).to_string();
    let mode = opt_string(vm, nargs, 1, "open", b"r")?;
    let mode = String::from_utf8_lossy(&mode).to_string();

    let mut opts = std::fs::OpenOptions::new();
    match mode.trim_end_matches('b') {
        "r" => {
            opts.read(true);
        }
        "w" => {
            opts.write(true).create(true).truncate(true);
        }
        "a" => {
            opts.append(true).create(true);
        }
        "r+" => {
            opts.read(true).write(true);
        }
        "w+" => {
            opts.read(true).write(true).create(true).truncate(true);
        }
        "a+" => {
            opts.read(true).append(true).create(true);
        }
        _ => return Err(vm.runtime_error("invalid mode to 'open'")),
    }
    match opts.open(&path) {
        Ok(file) => {
            let v = file_index(vm, file);
            Ok(push_result(vm, nargs, &[v]))
        }
        Err(e) => {
            let msg = vm.new_string(&format!("{}: {}", path, e));
            Ok(push_result(vm, nargs, &[LuaValue::Nil, msg]))
        }
    }
}

fn l_close(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let v = arg(vm, nargs, 0);
    if let LuaValue::Userdata(id) = v {
        let bytes = &vm.heap.userdata(id).bytes;
        if let Ok(arr) = <[u8; 8]>::try_from(bytes.as_slice()) {
            let idx = usize::from_le_bytes(arr);
            if let Some(slot) = vm.io_files.get_mut(idx) {
                *slot = None;
            }
        }
    }
    Ok(push_result(vm, nargs, &[LuaValue::Boolean(true)]))
}

/// Returned as a callable table per the `__call`-table iterator convention
/// stdlib host functions use in place of closures.
fn l_lines(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let path_bytes = check_string(vm, nargs, 0, "lines")?;
    let path = String::from_utf8_lossy(&path_bytes).to_string();
    let file = std::fs::File::open(&path).map_err(|e| vm.runtime_error(format!("{}: {}", path, e)))?;
    let handle = file_index(vm, file);

    let state = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let k_handle = vm.new_string("handle");
    vm.raw_set(state, k_handle, handle);
    let mt = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let call_fn = vm.new_host_function("lines_iterator", lines_step);
    let k_call = vm.new_string("__call");
    vm.raw_set(mt, k_call, call_fn);
    vm.heap.table_mut(state).set_metatable(Some(mt));
    Ok(push_result(vm, nargs, &[LuaValue::Table(state)]))
}

fn lines_step(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let state = check_table(vm, nargs, 0, "lines_iterator")?;
    let handle = {
        let k = vm.new_string("handle");
        vm.heap.table(state).raw_get(&k)
    };
    let idx = match handle {
        LuaValue::Userdata(id) => {
            let bytes = &vm.heap.userdata(id).bytes;
            usize::from_le_bytes(bytes.as_slice().try_into().unwrap())
        }
        _ => return Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    };
    let mut line = String::new();
    let read = match vm.io_files.get_mut(idx).and_then(|f| f.as_mut()) {
        Some(file) => {
            let mut reader = std::io::BufReader::new(file);
            reader.read_line(&mut line).map_err(|e| vm.runtime_error(e.to_string()))?
        }
        None => 0,
    };
    if read == 0 {
        return Ok(push_result(vm, nargs, &[LuaValue::Nil]));
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    let v = vm.heap.intern(line.as_bytes(), vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}
