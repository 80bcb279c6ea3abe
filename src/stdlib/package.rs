//! `package` library: `require`/`loaded`/`preload`/`path` resolution over the
//! host filesystem. No dynamic library loading — that surface is out of
//! scope, matching the embedding posture the rest of the stdlib follows.

use crate::stdlib::helpers::*;
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};
use std::rc::Rc;

pub fn open(vm: &mut LuaVM) {
    let lib = new_lib_table(vm, "package");
    let loaded = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let k = vm.new_string("loaded");
    vm.raw_set(lib, k, LuaValue::Table(loaded));
    let preload = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let k = vm.new_string("preload");
    vm.raw_set(lib, k, LuaValue::Table(preload));
    let path = vm.new_string("./?.lua;./?/init.lua");
    let k = vm.new_string("path");
    vm.raw_set(lib, k, path);

    register(vm, lib, "require", l_require);
}

fn resolve(name: &str, path_template: &str) -> Option<std::path::PathBuf> {
    for pattern in path_template.split(';') {
        let candidate = pattern.replace('?', name);
        let p = std::path::PathBuf::from(&candidate);
        if p.is_file() {
            return Some(p);
        }
    }
    None
}

fn l_require(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let name_bytes = check_string(vm, nargs, 0, "require")?;
    let name = String::from_utf8_lossy(&name_bytes).to_string();

    let package = vm.get_global("package");
    let LuaValue::Table(package_id) = package else {
        return Err(vm.runtime_error("'package' table missing"));
    };
    let k_loaded = vm.new_string("loaded");
    let loaded = vm.heap.table(package_id).raw_get(&k_loaded);
    let LuaValue::Table(loaded_id) = loaded else {
        return Err(vm.runtime_error("'package.loaded' missing"));
    };
    let name_key = vm.new_string(&name);
    let already = vm.heap.table(loaded_id).raw_get(&name_key);
    if !already.is_nil() {
        return Ok(push_result(vm, nargs, &[already]));
    }

    let k_preload = vm.new_string("preload");
    let preload = vm.heap.table(package_id).raw_get(&k_preload);
    if let LuaValue::Table(preload_id) = preload {
        let loader = vm.heap.table(preload_id).raw_get(&name_key);
        if let LuaValue::Function(_) = loader {
            let results = vm.call(loader, &[name_key])?;
            let result = results.into_iter().next().unwrap_or(LuaValue::Boolean(true));
            vm.raw_set(loaded_id, name_key, result);
            return Ok(push_result(vm, nargs, &[result]));
        }
    }

    let k_path = vm.new_string("path");
    let path_val = vm.heap.table(package_id).raw_get(&k_path);
    let path_template = match path_val {
        LuaValue::String(id) => String::from_utf8_lossy(vm.heap.string_bytes(id)).to_string(),
        _ => "./?.lua".to_string(),
    };
    let dotted = name.replace('.', "/");
    let file = resolve(&dotted, &path_template)
        .ok_or_else(|| vm.runtime_error(format!("module '{}' not found", name)))?;
    let source = std::fs::read_to_string(&file).map_err(|e| vm.runtime_error(e.to_string()))?;
    let proto = vm.compile_named(&source, &format!("@{}", file.display()))?;
    let white = vm.gc.current_white;
    let closure = vm
        .heap
        .create_closure(crate::object::Closure::Lua { proto: Rc::new(proto), upvalues: Vec::new() }, white);
    let results = vm.call(LuaValue::Function(closure), &[])?;
    let result = results.into_iter().next().unwrap_or(LuaValue::Boolean(true));
    vm.raw_set(loaded_id, name_key, result);
    Ok(push_result(vm, nargs, &[result]))
}
