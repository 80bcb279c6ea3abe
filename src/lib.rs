//! A register-based Lua 5.1 runtime: lexer, parser, bytecode compiler, VM and
//! tracing garbage collector.

pub mod compiler;
pub mod gc;
pub mod object;
pub mod stdlib;
pub mod value;
pub mod vm;

#[cfg(test)]
mod test;

pub use gc::Gc;
pub use object::{Closure, LuaTable, Prototype, Thread, ThreadStatus};
pub use value::LuaValue;
pub use vm::{CFunction, LuaError, LuaResult, LuaVM};

use std::rc::Rc;

/// Compile and run `source` in a fresh VM with the full standard library loaded,
/// returning the chunk's return values.
pub fn execute(source: &str) -> LuaResult<Vec<LuaValue>> {
    let mut vm = LuaVM::new();
    vm.open_libs();
    vm.do_string(source)
}

/// Compile and run `source` against an already-configured VM.
pub fn execute_with_vm(vm: &mut LuaVM, source: &str) -> LuaResult<Vec<LuaValue>> {
    let proto = vm.compile(source)?;
    vm.call_main(Rc::new(proto))
}
