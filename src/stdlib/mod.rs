//! The standard library: one module per library table, registered into a
//! fresh `LuaVM` by `open_all`, mirroring the teacher's declarative
//! table-of-`CFunction` registration style.

mod base;
mod coroutine_lib;
mod debug;
mod helpers;
mod io;
mod lua_pattern;
mod math;
mod os;
mod package;
mod string;
mod table;

use crate::vm::LuaVM;

pub fn open_all(vm: &mut LuaVM) {
    base::open(vm);
    string::open(vm);
    math::open(vm);
    table::open(vm);
    io::open(vm);
    os::open(vm);
    debug::open(vm);
    coroutine_lib::open(vm);
    package::open(vm);
}
