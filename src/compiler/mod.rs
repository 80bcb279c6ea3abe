//! Source-to-bytecode pipeline, grounded on the teacher's `compiler` module
//! layout (lexer → parser, kept as separate submodules) but collapsed into a
//! single parse that emits instructions directly rather than the teacher's
//! CST-then-lower pipeline, since this runtime's bytecode is a much smaller
//! target than the teacher's own IR.

mod lexer;
mod parser;
mod token;

use crate::gc::Heap;
use crate::object::Prototype;
use crate::vm::error::LuaResult;

/// Compile a chunk of Lua 5.1 source into a top-level `Prototype`.
/// `chunk_name` is the `@file`/`=source` tag used in error messages and
/// `debug.getinfo`'s `source` field. String literals are interned into
/// `heap` as constants are collected, under `white` as the GC's current
/// allocation color.
pub fn compile(source: &str, chunk_name: &str, heap: &mut Heap, white: u8) -> LuaResult<Prototype> {
    parser::compile(source, chunk_name, heap, white)
}
