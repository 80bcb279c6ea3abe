//! Compiler output (`Prototype`) and the runtime closure/upvalue types that
//! bind a `Prototype` to the values it has captured.

use crate::gc::{ThreadId, UpvalueId};
use crate::value::LuaValue;
use crate::vm::CFunction;
use std::rc::Rc;

/// One upvalue descriptor as emitted by the compiler for a `Prototype`: either
/// "capture local register `index` of the *immediately* enclosing function",
/// or "re-export upvalue `index` of the enclosing function's own closure".
#[derive(Clone, Copy, Debug)]
pub struct UpvalDesc {
    pub in_stack: bool,
    pub index: u8,
    /// Debug-only name, purely for `debug.getupvalue`.
    pub name: smol_str::SmolStr,
}

/// Per-instruction source line, for error messages and `debug.getinfo`.
#[derive(Clone, Debug, Default)]
pub struct DebugInfo {
    pub lines: Vec<u32>,
    pub source: Rc<str>,
}

/// Immutable compiler output for one function body. Prototypes own their
/// nested prototypes and constant pool outright; closures only ever hold a
/// shared `Rc<Prototype>`.
pub struct Prototype {
    pub instructions: Vec<u32>,
    pub constants: Vec<LuaValue>,
    pub protos: Vec<Rc<Prototype>>,
    pub upvalues: Vec<UpvalDesc>,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack: u8,
    pub debug: DebugInfo,
}

impl Prototype {
    pub fn line_of(&self, pc: usize) -> u32 {
        self.debug.lines.get(pc).copied().unwrap_or(0)
    }
}

/// Runtime pairing of a `Prototype` with its captured upvalues, or a host
/// callable with its own upvalue vector of plain values.
pub enum Closure {
    Lua {
        proto: Rc<Prototype>,
        upvalues: Vec<UpvalueId>,
    },
    Host {
        func: CFunction,
        name: smol_str::SmolStr,
        upvalues: Vec<LuaValue>,
    },
}

impl Closure {
    pub fn is_lua(&self) -> bool {
        matches!(self, Closure::Lua { .. })
    }
}

/// A variable captured by a closure. `Open` still refers to a live stack slot
/// on the thread that created it (tracked by id, since the closure may be
/// invoked from a different thread than the one that owns the captured
/// local); `Closed` has been copied out and owns its value.
#[derive(Clone, Copy, Debug)]
pub enum Upvalue {
    Open { thread: ThreadId, index: usize },
    Closed(LuaValue),
}

impl Upvalue {
    pub fn is_open(&self) -> bool {
        matches!(self, Upvalue::Open { .. })
    }
}
