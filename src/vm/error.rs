//! Error taxonomy and protected-call machinery, grounded on the teacher's
//! `lua_vm/lua_error.rs` but carrying the error payload inline instead of
//! indirecting through `vm.error_message` — our `LuaValue`/`String` are
//! already cheap to copy/clone, so the teacher's "keep `Result` one byte"
//! trick buys nothing here.

use crate::value::LuaValue;
use std::fmt;

#[derive(Clone, Debug)]
pub enum LuaError {
    TypeError(String),
    ArithmeticError(String),
    /// `error(value, level)`: `value` is the raw Lua error object (often a
    /// string, but `error({})` is legal), `level` is the position-info hint
    /// `error()` was called with (0 = no position info added).
    RuntimeError { value: LuaValue, level: u32 },
    StackOverflow,
    OutOfMemory,
    SyntaxError { message: String, line: u32 },
    CoroutineError(String),
    /// Not a user-visible error: `coroutine.yield`'s unwind signal, carrying
    /// the yielded values back up to the `resume` call that catches it.
    /// Must never reach a `pcall`/`xpcall` boundary as an ordinary failure —
    /// those propagate it unchanged instead of converting it to `false, msg`.
    Yield(Vec<LuaValue>),
}

pub type LuaResult<T> = Result<T, LuaError>;

impl LuaError {
    pub fn runtime(message: impl Into<String>, heap: &mut crate::gc::Heap, white: u8) -> Self {
        let s = heap.intern(message.into().as_bytes(), white);
        LuaError::RuntimeError {
            value: LuaValue::String(s),
            level: 1,
        }
    }

    /// The value `pcall`/`xpcall` hand back as the error result, coercing
    /// non-`RuntimeError` kinds to a descriptive string the same way the
    /// reference implementation formats internal errors.
    pub fn to_value(&self, heap: &mut crate::gc::Heap, white: u8) -> LuaValue {
        match self {
            LuaError::RuntimeError { value, .. } => *value,
            other => {
                let s = heap.intern(other.to_string().as_bytes(), white);
                LuaValue::String(s)
            }
        }
    }
}

impl fmt::Display for LuaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaError::TypeError(msg) => write!(f, "{}", msg),
            LuaError::ArithmeticError(msg) => write!(f, "{}", msg),
            LuaError::RuntimeError { value, .. } => match value {
                LuaValue::String(_) => write!(f, "runtime error"),
                _ => write!(f, "runtime error (non-string error object)"),
            },
            LuaError::StackOverflow => write!(f, "stack overflow"),
            LuaError::OutOfMemory => write!(f, "out of memory"),
            LuaError::SyntaxError { message, line } => write!(f, "{}:{}: {}", "?", line, message),
            LuaError::CoroutineError(msg) => write!(f, "{}", msg),
            LuaError::Yield(_) => write!(f, "attempt to yield from outside a resumed coroutine"),
        }
    }
}

impl std::error::Error for LuaError {}
