//! Core heap-managed objects: tables, closures/prototypes/upvalues,
//! userdata, and threads.

mod closure;
mod table;
mod thread;
mod userdata;

pub use closure::{Closure, DebugInfo, Prototype, UpvalDesc, Upvalue};
pub use table::LuaTable;
pub use thread::{CallInfo, Thread, ThreadStatus};
pub use userdata::Userdata;
