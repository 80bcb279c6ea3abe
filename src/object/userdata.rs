//! Full userdata: heap-allocated bytes with an associated metatable and
//! environment table, GC-participating, may define `__gc`. Light userdata is
//! `LuaValue::LightUserdata` and never touches the heap (see `value.rs`).

use crate::gc::TableId;

pub struct Userdata {
    pub bytes: Vec<u8>,
    pub metatable: Option<TableId>,
    pub env: Option<TableId>,
}

impl Userdata {
    pub fn new(bytes: Vec<u8>) -> Self {
        Userdata {
            bytes,
            metatable: None,
            env: None,
        }
    }
}
