//! The heap: one arena per GC object kind, plus the string intern table.

use crate::gc::arena::Arena;
use crate::gc::ids::{FunctionId, StringId, TableId, ThreadId, UserdataId};
use crate::object::{Closure, LuaTable, Thread, Upvalue, Userdata};
use ahash::RandomState;
use hashbrown::HashMap;

pub struct GcString {
    pub bytes: Box<[u8]>,
    pub hash: u64,
}

pub struct Heap {
    pub strings: Arena<GcString>,
    pub tables: Arena<LuaTable>,
    pub closures: Arena<Closure>,
    pub upvalues: Arena<Upvalue>,
    pub userdata: Arena<Userdata>,
    pub threads: Arena<Thread>,
    interner: HashMap<Box<[u8]>, StringId, RandomState>,
    pub bytes_allocated: usize,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            strings: Arena::new(32),
            tables: Arena::new(96),
            closures: Arena::new(64),
            upvalues: Arena::new(24),
            userdata: Arena::new(48),
            threads: Arena::new(256),
            interner: HashMap::with_hasher(RandomState::new()),
            bytes_allocated: 0,
        }
    }

    // ---- strings ----

    /// Intern `bytes`: returns the existing canonical instance if content
    /// matches, otherwise allocates a new one. `current_white` tags freshly
    /// allocated strings so they survive a GC cycle already in progress.
    pub fn intern(&mut self, bytes: &[u8], current_white: u8) -> StringId {
        if let Some(id) = self.interner.get(bytes) {
            return *id;
        }
        let hash = ahash::RandomState::with_seeds(1, 2, 3, 4).hash_one(bytes);
        let gc_string = GcString {
            bytes: bytes.into(),
            hash,
        };
        let idx = self.strings.alloc(gc_string, current_white);
        self.bytes_allocated += bytes.len() + 32;
        let id = StringId(idx);
        self.interner.insert(bytes.into(), id);
        id
    }

    pub fn string_bytes(&self, id: StringId) -> &[u8] {
        &self.strings.get(id.0).bytes
    }

    pub fn string_len(&self, id: StringId) -> usize {
        self.strings.get(id.0).bytes.len()
    }

    /// Remove a dead string's interner entry. Called by the sweeper right
    /// before freeing the arena slot.
    pub fn unintern(&mut self, id: StringId) {
        let bytes = self.strings.get(id.0).bytes.clone();
        self.interner.remove(&*bytes);
    }

    // ---- tables ----

    pub fn create_table(&mut self, table: LuaTable, current_white: u8) -> TableId {
        self.bytes_allocated += 96;
        TableId(self.tables.alloc(table, current_white))
    }

    pub fn table(&self, id: TableId) -> &LuaTable {
        self.tables.get(id.0)
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut LuaTable {
        self.tables.get_mut(id.0)
    }

    // ---- closures ----

    pub fn create_closure(&mut self, closure: Closure, current_white: u8) -> FunctionId {
        self.bytes_allocated += 64;
        FunctionId(self.closures.alloc(closure, current_white))
    }

    pub fn closure(&self, id: FunctionId) -> &Closure {
        self.closures.get(id.0)
    }

    pub fn closure_mut(&mut self, id: FunctionId) -> &mut Closure {
        self.closures.get_mut(id.0)
    }

    // ---- upvalues ----

    pub fn create_upvalue(&mut self, uv: Upvalue, current_white: u8) -> crate::gc::UpvalueId {
        self.bytes_allocated += 24;
        crate::gc::UpvalueId(self.upvalues.alloc(uv, current_white))
    }

    pub fn upvalue(&self, id: crate::gc::UpvalueId) -> &Upvalue {
        self.upvalues.get(id.0)
    }

    pub fn upvalue_mut(&mut self, id: crate::gc::UpvalueId) -> &mut Upvalue {
        self.upvalues.get_mut(id.0)
    }

    // ---- userdata ----

    pub fn create_userdata(&mut self, ud: Userdata, current_white: u8) -> UserdataId {
        self.bytes_allocated += 48 + ud.bytes.len();
        UserdataId(self.userdata.alloc(ud, current_white))
    }

    pub fn userdata(&self, id: UserdataId) -> &Userdata {
        self.userdata.get(id.0)
    }

    pub fn userdata_mut(&mut self, id: UserdataId) -> &mut Userdata {
        self.userdata.get_mut(id.0)
    }

    // ---- threads ----

    pub fn create_thread(&mut self, thread: Thread, current_white: u8) -> ThreadId {
        self.bytes_allocated += 256;
        ThreadId(self.threads.alloc(thread, current_white))
    }

    pub fn thread(&self, id: ThreadId) -> &Thread {
        self.threads.get(id.0)
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> &mut Thread {
        self.threads.get_mut(id.0)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
