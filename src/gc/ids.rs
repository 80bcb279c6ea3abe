//! Arena indices for heap-managed objects.
//!
//! Every GC-managed value is addressed by a small `u32` index into its kind's
//! arena rather than by pointer, so a `LuaValue` copied out of the stack stays
//! valid across a collection step: the collector never moves or resizes the
//! slot an id refers to, it only flips its color bits or frees it.

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id!(StringId);
define_id!(TableId);
define_id!(FunctionId);
define_id!(UpvalueId);
define_id!(UserdataId);
define_id!(ThreadId);

/// Unifies the six id types for generic GC bookkeeping (root lists, gray stack).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GcRef {
    String(StringId),
    Table(TableId),
    Function(FunctionId),
    Upvalue(UpvalueId),
    Userdata(UserdataId),
    Thread(ThreadId),
}

impl From<StringId> for GcRef {
    fn from(id: StringId) -> Self {
        GcRef::String(id)
    }
}
impl From<TableId> for GcRef {
    fn from(id: TableId) -> Self {
        GcRef::Table(id)
    }
}
impl From<FunctionId> for GcRef {
    fn from(id: FunctionId) -> Self {
        GcRef::Function(id)
    }
}
impl From<UpvalueId> for GcRef {
    fn from(id: UpvalueId) -> Self {
        GcRef::Upvalue(id)
    }
}
impl From<UserdataId> for GcRef {
    fn from(id: UserdataId) -> Self {
        GcRef::Userdata(id)
    }
}
impl From<ThreadId> for GcRef {
    fn from(id: ThreadId) -> Self {
        GcRef::Thread(id)
    }
}
