//! Upvalue open/close machinery: `find_or_create_upvalue` dedupes multiple
//! closures capturing the same stack slot so writes through one are visible
//! through all; `close_upvalues_at` copies live values out of a stack that is
//! about to be popped (returning from a function, or leaving a block that
//! owned captured locals).
//!
//! `Thread::open_upvalues` sorted by descending stack index stands in for the
//! teacher's intrusive linked list (`CachedUpvalue`'s `next` pointer): a
//! linear scan over a small `Vec` is the safe-Rust equivalent since nothing
//! here is hot enough to need an actual intrusive chain.

use crate::gc::{ThreadId, UpvalueId};
use crate::object::Upvalue;
use crate::value::LuaValue;
use crate::vm::LuaVM;

pub fn find_or_create_upvalue(vm: &mut LuaVM, thread: ThreadId, index: usize) -> UpvalueId {
    let open = vm.heap.thread(thread).open_upvalues.clone();
    for uv in &open {
        if let Upvalue::Open { thread: t, index: i } = *vm.heap.upvalue(*uv) {
            if t == thread && i == index {
                return *uv;
            }
        }
    }
    let white = vm.gc.current_white;
    let id = vm.heap.create_upvalue(Upvalue::Open { thread, index }, white);
    insert_sorted(vm, thread, id, index);
    id
}

fn insert_sorted(vm: &mut LuaVM, thread: ThreadId, id: UpvalueId, index: usize) {
    let mut pos = 0;
    {
        let t = vm.heap.thread(thread);
        while pos < t.open_upvalues.len() {
            let other = t.open_upvalues[pos];
            let other_index = match *vm.heap.upvalue(other) {
                Upvalue::Open { index: i, .. } => i,
                Upvalue::Closed(_) => usize::MAX,
            };
            if other_index <= index {
                break;
            }
            pos += 1;
        }
    }
    vm.heap.thread_mut(thread).open_upvalues.insert(pos, id);
}

/// Close every open upvalue on `thread` whose captured stack index is
/// `>= from_index`, copying the current stack value in and detaching it from
/// the thread's open list. Called when a call frame returns and when a
/// `CLOSE` instruction runs (block exit).
pub fn close_upvalues_at(vm: &mut LuaVM, thread: ThreadId, from_index: usize) {
    let open = vm.heap.thread(thread).open_upvalues.clone();
    let mut remaining = Vec::with_capacity(open.len());
    for uv in open {
        let open_index = match *vm.heap.upvalue(uv) {
            Upvalue::Open { index, .. } => Some(index),
            Upvalue::Closed(_) => None,
        };
        match open_index {
            Some(index) if index >= from_index => {
                let value = vm.heap.thread(thread).stack[index];
                *vm.heap.upvalue_mut(uv) = Upvalue::Closed(value);
            }
            _ => remaining.push(uv),
        }
    }
    vm.heap.thread_mut(thread).open_upvalues = remaining;
}

/// Read an upvalue's current value, dereferencing through its owning
/// thread's stack if still open.
pub fn get_upvalue(vm: &LuaVM, id: UpvalueId) -> LuaValue {
    match *vm.heap.upvalue(id) {
        Upvalue::Open { thread, index } => vm.heap.thread(thread).stack[index],
        Upvalue::Closed(v) => v,
    }
}

/// Write through an upvalue: the target stack slot if still open, or the
/// `Upvalue` object's own payload if closed (guarded by the forward barrier,
/// since a closed upvalue is itself a heap object a closure may have already
/// been traced as black).
pub fn set_upvalue(vm: &mut LuaVM, id: UpvalueId, value: LuaValue) {
    match *vm.heap.upvalue(id) {
        Upvalue::Open { thread, index } => {
            vm.heap.thread_mut(thread).stack[index] = value;
        }
        Upvalue::Closed(_) => {
            let black = vm.heap.upvalues.header(id.0).is_black();
            *vm.heap.upvalue_mut(id) = Upvalue::Closed(value);
            vm.gc.barrier_forward(&mut vm.heap, black, value);
        }
    }
}
