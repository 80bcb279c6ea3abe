//! Tri-color incremental mark-and-sweep garbage collector, following the
//! teacher's `gc/mod.rs` phase structure but trimmed to the pure-incremental
//! mode the spec asks for (no generational mode — that machinery lives in the
//! teacher's Lua 5.5 port and has no counterpart here).
//!
//! Phases: `Pause -> Propagate -> Atomic -> Sweep -> Finalize -> Pause`.
//! Two white shades let objects allocated mid-cycle start out implicitly safe
//! from this cycle's sweep (see `gc::header`).

mod arena;
mod header;
mod ids;

pub mod heap;

pub use header::GcHeader;
pub use heap::{GcString, Heap};
pub use ids::{FunctionId, GcRef, StringId, TableId, ThreadId, UpvalueId, UserdataId};

use crate::object::{Closure, Upvalue};
use crate::value::LuaValue;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GcPhase {
    Pause,
    Propagate,
    Atomic,
    Sweep,
    Finalize,
}

/// The root set a collection cycle starts from, gathered by `LuaVM` (which
/// owns the `GlobalState` fields these refer to) and handed to the collector
/// so `gc` itself stays decoupled from `vm`.
pub struct Roots {
    pub registry: TableId,
    pub globals: TableId,
    pub main_thread: ThreadId,
    pub current_thread: ThreadId,
    pub current_error: Option<LuaValue>,
}

pub struct Gc {
    pub current_white: u8,
    pub phase: GcPhase,
    gray: Vec<GcRef>,
    to_finalize: Vec<UserdataId>,
    pub gc_threshold: usize,
    /// Percent of bytes-in-use at which the next cycle triggers (default 200%).
    pub pause_ratio: usize,
    /// Bounds how much propagate work one incremental step performs.
    pub step_multiplier: usize,
    pub cycles_completed: u64,
}

const INITIAL_THRESHOLD: usize = 64 * 1024;

impl Gc {
    pub fn new() -> Self {
        Gc {
            current_white: header::WHITE0,
            phase: GcPhase::Pause,
            gray: Vec::new(),
            to_finalize: Vec::new(),
            gc_threshold: INITIAL_THRESHOLD,
            pause_ratio: 200,
            step_multiplier: 200,
            cycles_completed: 0,
        }
    }

    fn other_white(&self) -> u8 {
        (header::WHITE0 | header::WHITE1) & !self.current_white
    }

    // ---------------- write barriers ----------------

    /// Forward barrier: when a black container is mutated to reference a
    /// white value, mark the white value gray immediately so it survives
    /// this cycle without requiring the container to be re-scanned. Used by
    /// `SETTABLE`/`SETUPVAL` and similar single-slot mutations.
    pub fn barrier_forward(&mut self, heap: &mut Heap, parent_black: bool, child: LuaValue) {
        if !parent_black {
            return;
        }
        if let Some(r) = value_to_ref(child) {
            if is_white(heap, r) {
                self.mark_gray(heap, r);
            }
        }
    }

    /// Backward barrier: revert a black container back to gray and queue it
    /// for re-scanning, for containers with bulk mutation (the globals
    /// table, `NEWTABLE`-then-fill sequences).
    pub fn barrier_back_table(&mut self, heap: &mut Heap, table: TableId) {
        let h = heap.tables.header_mut(table.0);
        if h.is_black() {
            h.make_gray();
            self.gray.push(GcRef::Table(table));
        }
    }

    // ---------------- allocation triggering ----------------

    pub fn maybe_start_cycle(&mut self, heap: &Heap) {
        if self.phase == GcPhase::Pause && heap.bytes_allocated >= self.gc_threshold {
            self.phase = GcPhase::Propagate;
        }
    }

    /// Run one bounded unit of collector work. Called at VM safepoints:
    /// allocation sites, call-dispatch back-edges, coroutine yield. Returns
    /// any userdata now due to run `__gc` — the collector itself cannot call
    /// into Lua, so the caller (`LuaVM`) is responsible for invoking the
    /// metamethod and then freeing the slot.
    pub fn step(&mut self, heap: &mut Heap, roots: &Roots) -> Vec<UserdataId> {
        match self.phase {
            GcPhase::Pause => {}
            GcPhase::Propagate => {
                if self.gray.is_empty() {
                    self.seed_roots(heap, roots);
                }
                let mut budget = self.step_multiplier;
                while budget > 0 {
                    match self.gray.pop() {
                        Some(r) => {
                            self.blacken(heap, r);
                            budget -= 1;
                        }
                        None => {
                            self.phase = GcPhase::Atomic;
                            break;
                        }
                    }
                }
            }
            GcPhase::Atomic => {
                // Re-seed from roots in case mutator roots changed since the
                // gray stack drained, then drain fully before sweeping.
                self.seed_roots(heap, roots);
                while let Some(r) = self.gray.pop() {
                    self.blacken(heap, r);
                }
                self.phase = GcPhase::Sweep;
            }
            GcPhase::Sweep => {
                // Flip before sweeping: the white that was "current" during
                // propagate/atomic becomes "other", i.e. dead, and everything
                // swept alive is repainted into the new current white.
                self.current_white = self.other_white();
                self.sweep(heap);
                self.phase = GcPhase::Finalize;
            }
            GcPhase::Finalize => {
                let pending = self.to_finalize.drain(..).collect();
                self.gc_threshold = (heap.bytes_allocated * self.pause_ratio) / 100
                    + INITIAL_THRESHOLD;
                self.cycles_completed += 1;
                self.phase = GcPhase::Pause;
                return pending;
            }
        }
        Vec::new()
    }

    /// Run a complete cycle synchronously (used by `collectgarbage("collect")`
    /// and by tests asserting the post-cycle invariant). Returns the union of
    /// every step's pending finalizers, in sweep order.
    pub fn collect_full(&mut self, heap: &mut Heap, roots: &Roots) -> Vec<UserdataId> {
        if self.phase == GcPhase::Pause {
            self.phase = GcPhase::Propagate;
        }
        let mut pending = Vec::new();
        while self.phase != GcPhase::Pause {
            pending.extend(self.step(heap, roots));
        }
        pending
    }

    fn seed_roots(&mut self, heap: &mut Heap, roots: &Roots) {
        self.mark_gray(heap, GcRef::Table(roots.registry));
        self.mark_gray(heap, GcRef::Table(roots.globals));
        self.mark_gray(heap, GcRef::Thread(roots.main_thread));
        self.mark_gray(heap, GcRef::Thread(roots.current_thread));
        if let Some(v) = roots.current_error {
            if let Some(r) = value_to_ref(v) {
                self.mark_gray(heap, r);
            }
        }
    }

    fn mark_gray(&mut self, heap: &mut Heap, r: GcRef) {
        if is_white(heap, r) {
            // White -> gray: flip the color bits now; scanning (turning it
            // black) happens when popped in `blacken`.
            set_gray(heap, r);
            self.gray.push(r);
        }
    }

    fn mark_value(&mut self, heap: &mut Heap, v: LuaValue) {
        if let Some(r) = value_to_ref(v) {
            self.mark_gray(heap, r);
        }
    }

    /// Pop one gray object, mark its children gray, and turn it black.
    ///
    /// Every arm copies out what it needs to scan before recursing into
    /// `mark_gray`/`mark_value`, since those need `heap` mutably (to flip
    /// color bits) while the object being scanned is still borrowed
    /// immutably from the same arena otherwise.
    fn blacken(&mut self, heap: &mut Heap, r: GcRef) {
        match r {
            GcRef::String(_) => {}
            GcRef::Table(id) => {
                let t = heap.table(id);
                let values: Vec<LuaValue> = t.iter_array().map(|(_, v)| *v).collect();
                let pairs: Vec<(LuaValue, LuaValue)> =
                    t.iter_hash().map(|(k, v)| (*k, *v)).collect();
                let mt = t.metatable();
                for v in values {
                    self.mark_value(heap, v);
                }
                for (k, v) in pairs {
                    self.mark_value(heap, k);
                    self.mark_value(heap, v);
                }
                if let Some(mt) = mt {
                    self.mark_gray(heap, GcRef::Table(mt));
                }
            }
            GcRef::Function(id) => match heap.closure(id) {
                Closure::Lua { proto, upvalues } => {
                    let proto = proto.clone();
                    let upvalues = upvalues.clone();
                    self.mark_prototype(heap, &proto);
                    for uv in upvalues {
                        self.mark_gray(heap, GcRef::Upvalue(uv));
                    }
                }
                Closure::Host { upvalues, .. } => {
                    let upvalues = upvalues.clone();
                    for v in upvalues {
                        self.mark_value(heap, v);
                    }
                }
            },
            GcRef::Upvalue(id) => match *heap.upvalue(id) {
                Upvalue::Open { thread, .. } => self.mark_gray(heap, GcRef::Thread(thread)),
                Upvalue::Closed(v) => self.mark_value(heap, v),
            },
            GcRef::Userdata(id) => {
                let ud = heap.userdata(id);
                let (mt, env) = (ud.metatable, ud.env);
                if let Some(mt) = mt {
                    self.mark_gray(heap, GcRef::Table(mt));
                }
                if let Some(env) = env {
                    self.mark_gray(heap, GcRef::Table(env));
                }
            }
            GcRef::Thread(id) => self.mark_thread(heap, id),
        }
        set_black(heap, r);
    }

    fn mark_thread(&mut self, heap: &mut Heap, id: ThreadId) {
        let t = heap.thread(id);
        let stack = t.stack.clone();
        let call_funcs: Vec<LuaValue> = t.call_infos.iter().map(|ci| ci.func).collect();
        let open_upvalues = t.open_upvalues.clone();
        let error_value = t.error_value;

        for v in stack {
            self.mark_value(heap, v);
        }
        for v in call_funcs {
            self.mark_value(heap, v);
        }
        for uv in open_upvalues {
            self.mark_gray(heap, GcRef::Upvalue(uv));
        }
        if let Some(err) = error_value {
            self.mark_value(heap, err);
        }
    }

    /// Constants of a `Prototype` (and transitively its nested prototypes)
    /// are not heap objects themselves (a `Prototype` is plain `Rc`-owned),
    /// so any closure over it must keep its constant pool's string/table
    /// constants alive explicitly.
    fn mark_prototype(&mut self, heap: &mut Heap, proto: &crate::object::Prototype) {
        let constants = proto.constants.clone();
        for k in constants {
            self.mark_value(heap, k);
        }
        for nested in &proto.protos {
            self.mark_prototype(heap, nested);
        }
    }

    // ---------------- sweep & finalize ----------------

    fn sweep(&mut self, heap: &mut Heap) {
        let white = self.current_white;

        let strings: Vec<u32> = heap.strings.live_indices().collect();
        for i in strings {
            if heap.strings.header(i).is_dead(white) {
                heap.unintern(StringId(i));
                heap.strings.free(i);
            } else {
                heap.strings.header_mut(i).make_white(white);
            }
        }

        let tables: Vec<u32> = heap.tables.live_indices().collect();
        for i in tables {
            if heap.tables.header(i).is_dead(white) {
                heap.tables.free(i);
            } else {
                heap.tables.header_mut(i).make_white(white);
            }
        }

        let closures: Vec<u32> = heap.closures.live_indices().collect();
        for i in closures {
            if heap.closures.header(i).is_dead(white) {
                heap.closures.free(i);
            } else {
                heap.closures.header_mut(i).make_white(white);
            }
        }

        let upvalues: Vec<u32> = heap.upvalues.live_indices().collect();
        for i in upvalues {
            if heap.upvalues.header(i).is_dead(white) {
                heap.upvalues.free(i);
            } else {
                heap.upvalues.header_mut(i).make_white(white);
            }
        }

        let userdata: Vec<u32> = heap.userdata.live_indices().collect();
        for i in userdata {
            let header = heap.userdata.header(i);
            if header.is_finalized() {
                continue;
            }
            if header.is_dead(white) {
                // Has a __gc? Queue for finalization instead of freeing yet.
                if heap.userdata.get(i).metatable.is_some() {
                    heap.userdata.header_mut(i).set_finalized();
                    self.to_finalize.push(UserdataId(i));
                } else {
                    heap.userdata.free(i);
                }
            } else {
                heap.userdata.header_mut(i).make_white(white);
            }
        }

        let threads: Vec<u32> = heap.threads.live_indices().collect();
        for i in threads {
            if heap.threads.header(i).is_dead(white) {
                heap.threads.free(i);
            } else {
                heap.threads.header_mut(i).make_white(white);
            }
        }
    }

    pub fn queue_finalizer(&mut self, id: UserdataId) {
        self.to_finalize.push(id);
    }
}

impl Default for Gc {
    fn default() -> Self {
        Self::new()
    }
}

fn value_to_ref(v: LuaValue) -> Option<GcRef> {
    match v {
        LuaValue::String(id) => Some(GcRef::String(id)),
        LuaValue::Table(id) => Some(GcRef::Table(id)),
        LuaValue::Function(id) => Some(GcRef::Function(id)),
        LuaValue::Userdata(id) => Some(GcRef::Userdata(id)),
        LuaValue::Thread(id) => Some(GcRef::Thread(id)),
        _ => None,
    }
}

fn is_white(heap: &Heap, r: GcRef) -> bool {
    let h = match r {
        GcRef::String(id) => heap.strings.header(id.0),
        GcRef::Table(id) => heap.tables.header(id.0),
        GcRef::Function(id) => heap.closures.header(id.0),
        GcRef::Upvalue(id) => heap.upvalues.header(id.0),
        GcRef::Userdata(id) => heap.userdata.header(id.0),
        GcRef::Thread(id) => heap.threads.header(id.0),
    };
    h.is_white()
}

fn set_gray(heap: &mut Heap, r: GcRef) {
    mutate_header(heap, r, |h| h.make_gray());
}

fn set_black(heap: &mut Heap, r: GcRef) {
    mutate_header(heap, r, |h| h.make_black());
}

fn mutate_header(heap: &mut Heap, r: GcRef, f: impl FnOnce(&mut GcHeader)) {
    let h = match r {
        GcRef::String(id) => heap.strings.header_mut(id.0),
        GcRef::Table(id) => heap.tables.header_mut(id.0),
        GcRef::Function(id) => heap.closures.header_mut(id.0),
        GcRef::Upvalue(id) => heap.upvalues.header_mut(id.0),
        GcRef::Userdata(id) => heap.userdata.header_mut(id.0),
        GcRef::Thread(id) => heap.threads.header_mut(id.0),
    };
    f(h);
}
