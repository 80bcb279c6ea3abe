//! A coroutine's execution state: value stack, call-info chain, open-upvalue
//! list and status, as specified in §4.5/§4.8.

use crate::gc::UpvalueId;
use crate::value::LuaValue;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadStatus {
    Running,
    Suspended,
    Normal,
    Dead,
}

/// One active call frame. `base` is the zero point of the callee's register
/// window inside the thread's `stack`; `saved_pc` is the caller's program
/// counter to resume at on return.
pub struct CallInfo {
    pub func: LuaValue,
    pub base: usize,
    pub saved_pc: usize,
    /// Absolute stack index `RETURN` copies results down to — the register
    /// the call instruction's function value itself occupied in the caller.
    pub results_at: usize,
    /// `None` means "all results" (a tail position / `LUA_MULTRET` call).
    pub expected_results: Option<usize>,
    /// Stack index of the first extra (beyond fixed params) argument passed
    /// to a vararg function, and how many there are. `vararg_count == 0`
    /// for non-vararg functions.
    pub vararg_base: usize,
    pub vararg_count: usize,
    pub is_tailcall: bool,
}

pub struct Thread {
    pub stack: Vec<LuaValue>,
    /// One past the last register holding a meaningful value — the
    /// "logical top" of the stack, used by multi-result call/return/vararg
    /// instructions (`B == 0` / `C == 0`) to mean "everything up to here".
    pub top: usize,
    pub call_infos: Vec<CallInfo>,
    /// Sorted by descending stack index, matching the spec's intrusive-chain
    /// invariant without needing actual intrusive pointers.
    pub open_upvalues: Vec<UpvalueId>,
    pub status: ThreadStatus,
    /// The thread that called `resume` on this one, if any — becomes
    /// `Normal` while this thread runs and `Running` again once this thread
    /// yields or returns.
    pub resumer: Option<crate::gc::ThreadId>,
    pub error_value: Option<LuaValue>,
    /// Incremented around every host-closure invocation; `yield` refuses to
    /// suspend while this is nonzero ("attempt to yield across a C-call
    /// boundary").
    pub c_call_depth: u32,
    pub is_main: bool,
    /// Absolute stack slot `resume`'s return values are ultimately read from
    /// once this thread's outermost call returns, fixed at `resume`'s first
    /// invocation.
    pub entry_results_at: usize,
    /// Set by the host-call dispatcher when a `Yield` unwinds through it:
    /// where (and how many of) the next `resume`'s arguments should be
    /// written, mirroring the interrupted call's `results_at`/`expected_results`.
    pub pending_yield: Option<(usize, Option<usize>)>,
}

impl Thread {
    pub fn new(is_main: bool) -> Self {
        Thread {
            stack: Vec::with_capacity(64),
            top: 0,
            call_infos: Vec::new(),
            open_upvalues: Vec::new(),
            status: if is_main {
                ThreadStatus::Running
            } else {
                ThreadStatus::Suspended
            },
            resumer: None,
            error_value: None,
            c_call_depth: 0,
            is_main,
            entry_results_at: 0,
            pending_yield: None,
        }
    }

    pub fn current_call(&self) -> &CallInfo {
        self.call_infos.last().expect("no active call frame")
    }

    pub fn current_call_mut(&mut self) -> &mut CallInfo {
        self.call_infos.last_mut().expect("no active call frame")
    }
}
