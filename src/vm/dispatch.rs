//! The decode-execute loop: classic register-machine dispatch over Lua 5.1
//! bytecode, grounded on the teacher's `lua_vm/execute.rs` (metamethod event
//! lookup, `TmKind`-style dispatch) but rewritten against this runtime's own
//! value/heap model and opcode encoding.
//!
//! Nested Lua calls don't recurse through Rust: a call pushes a `CallInfo`
//! and the same loop keeps going, the way the reference VM's `luaV_execute`
//! only re-enters itself for a handful of special cases. Host (`CFunction`)
//! calls are the one place Rust recursion happens, since a host function may
//! call back into `LuaVM::call`.

use crate::gc::{FunctionId, ThreadId, UpvalueId};
use crate::object::{CallInfo, Closure, Prototype};
use crate::value::LuaValue;
use crate::vm::opcode::{Instruction, OpCode};
use crate::vm::upvalue::{close_upvalues_at, find_or_create_upvalue, get_upvalue, set_upvalue};
use crate::vm::{LuaError, LuaResult, LuaVM};
use std::rc::Rc;

pub fn call_value(vm: &mut LuaVM, func: LuaValue, args: &[LuaValue]) -> LuaResult<Vec<LuaValue>> {
    let thread = vm.current_thread;
    let arg_base = vm.heap.thread(thread).top;
    ensure_stack(vm, thread, arg_base + args.len());
    {
        let t = vm.heap.thread_mut(thread);
        for (i, a) in args.iter().enumerate() {
            t.stack[arg_base + i] = *a;
        }
        t.top = arg_base + args.len();
    }
    let depth_before = vm.heap.thread(thread).call_infos.len();
    do_call(vm, thread, func, arg_base, args.len(), arg_base, None)?;
    if vm.heap.thread(thread).call_infos.len() > depth_before {
        run_loop(vm, thread, depth_before)?;
    }
    let nres = vm.heap.thread(thread).top - arg_base;
    let results = vm.heap.thread(thread).stack[arg_base..arg_base + nres].to_vec();
    vm.heap.thread_mut(thread).stack.truncate(arg_base);
    vm.heap.thread_mut(thread).top = arg_base;
    Ok(results)
}

fn ensure_stack(vm: &mut LuaVM, thread: ThreadId, len: usize) {
    let t = vm.heap.thread_mut(thread);
    if t.stack.len() < len {
        t.stack.resize(len, LuaValue::Nil);
    }
}

/// Resolve `func` to a callable and either push a `CallInfo` (Lua closure —
/// the surrounding loop keeps running) or execute it to completion (host
/// closure). `results_at` is the absolute stack slot results get copied to.
pub(super) fn do_call(
    vm: &mut LuaVM,
    thread: ThreadId,
    func: LuaValue,
    arg_base: usize,
    nargs: usize,
    results_at: usize,
    expected_results: Option<usize>,
) -> LuaResult<()> {
    let func_id = match func {
        LuaValue::Function(id) => id,
        other => return call_via_metamethod(vm, thread, other, arg_base, nargs, results_at, expected_results),
    };
    match vm.heap.closure(func_id).is_lua() {
        true => push_lua_frame(vm, thread, func, func_id, arg_base, nargs, results_at, expected_results),
        false => call_host(vm, thread, func_id, arg_base, nargs, results_at, expected_results),
    }
}

fn call_via_metamethod(
    vm: &mut LuaVM,
    thread: ThreadId,
    value: LuaValue,
    arg_base: usize,
    nargs: usize,
    results_at: usize,
    expected_results: Option<usize>,
) -> LuaResult<()> {
    let mm = get_metamethod(vm, value, "__call")
        .ok_or_else(|| vm.runtime_error(format!("attempt to call a {} value", value.type_name())))?;
    // Shift args right by one to make room for `value` as the first argument.
    ensure_stack(vm, thread, arg_base + nargs + 1);
    {
        let t = vm.heap.thread_mut(thread);
        for i in (0..nargs).rev() {
            t.stack[arg_base + 1 + i] = t.stack[arg_base + i];
        }
        t.stack[arg_base] = value;
    }
    do_call(vm, thread, mm, arg_base, nargs + 1, results_at, expected_results)
}

fn push_lua_frame(
    vm: &mut LuaVM,
    thread: ThreadId,
    func: LuaValue,
    func_id: FunctionId,
    arg_base: usize,
    nargs: usize,
    results_at: usize,
    expected_results: Option<usize>,
) -> LuaResult<()> {
    if vm.heap.thread(thread).call_infos.len() >= vm.max_call_depth {
        return Err(LuaError::StackOverflow);
    }
    let proto = match vm.heap.closure(func_id) {
        Closure::Lua { proto, .. } => proto.clone(),
        Closure::Host { .. } => unreachable!(),
    };
    let num_params = proto.num_params as usize;
    let (base, vararg_base, vararg_count) = if proto.is_vararg {
        let fixed = num_params.min(nargs);
        let extra = nargs.saturating_sub(num_params);
        let new_base = arg_base + nargs;
        ensure_stack(vm, thread, new_base + proto.max_stack as usize);
        {
            let t = vm.heap.thread_mut(thread);
            for i in 0..num_params {
                t.stack[new_base + i] = if i < fixed { t.stack[arg_base + i] } else { LuaValue::Nil };
            }
        }
        (new_base, arg_base + num_params, extra)
    } else {
        ensure_stack(vm, thread, arg_base + num_params.max(proto.max_stack as usize));
        {
            let t = vm.heap.thread_mut(thread);
            for i in nargs..num_params {
                t.stack[arg_base + i] = LuaValue::Nil;
            }
        }
        (arg_base, 0, 0)
    };
    let max_stack = base + proto.max_stack as usize;
    ensure_stack(vm, thread, max_stack);
    let t = vm.heap.thread_mut(thread);
    t.top = max_stack;
    t.call_infos.push(CallInfo {
        func,
        base,
        saved_pc: 0,
        results_at,
        expected_results,
        vararg_base,
        vararg_count,
        is_tailcall: false,
    });
    Ok(())
}

fn call_host(
    vm: &mut LuaVM,
    thread: ThreadId,
    func_id: FunctionId,
    arg_base: usize,
    nargs: usize,
    results_at: usize,
    expected_results: Option<usize>,
) -> LuaResult<()> {
    let cfunc = match vm.heap.closure(func_id) {
        Closure::Host { func, .. } => *func,
        Closure::Lua { .. } => unreachable!(),
    };
    ensure_stack(vm, thread, arg_base + nargs);
    vm.heap.thread_mut(thread).c_call_depth += 1;
    vm.heap.thread_mut(thread).top = arg_base + nargs;
    let prior_current = vm.current_thread;
    vm.current_thread = thread;
    let outcome = cfunc(vm, nargs);
    vm.current_thread = prior_current;
    vm.heap.thread_mut(thread).c_call_depth -= 1;
    let nres = match outcome {
        Ok(n) => n,
        Err(LuaError::Yield(values)) => {
            vm.heap.thread_mut(thread).pending_yield = Some((results_at, expected_results));
            return Err(LuaError::Yield(values));
        }
        Err(e) => return Err(e),
    };
    relocate_results(vm, thread, arg_base, nres, results_at, expected_results);
    Ok(())
}

/// Move `nres` results sitting at `from` down to `results_at`, padding with
/// `nil` or truncating to match `expected_results` (`None` keeps them all and
/// updates `thread.top` accordingly — the multret case).
pub(super) fn relocate_results(
    vm: &mut LuaVM,
    thread: ThreadId,
    from: usize,
    nres: usize,
    results_at: usize,
    expected_results: Option<usize>,
) {
    let t = vm.heap.thread_mut(thread);
    let want = expected_results.unwrap_or(nres);
    for i in 0..want {
        t.stack[results_at + i] = if i < nres { t.stack[from + i] } else { LuaValue::Nil };
    }
    t.top = results_at + want;
}

/// Run the decode-execute loop until the thread's call stack depth drops
/// back to `stop_depth` (the frame that made the call this invocation is
/// servicing has returned).
pub(super) fn run_loop(vm: &mut LuaVM, thread: ThreadId, stop_depth: usize) -> LuaResult<()> {
    loop {
        if vm.heap.thread(thread).call_infos.len() <= stop_depth {
            return Ok(());
        }
        match step(vm, thread) {
            Ok(()) => {}
            Err(e @ LuaError::Yield(_)) => {
                // Leave every frame exactly as it is — `resume` re-enters
                // this same loop later and picks up at the saved pc.
                return Err(e);
            }
            Err(e) => {
                // A real error: unwind this thread's frames back to
                // stop_depth; the protected-call boundary (if any) above us
                // decides what to do with it.
                close_upvalues_at(vm, thread, 0);
                vm.heap.thread_mut(thread).call_infos.truncate(stop_depth);
                return Err(e);
            }
        }
        vm.gc_safepoint();
    }
}

fn current_proto(vm: &LuaVM, thread: ThreadId) -> Rc<Prototype> {
    let ci = vm.heap.thread(thread).current_call();
    let func_id = match ci.func {
        LuaValue::Function(id) => id,
        _ => unreachable!("call frame func is always a closure"),
    };
    match vm.heap.closure(func_id) {
        Closure::Lua { proto, .. } => proto.clone(),
        Closure::Host { .. } => unreachable!("host closures never get a call frame"),
    }
}

#[inline]
fn reg(vm: &LuaVM, thread: ThreadId, base: usize, r: u32) -> LuaValue {
    vm.heap.thread(thread).stack[base + r as usize]
}

#[inline]
fn set_reg(vm: &mut LuaVM, thread: ThreadId, base: usize, r: u32, v: LuaValue) {
    vm.heap.thread_mut(thread).stack[base + r as usize] = v;
}

#[inline]
fn rk(vm: &LuaVM, thread: ThreadId, base: usize, proto: &Prototype, x: u32) -> LuaValue {
    if Instruction::is_k(x) {
        proto.constants[Instruction::rk_index(x) as usize]
    } else {
        reg(vm, thread, base, x)
    }
}

/// Execute one instruction. Returns after advancing `pc`, pushing/popping a
/// call frame, or raising an error.
fn step(vm: &mut LuaVM, thread: ThreadId) -> LuaResult<()> {
    let proto = current_proto(vm, thread);
    let base = vm.heap.thread(thread).current_call().base;
    let pc = vm.heap.thread(thread).current_call().saved_pc;
    let instr = proto.instructions[pc];
    vm.heap.thread_mut(thread).current_call_mut().saved_pc = pc + 1;
    let op = Instruction::get_opcode(instr);
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let c = Instruction::get_c(instr);

    match op {
        OpCode::Move => {
            let v = reg(vm, thread, base, b);
            set_reg(vm, thread, base, a, v);
        }
        OpCode::LoadK => {
            let bx = Instruction::get_bx(instr) as usize;
            set_reg(vm, thread, base, a, proto.constants[bx]);
        }
        OpCode::LoadBool => {
            set_reg(vm, thread, base, a, LuaValue::Boolean(b != 0));
            if c != 0 {
                vm.heap.thread_mut(thread).current_call_mut().saved_pc += 1;
            }
        }
        OpCode::LoadNil => {
            for r in a..=b {
                set_reg(vm, thread, base, r, LuaValue::Nil);
            }
        }
        OpCode::GetUpval => {
            let uv = current_upvalue(vm, thread, b);
            let v = get_upvalue(vm, uv);
            set_reg(vm, thread, base, a, v);
        }
        OpCode::SetUpval => {
            let uv = current_upvalue(vm, thread, b);
            let v = reg(vm, thread, base, a);
            set_upvalue(vm, uv, v);
        }
        OpCode::GetGlobal => {
            let bx = Instruction::get_bx(instr) as usize;
            let key = proto.constants[bx];
            let globals = vm.globals;
            let v = vm.heap.table(globals).raw_get(&key);
            set_reg(vm, thread, base, a, v);
        }
        OpCode::SetGlobal => {
            let bx = Instruction::get_bx(instr) as usize;
            let key = proto.constants[bx];
            let v = reg(vm, thread, base, a);
            let globals = vm.globals;
            vm.raw_set(globals, key, v);
        }
        OpCode::GetTable => {
            let t = reg(vm, thread, base, b);
            let key = rk(vm, thread, base, &proto, c);
            let v = index_get(vm, t, key)?;
            set_reg(vm, thread, base, a, v);
        }
        OpCode::SetTable => {
            let t = reg(vm, thread, base, a);
            let key = rk(vm, thread, base, &proto, b);
            let v = rk(vm, thread, base, &proto, c);
            index_set(vm, t, key, v)?;
        }
        OpCode::NewTable => {
            let t = vm.new_table();
            set_reg(vm, thread, base, a, t);
        }
        OpCode::SelfOp => {
            let t = reg(vm, thread, base, b);
            let key = rk(vm, thread, base, &proto, c);
            let method = index_get(vm, t, key)?;
            set_reg(vm, thread, base, a + 1, t);
            set_reg(vm, thread, base, a, method);
        }
        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow => {
            let lhs = rk(vm, thread, base, &proto, b);
            let rhs = rk(vm, thread, base, &proto, c);
            let v = arith(vm, op, lhs, rhs)?;
            set_reg(vm, thread, base, a, v);
        }
        OpCode::Unm => {
            let v = reg(vm, thread, base, b);
            let result = if let Some(n) = v.to_number(&vm.heap) {
                LuaValue::Number(-n)
            } else if let Some(mm) = get_metamethod(vm, v, "__unm") {
                call_metamethod2(vm, mm, v, v)?
            } else {
                return Err(vm.runtime_error(format!("attempt to perform arithmetic on a {} value", v.type_name())));
            };
            set_reg(vm, thread, base, a, result);
        }
        OpCode::Not => {
            let v = reg(vm, thread, base, b);
            set_reg(vm, thread, base, a, LuaValue::Boolean(!v.truthy()));
        }
        OpCode::Len => {
            let v = reg(vm, thread, base, b);
            let result = match v {
                LuaValue::String(id) => LuaValue::integer(vm.heap.string_len(id) as i64),
                LuaValue::Table(id) => {
                    if let Some(mm) = get_metamethod(vm, v, "__len") {
                        call_metamethod1(vm, mm, v)?
                    } else {
                        LuaValue::integer(vm.heap.table(id).length())
                    }
                }
                _ => return Err(vm.runtime_error(format!("attempt to get length of a {} value", v.type_name()))),
            };
            set_reg(vm, thread, base, a, result);
        }
        OpCode::Concat => {
            let mut acc = reg(vm, thread, base, c);
            let mut i = c;
            while i > b {
                i -= 1;
                let left = reg(vm, thread, base, i);
                acc = concat(vm, left, acc)?;
            }
            set_reg(vm, thread, base, a, acc);
        }
        OpCode::Jmp => {
            let sbx = Instruction::get_sbx(instr);
            let pc = vm.heap.thread(thread).current_call().saved_pc as i64;
            vm.heap.thread_mut(thread).current_call_mut().saved_pc = (pc + sbx as i64) as usize;
        }
        OpCode::Eq | OpCode::Lt | OpCode::Le => {
            let lhs = rk(vm, thread, base, &proto, b);
            let rhs = rk(vm, thread, base, &proto, c);
            let result = compare(vm, op, lhs, rhs)?;
            if result != (a != 0) {
                vm.heap.thread_mut(thread).current_call_mut().saved_pc += 1;
            }
        }
        OpCode::Test => {
            let v = reg(vm, thread, base, a);
            if v.truthy() != (c != 0) {
                vm.heap.thread_mut(thread).current_call_mut().saved_pc += 1;
            }
        }
        OpCode::TestSet => {
            let v = reg(vm, thread, base, b);
            if v.truthy() == (c != 0) {
                set_reg(vm, thread, base, a, v);
            } else {
                vm.heap.thread_mut(thread).current_call_mut().saved_pc += 1;
            }
        }
        OpCode::Call => {
            let func = reg(vm, thread, base, a);
            let nargs = if b == 0 { vm.heap.thread(thread).top - (base + a as usize + 1) } else { (b - 1) as usize };
            let expected = if c == 0 { None } else { Some((c - 1) as usize) };
            let arg_base = base + a as usize + 1;
            let results_at = base + a as usize;
            do_call(vm, thread, func, arg_base, nargs, results_at, expected)?;
        }
        OpCode::TailCall => {
            let func = reg(vm, thread, base, a);
            let nargs = if b == 0 { vm.heap.thread(thread).top - (base + a as usize + 1) } else { (b - 1) as usize };
            let arg_base = base + a as usize + 1;
            // Close this frame's upvalues and reuse its results slot: a real
            // tail call would also reuse its stack space, but that's a perf
            // optimization, not an observable-semantics requirement here.
            close_upvalues_at(vm, thread, base);
            let ci = vm.heap.thread(thread).call_infos.pop().unwrap();
            do_call(vm, thread, func, arg_base, nargs, ci.results_at, ci.expected_results)?;
        }
        OpCode::Return => {
            let nres = if b == 0 { vm.heap.thread(thread).top - (base + a as usize) } else { (b - 1) as usize };
            let from = base + a as usize;
            close_upvalues_at(vm, thread, base);
            let ci = vm.heap.thread(thread).call_infos.pop().unwrap();
            relocate_results(vm, thread, from, nres, ci.results_at, ci.expected_results);
        }
        OpCode::ForPrep => {
            let init = reg(vm, thread, base, a).as_number().ok_or_else(|| vm.runtime_error("'for' initial value must be a number"))?;
            let limit = reg(vm, thread, base, a + 1).as_number().ok_or_else(|| vm.runtime_error("'for' limit must be a number"))?;
            let step = reg(vm, thread, base, a + 2).as_number().ok_or_else(|| vm.runtime_error("'for' step must be a number"))?;
            set_reg(vm, thread, base, a, LuaValue::Number(init - step));
            let _ = limit;
            let sbx = Instruction::get_sbx(instr);
            let pc = vm.heap.thread(thread).current_call().saved_pc as i64;
            vm.heap.thread_mut(thread).current_call_mut().saved_pc = (pc + sbx as i64) as usize;
        }
        OpCode::ForLoop => {
            let step = reg(vm, thread, base, a + 2).as_number().unwrap();
            let limit = reg(vm, thread, base, a + 1).as_number().unwrap();
            let next = reg(vm, thread, base, a).as_number().unwrap() + step;
            let continue_loop = if step > 0.0 { next <= limit } else { next >= limit };
            if continue_loop {
                set_reg(vm, thread, base, a, LuaValue::Number(next));
                set_reg(vm, thread, base, a + 3, LuaValue::Number(next));
                let sbx = Instruction::get_sbx(instr);
                let pc = vm.heap.thread(thread).current_call().saved_pc as i64;
                vm.heap.thread_mut(thread).current_call_mut().saved_pc = (pc + sbx as i64) as usize;
            }
        }
        OpCode::TForLoop => {
            let func = reg(vm, thread, base, a);
            let state = reg(vm, thread, base, a + 1);
            let control = reg(vm, thread, base, a + 2);
            let results = vm.call(func, &[state, control])?;
            let nresults = c as usize;
            for i in 0..nresults {
                let v = results.get(i).copied().unwrap_or(LuaValue::Nil);
                set_reg(vm, thread, base, a + 3 + i as u32, v);
            }
            let first = reg(vm, thread, base, a + 3);
            if !first.is_nil() {
                set_reg(vm, thread, base, a + 2, first);
            } else {
                vm.heap.thread_mut(thread).current_call_mut().saved_pc += 1;
            }
        }
        OpCode::SetList => {
            let count = if b == 0 { vm.heap.thread(thread).top - (base + a as usize + 1) } else { b as usize };
            let table = reg(vm, thread, base, a);
            let table_id = match table {
                LuaValue::Table(id) => id,
                _ => unreachable!("SETLIST target is always a table register"),
            };
            let block = if c == 0 {
                let bx = Instruction::get_bx(proto.instructions[vm.heap.thread(thread).current_call().saved_pc]);
                vm.heap.thread_mut(thread).current_call_mut().saved_pc += 1;
                bx as i64
            } else {
                (c - 1) as i64
            };
            const FIELDS_PER_FLUSH: i64 = 50;
            for i in 0..count {
                let v = reg(vm, thread, base, a + 1 + i as u32);
                let key = LuaValue::integer(block * FIELDS_PER_FLUSH + i as i64 + 1);
                vm.heap.table_mut(table_id).raw_set(key, v);
            }
            vm.gc.barrier_back_table(&mut vm.heap, table_id);
        }
        OpCode::Close => {
            close_upvalues_at(vm, thread, base + a as usize);
        }
        OpCode::Closure => {
            let bx = Instruction::get_bx(instr) as usize;
            let nested = proto.protos[bx].clone();
            let upvalues = resolve_closure_upvalues(vm, thread, base, &nested);
            let white = vm.gc.current_white;
            let id = vm.heap.create_closure(Closure::Lua { proto: nested, upvalues }, white);
            set_reg(vm, thread, base, a, LuaValue::Function(id));
        }
        OpCode::Vararg => {
            let ci_vararg = {
                let ci = vm.heap.thread(thread).current_call();
                (ci.vararg_base, ci.vararg_count)
            };
            let (vbase, vcount) = ci_vararg;
            let want = if b == 0 { vcount } else { (b - 1) as usize };
            for i in 0..want {
                let v = if i < vcount { vm.heap.thread(thread).stack[vbase + i] } else { LuaValue::Nil };
                set_reg(vm, thread, base, a + i as u32, v);
            }
            if b == 0 {
                vm.heap.thread_mut(thread).top = base + a as usize + want;
            }
        }
    }
    Ok(())
}

fn current_upvalue(vm: &LuaVM, thread: ThreadId, index: u32) -> UpvalueId {
    let ci = vm.heap.thread(thread).current_call();
    let func_id = match ci.func {
        LuaValue::Function(id) => id,
        _ => unreachable!(),
    };
    match vm.heap.closure(func_id) {
        Closure::Lua { upvalues, .. } => upvalues[index as usize],
        Closure::Host { .. } => unreachable!(),
    }
}

fn resolve_closure_upvalues(vm: &mut LuaVM, thread: ThreadId, base: usize, nested: &Prototype) -> Vec<UpvalueId> {
    let enclosing_upvalues: Vec<UpvalueId> = {
        let ci = vm.heap.thread(thread).current_call();
        let func_id = match ci.func {
            LuaValue::Function(id) => id,
            _ => unreachable!(),
        };
        match vm.heap.closure(func_id) {
            Closure::Lua { upvalues, .. } => upvalues.clone(),
            Closure::Host { .. } => unreachable!(),
        }
    };
    nested
        .upvalues
        .iter()
        .map(|desc| {
            if desc.in_stack {
                find_or_create_upvalue(vm, thread, base + desc.index as usize)
            } else {
                enclosing_upvalues[desc.index as usize]
            }
        })
        .collect()
}

// ---------------- indexing, arithmetic, comparison, metamethods ----------------

const MAX_METAMETHOD_DEPTH: u32 = 100;

pub fn get_metamethod(vm: &mut LuaVM, value: LuaValue, event: &str) -> Option<LuaValue> {
    let mt = match value {
        LuaValue::Table(id) => vm.heap.table(id).metatable(),
        LuaValue::Userdata(id) => vm.heap.userdata(id).metatable,
        LuaValue::String(_) => vm.string_metatable,
        _ => None,
    }?;
    let white = vm.gc.current_white;
    let key = LuaValue::String(vm.heap.intern(event.as_bytes(), white));
    let v = vm.heap.table(mt).raw_get(&key);
    if v.is_nil() { None } else { Some(v) }
}

pub fn index_get(vm: &mut LuaVM, table: LuaValue, key: LuaValue) -> LuaResult<LuaValue> {
    index_get_depth(vm, table, key, 0)
}

fn index_get_depth(vm: &mut LuaVM, value: LuaValue, key: LuaValue, depth: u32) -> LuaResult<LuaValue> {
    if depth > MAX_METAMETHOD_DEPTH {
        return Err(vm.runtime_error("'__index' chain too long; possible loop"));
    }
    if let LuaValue::Table(id) = value {
        let raw = vm.heap.table(id).raw_get(&key);
        if !raw.is_nil() {
            return Ok(raw);
        }
    }
    match get_metamethod(vm, value, "__index") {
        Some(mm @ LuaValue::Function(_)) => call_metamethod2(vm, mm, value, key),
        Some(other) => index_get_depth(vm, other, key, depth + 1),
        None if value.is_table() => Ok(LuaValue::Nil),
        None => Err(vm.runtime_error(format!("attempt to index a {} value", value.type_name()))),
    }
}

pub fn index_set(vm: &mut LuaVM, table: LuaValue, key: LuaValue, value: LuaValue) -> LuaResult<()> {
    index_set_depth(vm, table, key, value, 0)
}

fn index_set_depth(vm: &mut LuaVM, target: LuaValue, key: LuaValue, value: LuaValue, depth: u32) -> LuaResult<()> {
    if depth > MAX_METAMETHOD_DEPTH {
        return Err(vm.runtime_error("'__newindex' chain too long; possible loop"));
    }
    if let LuaValue::Table(id) = target {
        let exists = !vm.heap.table(id).raw_get(&key).is_nil();
        if exists {
            vm.raw_set(id, key, value);
            return Ok(());
        }
        match get_metamethod(vm, target, "__newindex") {
            Some(mm @ LuaValue::Function(_)) => {
                vm.call(mm, &[target, key, value])?;
                Ok(())
            }
            Some(other) => index_set_depth(vm, other, key, value, depth + 1),
            None => {
                if key.is_nil() {
                    return Err(vm.runtime_error("table index is nil"));
                }
                vm.raw_set(id, key, value);
                Ok(())
            }
        }
    } else {
        match get_metamethod(vm, target, "__newindex") {
            Some(LuaValue::Function(mm)) => {
                vm.call(LuaValue::Function(mm), &[target, key, value])?;
                Ok(())
            }
            Some(other) => index_set_depth(vm, other, key, value, depth + 1),
            None => Err(vm.runtime_error(format!("attempt to index a {} value", target.type_name()))),
        }
    }
}

fn arith_event(op: OpCode) -> &'static str {
    match op {
        OpCode::Add => "__add",
        OpCode::Sub => "__sub",
        OpCode::Mul => "__mul",
        OpCode::Div => "__div",
        OpCode::Mod => "__mod",
        OpCode::Pow => "__pow",
        _ => unreachable!(),
    }
}

fn arith(vm: &mut LuaVM, op: OpCode, lhs: LuaValue, rhs: LuaValue) -> LuaResult<LuaValue> {
    if let (Some(a), Some(b)) = (lhs.to_number(&vm.heap), rhs.to_number(&vm.heap)) {
        let r = match op {
            OpCode::Add => a + b,
            OpCode::Sub => a - b,
            OpCode::Mul => a * b,
            OpCode::Div => a / b,
            OpCode::Mod => a - (a / b).floor() * b,
            OpCode::Pow => a.powf(b),
            _ => unreachable!(),
        };
        return Ok(LuaValue::Number(r));
    }
    let event = arith_event(op);
    if let Some(mm) = get_metamethod(vm, lhs, event).or_else(|| get_metamethod(vm, rhs, event)) {
        return call_metamethod2(vm, mm, lhs, rhs);
    }
    let culprit = if lhs.to_number(&vm.heap).is_none() { lhs } else { rhs };
    Err(vm.runtime_error(format!("attempt to perform arithmetic on a {} value", culprit.type_name())))
}

fn compare(vm: &mut LuaVM, op: OpCode, lhs: LuaValue, rhs: LuaValue) -> LuaResult<bool> {
    match op {
        OpCode::Eq => Ok(lua_equal(vm, lhs, rhs)?),
        OpCode::Lt => lua_less(vm, lhs, rhs, false),
        OpCode::Le => lua_less(vm, lhs, rhs, true),
        _ => unreachable!(),
    }
}

fn lua_equal(vm: &mut LuaVM, lhs: LuaValue, rhs: LuaValue) -> LuaResult<bool> {
    if lhs.raw_equal(&rhs) {
        return Ok(true);
    }
    let both_tables_or_userdata = matches!(
        (lhs, rhs),
        (LuaValue::Table(_), LuaValue::Table(_)) | (LuaValue::Userdata(_), LuaValue::Userdata(_))
    );
    if !both_tables_or_userdata {
        return Ok(false);
    }
    if let Some(mm) = get_metamethod(vm, lhs, "__eq").or_else(|| get_metamethod(vm, rhs, "__eq")) {
        let r = call_metamethod2(vm, mm, lhs, rhs)?;
        return Ok(r.truthy());
    }
    Ok(false)
}

fn lua_less(vm: &mut LuaVM, lhs: LuaValue, rhs: LuaValue, or_equal: bool) -> LuaResult<bool> {
    match (lhs, rhs) {
        (LuaValue::Number(a), LuaValue::Number(b)) => Ok(if or_equal { a <= b } else { a < b }),
        (LuaValue::String(a), LuaValue::String(b)) => {
            let sa = vm.heap.string_bytes(a);
            let sb = vm.heap.string_bytes(b);
            Ok(if or_equal { sa <= sb } else { sa < sb })
        }
        _ => {
            let event = if or_equal { "__le" } else { "__lt" };
            if let Some(mm) = get_metamethod(vm, lhs, event).or_else(|| get_metamethod(vm, rhs, event)) {
                let r = call_metamethod2(vm, mm, lhs, rhs)?;
                Ok(r.truthy())
            } else {
                Err(vm.runtime_error(format!(
                    "attempt to compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        }
    }
}

fn concat(vm: &mut LuaVM, lhs: LuaValue, rhs: LuaValue) -> LuaResult<LuaValue> {
    let concatable = |v: &LuaValue| matches!(v, LuaValue::String(_) | LuaValue::Number(_));
    if concatable(&lhs) && concatable(&rhs) {
        let mut bytes = value_to_bytes(vm, lhs);
        bytes.extend(value_to_bytes(vm, rhs));
        let white = vm.gc.current_white;
        return Ok(LuaValue::String(vm.heap.intern(&bytes, white)));
    }
    if let Some(mm) = get_metamethod(vm, lhs, "__concat").or_else(|| get_metamethod(vm, rhs, "__concat")) {
        return call_metamethod2(vm, mm, lhs, rhs);
    }
    let culprit = if concatable(&lhs) { rhs } else { lhs };
    Err(vm.runtime_error(format!("attempt to concatenate a {} value", culprit.type_name())))
}

fn value_to_bytes(vm: &LuaVM, v: LuaValue) -> Vec<u8> {
    match v {
        LuaValue::String(id) => vm.heap.string_bytes(id).to_vec(),
        LuaValue::Number(n) => crate::value::format_number(n).into_bytes(),
        _ => unreachable!("caller only passes concatable values"),
    }
}

fn call_metamethod2(vm: &mut LuaVM, mm: LuaValue, a: LuaValue, b: LuaValue) -> LuaResult<LuaValue> {
    let results = vm.call(mm, &[a, b])?;
    Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
}

fn call_metamethod1(vm: &mut LuaVM, mm: LuaValue, a: LuaValue) -> LuaResult<LuaValue> {
    let results = vm.call(mm, &[a])?;
    Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
}
