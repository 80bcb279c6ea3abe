//! Single-pass recursive-descent parser and code generator: each grammar
//! production emits bytecode directly into the enclosing `FuncState` as it
//! parses, the way the reference compiler's `lparser.c`/`lcode.c` pair does,
//! rather than building an intermediate AST.
//!
//! Simplification versus the reference compiler: expressions used only for
//! their value (conditions, operands, `and`/`or`) are always materialized
//! into a register rather than represented as patchable true/false jump
//! lists. This costs a few redundant `LOADBOOL`/`JMP` pairs in boolean
//! contexts but keeps codegen straightforward; every jump target here is
//! resolved immediately rather than through a deferred patch list.

use crate::compiler::lexer::Lexer;
use crate::compiler::token::{Token, TokenKind};
use crate::gc::Heap;
use crate::object::{DebugInfo, Prototype, UpvalDesc};
use crate::value::LuaValue;
use crate::vm::error::{LuaError, LuaResult};
use crate::vm::opcode::{Instruction, OpCode};
use smol_str::SmolStr;
use std::rc::Rc;

struct LocalVar {
    name: SmolStr,
    reg: u8,
}

struct BlockCx {
    is_loop: bool,
    break_jumps: Vec<usize>,
    local_base: usize,
}

struct FuncState {
    instructions: Vec<u32>,
    lines: Vec<u32>,
    constants: Vec<LuaValue>,
    protos: Vec<Rc<Prototype>>,
    upvalues: Vec<UpvalDesc>,
    num_params: u8,
    is_vararg: bool,
    freereg: u8,
    max_stack: u8,
    locals: Vec<LocalVar>,
    blocks: Vec<BlockCx>,
}

impl FuncState {
    fn new() -> Self {
        FuncState {
            instructions: Vec::new(),
            lines: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            num_params: 0,
            is_vararg: false,
            freereg: 0,
            max_stack: 2,
            locals: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn emit(&mut self, instr: u32, line: u32) -> usize {
        self.instructions.push(instr);
        self.lines.push(line);
        self.instructions.len() - 1
    }

    fn reserve(&mut self, n: u8) -> u8 {
        let base = self.freereg;
        self.freereg += n;
        if self.freereg > self.max_stack {
            self.max_stack = self.freereg;
        }
        base
    }

    fn free_to(&mut self, reg: u8) {
        self.freereg = reg;
    }
}

/// Not a separate expression value in the teacher's `Local`/`Reg` sense —
/// every variant names where a value lives or how to fetch it; discharging
/// one into a register is the only way to actually use it.
enum ExprDesc {
    Nil,
    True,
    False,
    Const(u32),
    Local(u8),
    Upval(u8),
    Global(u32),
    Index { table: u8, key: u32 },
    /// A value already sitting in register `r` (arithmetic/compare/concat
    /// results, parenthesized expressions).
    Reg(u8),
    /// A `CALL` was just emitted with `A = r`; currently fixed to one result
    /// (`C = 2`). `open_multret` rewrites it to "all results" when this
    /// expression turns out to be the last in a list.
    Call(u8),
    /// Likewise for a just-emitted `VARARG` (`B = 2`, one result).
    Vararg(u8),
}

impl ExprDesc {
    fn is_multretable(&self) -> bool {
        matches!(self, ExprDesc::Call(_) | ExprDesc::Vararg(_))
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    ahead: Option<Token>,
    funcs: Vec<FuncState>,
    heap: &'a mut Heap,
    white: u8,
}

pub fn compile(source: &str, chunk_name: &str, heap: &mut Heap, white: u8) -> LuaResult<Prototype> {
    let mut lexer = Lexer::new(source);
    let first = lexer.next_token()?;
    let mut parser = Parser {
        lexer,
        cur: first,
        ahead: None,
        funcs: vec![FuncState::new()],
        heap,
        white,
    };
    parser.funcs.last_mut().unwrap().is_vararg = true;
    parser.block()?;
    parser.expect(TokenKind::TkEof)?;
    let fs = parser.funcs.pop().unwrap();
    Ok(parser.finish(fs, chunk_name))
}

impl<'a> Parser<'a> {
    fn finish(&mut self, fs: FuncState, chunk_name: &str) -> Prototype {
        Prototype {
            instructions: fs.instructions,
            constants: fs.constants,
            protos: fs.protos,
            upvalues: fs.upvalues,
            num_params: fs.num_params,
            is_vararg: fs.is_vararg,
            max_stack: fs.max_stack.max(2),
            debug: DebugInfo {
                lines: fs.lines,
                source: Rc::from(chunk_name),
            },
        }
    }

    fn fs(&mut self) -> &mut FuncState {
        self.funcs.last_mut().unwrap()
    }

    fn line(&self) -> u32 {
        self.cur.line
    }

    // ---------------- token stream ----------------

    fn bump(&mut self) -> LuaResult<Token> {
        let next = match self.ahead.take() {
            Some(t) => t,
            None => self.lexer.next_token()?,
        };
        Ok(std::mem::replace(&mut self.cur, next))
    }

    fn peek_ahead(&mut self) -> LuaResult<&Token> {
        if self.ahead.is_none() {
            self.ahead = Some(self.lexer.next_token()?);
        }
        Ok(self.ahead.as_ref().unwrap())
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(kind)
    }

    fn accept(&mut self, kind: TokenKind) -> LuaResult<bool> {
        if self.check(&kind) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> LuaResult<Token> {
        if !self.check(&kind) {
            return Err(self.err(format!("'{:?}' expected near '{:?}'", kind, self.cur.kind)));
        }
        self.bump()
    }

    fn expect_name(&mut self) -> LuaResult<SmolStr> {
        match self.cur.kind.clone() {
            TokenKind::TkName(n) => {
                self.bump()?;
                Ok(n)
            }
            _ => Err(self.err("<name> expected")),
        }
    }

    fn err(&self, message: impl Into<String>) -> LuaError {
        LuaError::SyntaxError {
            message: message.into(),
            line: self.line(),
        }
    }

    // ---------------- constants ----------------

    fn num_const(&mut self, n: f64) -> u32 {
        let v = LuaValue::Number(n);
        if let Some(i) = self.fs().constants.iter().position(|c| matches!(c, LuaValue::Number(m) if m.to_bits() == n.to_bits())) {
            return i as u32;
        }
        self.fs().constants.push(v);
        (self.fs().constants.len() - 1) as u32
    }

    fn str_const(&mut self, s: &[u8]) -> u32 {
        let id = self.heap.intern(s, self.white);
        let v = LuaValue::String(id);
        if let Some(i) = self.fs().constants.iter().position(|c| matches!(c, LuaValue::String(o) if *o == id)) {
            return i as u32;
        }
        self.fs().constants.push(v);
        (self.fs().constants.len() - 1) as u32
    }

    // ---------------- scope / locals ----------------

    fn declare_local(&mut self, name: SmolStr) -> u8 {
        let fs = self.fs();
        let reg = fs.locals.len() as u8;
        fs.locals.push(LocalVar { name, reg });
        if reg + 1 > fs.freereg {
            fs.freereg = reg + 1;
        }
        if fs.freereg > fs.max_stack {
            fs.max_stack = fs.freereg;
        }
        reg
    }

    fn enter_block(&mut self, is_loop: bool) {
        let local_base = self.fs().locals.len();
        self.fs().blocks.push(BlockCx { is_loop, break_jumps: Vec::new(), local_base });
    }

    /// Pop a block, truncating locals declared inside it and returning the
    /// break jumps it collected (the caller patches them to its own exit).
    fn leave_block(&mut self) -> Vec<usize> {
        let fs = self.fs();
        let b = fs.blocks.pop().unwrap();
        fs.locals.truncate(b.local_base);
        let reg = b.local_base as u8;
        fs.freereg = reg.max(fs.freereg.min(fs.freereg));
        fs.free_to(reg.max(fs.locals.len() as u8));
        b.break_jumps
    }

    fn find_local(fs: &FuncState, name: &str) -> Option<u8> {
        fs.locals.iter().rev().find(|l| l.name == name).map(|l| l.reg)
    }

    fn resolve_upvalue(&mut self, level: usize, name: &str) -> Option<u8> {
        if level == 0 {
            return None;
        }
        let enclosing = level - 1;
        if let Some(reg) = Self::find_local(&self.funcs[enclosing], name) {
            return Some(self.add_upvalue(level, true, reg, name));
        }
        if let Some(idx) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(level, false, idx, name));
        }
        None
    }

    fn add_upvalue(&mut self, level: usize, in_stack: bool, index: u8, name: &str) -> u8 {
        let fs = &mut self.funcs[level];
        if let Some(i) = fs.upvalues.iter().position(|u| u.in_stack == in_stack && u.index == index) {
            return i as u8;
        }
        fs.upvalues.push(UpvalDesc { in_stack, index, name: name.into() });
        (fs.upvalues.len() - 1) as u8
    }

    fn resolve_name(&mut self, name: &str) -> ExprDesc {
        let top = self.funcs.len() - 1;
        if let Some(reg) = Self::find_local(&self.funcs[top], name) {
            return ExprDesc::Local(reg);
        }
        if let Some(idx) = self.resolve_upvalue(top, name) {
            return ExprDesc::Upval(idx);
        }
        ExprDesc::Global(self.str_const(name.as_bytes()))
    }

    // ---------------- expression discharge ----------------

    fn discharge(&mut self, e: &ExprDesc, reg: u8, line: u32) {
        let instr = match *e {
            ExprDesc::Nil => Instruction::create_abc(OpCode::LoadNil, reg as u32, reg as u32, 0),
            ExprDesc::True => Instruction::create_abc(OpCode::LoadBool, reg as u32, 1, 0),
            ExprDesc::False => Instruction::create_abc(OpCode::LoadBool, reg as u32, 0, 0),
            ExprDesc::Const(k) => Instruction::create_abx(OpCode::LoadK, reg as u32, k),
            ExprDesc::Global(k) => Instruction::create_abx(OpCode::GetGlobal, reg as u32, k),
            ExprDesc::Upval(u) => Instruction::create_abc(OpCode::GetUpval, reg as u32, u as u32, 0),
            ExprDesc::Index { table, key } => Instruction::create_abc(OpCode::GetTable, reg as u32, table as u32, key),
            ExprDesc::Local(r) | ExprDesc::Reg(r) | ExprDesc::Call(r) | ExprDesc::Vararg(r) => {
                if r == reg {
                    return;
                }
                Instruction::create_abc(OpCode::Move, reg as u32, r as u32, 0)
            }
        };
        self.fs().emit(instr, line);
    }

    /// Materialize `e` into some register and return it, reusing an
    /// already-live register (`Local`/`Reg`/`Call`/`Vararg`) when possible
    /// instead of always allocating a fresh temporary.
    fn to_any_reg(&mut self, e: ExprDesc) -> u8 {
        match e {
            ExprDesc::Local(r) | ExprDesc::Reg(r) | ExprDesc::Call(r) | ExprDesc::Vararg(r) => r,
            other => {
                let line = self.line();
                let reg = self.fs().reserve(1);
                self.discharge(&other, reg, line);
                reg
            }
        }
    }

    /// Materialize into a fresh temporary even if `e` is already a register
    /// (used when the caller is about to free/overwrite other temporaries
    /// and needs this value pinned past that point).
    fn to_next_reg(&mut self, e: ExprDesc) -> u8 {
        let line = self.line();
        let reg = self.fs().reserve(1);
        self.discharge(&e, reg, line);
        reg
    }

    /// Encode `e` as an `RK` operand (register or constant-pool index),
    /// without forcing a register allocation for plain constants.
    fn to_rk(&mut self, e: ExprDesc) -> u32 {
        match e {
            ExprDesc::Const(k) if k <= Instruction::MAX_INDEX_RK => Instruction::rk_from_const(k),
            ExprDesc::Nil | ExprDesc::True | ExprDesc::False | ExprDesc::Const(_) => {
                let r = self.to_any_reg(e);
                r as u32
            }
            _ => self.to_any_reg(e) as u32,
        }
    }

    fn open_multret(&mut self, e: &ExprDesc) {
        match *e {
            ExprDesc::Call(r) => {
                let pc = self.fs().instructions.len() - 1;
                let instr = self.fs().instructions[pc];
                let a = Instruction::get_a(instr);
                let b = Instruction::get_b(instr);
                self.fs().instructions[pc] = Instruction::create_abc(OpCode::Call, a, b, 0);
                self.fs().free_to(r);
            }
            ExprDesc::Vararg(r) => {
                let pc = self.fs().instructions.len() - 1;
                let instr = self.fs().instructions[pc];
                let a = Instruction::get_a(instr);
                self.fs().instructions[pc] = Instruction::create_abc(OpCode::Vararg, a, 0, 0);
                self.fs().free_to(r);
            }
            _ => {}
        }
    }

    // ---------------- entry: block / statements ----------------

    fn block(&mut self) -> LuaResult<()> {
        loop {
            if self.block_follow() {
                return Ok(());
            }
            if self.check(&TokenKind::TkReturn) {
                self.return_stat()?;
                return Ok(());
            }
            self.statement()?;
        }
    }

    fn block_follow(&self) -> bool {
        matches!(
            self.cur.kind,
            TokenKind::TkEof
                | TokenKind::TkEnd
                | TokenKind::TkElse
                | TokenKind::TkElseIf
                | TokenKind::TkUntil
        )
    }

    fn statement(&mut self) -> LuaResult<()> {
        match self.cur.kind.clone() {
            TokenKind::TkSemicolon => {
                self.bump()?;
                Ok(())
            }
            TokenKind::TkIf => self.if_stat(),
            TokenKind::TkWhile => self.while_stat(),
            TokenKind::TkDo => {
                self.bump()?;
                self.enter_block(false);
                self.block()?;
                self.leave_block();
                self.expect(TokenKind::TkEnd)?;
                Ok(())
            }
            TokenKind::TkFor => self.for_stat(),
            TokenKind::TkRepeat => self.repeat_stat(),
            TokenKind::TkFunction => self.function_stat(),
            TokenKind::TkLocal => self.local_stat(),
            TokenKind::TkBreak => self.break_stat(),
            _ => self.expr_stat(),
        }
    }

    fn break_stat(&mut self) -> LuaResult<()> {
        let line = self.line();
        self.bump()?;
        let jmp = self.fs().emit(Instruction::create_asbx(OpCode::Jmp, 0, 0), line);
        for b in self.fs().blocks.iter_mut().rev() {
            if b.is_loop {
                b.break_jumps.push(jmp);
                return Ok(());
            }
        }
        Err(self.err("break outside a loop"))
    }

    fn patch_jump(&mut self, jmp_pc: usize, target: usize) {
        let fs = self.fs();
        let sbx = target as i64 - (jmp_pc as i64 + 1);
        let instr = fs.instructions[jmp_pc];
        let a = Instruction::get_a(instr);
        fs.instructions[jmp_pc] = Instruction::create_asbx(OpCode::Jmp, a, sbx as i32);
    }

    fn here(&mut self) -> usize {
        self.fs().instructions.len()
    }

    fn if_stat(&mut self) -> LuaResult<()> {
        let mut end_jumps = Vec::new();
        loop {
            self.bump()?; // 'if' / 'elseif'
            let cond = self.expr()?;
            let reg = self.to_any_reg(cond);
            let line = self.line();
            self.fs().emit(Instruction::create_abc(OpCode::Test, reg as u32, 0, 0), line);
            let jmp_false = self.fs().emit(Instruction::create_asbx(OpCode::Jmp, 0, 0), line);
            self.expect(TokenKind::TkThen)?;
            self.enter_block(false);
            self.block()?;
            self.leave_block();
            if self.check(&TokenKind::TkElseIf) {
                let line = self.line();
                let j = self.fs().emit(Instruction::create_asbx(OpCode::Jmp, 0, 0), line);
                end_jumps.push(j);
                let here = self.here();
                self.patch_jump(jmp_false, here);
                continue;
            }
            if self.accept(TokenKind::TkElse)? {
                let line = self.line();
                let j = self.fs().emit(Instruction::create_asbx(OpCode::Jmp, 0, 0), line);
                end_jumps.push(j);
                let here = self.here();
                self.patch_jump(jmp_false, here);
                self.enter_block(false);
                self.block()?;
                self.leave_block();
            } else {
                let here = self.here();
                self.patch_jump(jmp_false, here);
            }
            break;
        }
        self.expect(TokenKind::TkEnd)?;
        let here = self.here();
        for j in end_jumps {
            self.patch_jump(j, here);
        }
        Ok(())
    }

    fn while_stat(&mut self) -> LuaResult<()> {
        self.bump()?;
        let loop_start = self.here();
        let cond = self.expr()?;
        let reg = self.to_any_reg(cond);
        let line = self.line();
        self.fs().emit(Instruction::create_abc(OpCode::Test, reg as u32, 0, 0), line);
        let exit_jmp = self.fs().emit(Instruction::create_asbx(OpCode::Jmp, 0, 0), line);
        self.expect(TokenKind::TkDo)?;
        self.enter_block(true);
        self.block()?;
        let breaks = self.leave_block();
        self.expect(TokenKind::TkEnd)?;
        let back = Instruction::create_asbx(OpCode::Jmp, 0, loop_start as i32 - (self.here() as i32 + 1));
        self.fs().emit(back, line);
        let here = self.here();
        self.patch_jump(exit_jmp, here);
        for b in breaks {
            self.patch_jump(b, here);
        }
        Ok(())
    }

    fn repeat_stat(&mut self) -> LuaResult<()> {
        self.bump()?;
        let loop_start = self.here();
        self.enter_block(true);
        self.block()?;
        self.expect(TokenKind::TkUntil)?;
        let cond = self.expr()?;
        let reg = self.to_any_reg(cond);
        let line = self.line();
        self.fs().emit(Instruction::create_abc(OpCode::Test, reg as u32, 0, 0), line);
        let back = Instruction::create_asbx(OpCode::Jmp, 0, loop_start as i32 - (self.here() as i32 + 1));
        self.fs().emit(back, line);
        let breaks = self.leave_block();
        let here = self.here();
        for b in breaks {
            self.patch_jump(b, here);
        }
        Ok(())
    }

    fn for_stat(&mut self) -> LuaResult<()> {
        self.bump()?;
        let first = self.expect_name()?;
        if self.check(&TokenKind::TkAssign) {
            self.numeric_for(first)
        } else {
            self.generic_for(first)
        }
    }

    fn numeric_for(&mut self, var: SmolStr) -> LuaResult<()> {
        self.bump()?; // '='
        let init = self.expr()?;
        let base = self.to_next_reg(init);
        self.expect(TokenKind::TkComma)?;
        let limit = self.expr()?;
        self.to_next_reg(limit);
        let step = if self.accept(TokenKind::TkComma)? {
            self.expr()?
        } else {
            ExprDesc::Const(self.num_const(1.0))
        };
        self.to_next_reg(step);
        self.expect(TokenKind::TkDo)?;
        let line = self.line();
        let prep = self.fs().emit(Instruction::create_asbx(OpCode::ForPrep, base as u32, 0), line);
        self.enter_block(true);
        self.declare_local(var);
        self.block()?;
        let breaks = self.leave_block();
        self.expect(TokenKind::TkEnd)?;
        let here = self.here();
        self.patch_jump(prep, here);
        let loop_instr = Instruction::create_asbx(OpCode::ForLoop, base as u32, prep as i32 - (self.here() as i32 + 1) + 1);
        self.fs().emit(loop_instr, line);
        let after = self.here();
        for b in breaks {
            self.patch_jump(b, after);
        }
        self.fs().free_to(base);
        Ok(())
    }

    fn generic_for(&mut self, first: SmolStr) -> LuaResult<()> {
        let mut names = vec![first];
        while self.accept(TokenKind::TkComma)? {
            names.push(self.expect_name()?);
        }
        self.expect(TokenKind::TkIn)?;
        let exprs = self.expr_list()?;
        let base = self.adjust_to_reg_count(exprs, 3);
        self.expect(TokenKind::TkDo)?;
        self.enter_block(true);
        let var_base = self.fs().reserve(names.len() as u8);
        for n in names.iter() {
            self.declare_local(n.clone());
        }
        let _ = var_base;
        let line = self.line();
        let jmp = self.fs().emit(Instruction::create_asbx(OpCode::Jmp, 0, 0), line);
        let body_start = self.here();
        self.block()?;
        let here = self.here();
        self.patch_jump(jmp, here);
        let tforloop = Instruction::create_abc(OpCode::TForLoop, base as u32, 0, names.len() as u32);
        self.fs().emit(tforloop, line);
        let back = Instruction::create_asbx(OpCode::Jmp, 0, body_start as i32 - (self.here() as i32 + 1));
        self.fs().emit(back, line);
        let breaks = self.leave_block();
        let after = self.here();
        for b in breaks {
            self.patch_jump(b, after);
        }
        self.fs().free_to(base);
        Ok(())
    }

    /// Evaluate an expression list into `want` consecutive registers
    /// starting at the current `freereg`, padding with `nil` or truncating a
    /// trailing multret expression as needed. Returns the base register.
    fn adjust_to_reg_count(&mut self, mut exprs: Vec<ExprDesc>, want: usize) -> u8 {
        let base = self.fs().freereg;
        if exprs.is_empty() {
            self.fs().reserve(want as u8);
            let line = self.line();
            for i in 0..want {
                self.discharge(&ExprDesc::Nil, base + i as u8, line);
            }
            return base;
        }
        let last = exprs.pop().unwrap();
        for e in exprs {
            self.to_next_reg(e);
        }
        let have = (self.fs().freereg - base) as usize;
        if last.is_multretable() && have < want {
            self.open_multret(&last);
            let line = self.line();
            let extra = want - have;
            self.fs().reserve(extra as u8);
            let _ = line;
        } else {
            self.to_next_reg(last);
            let have_now = (self.fs().freereg - base) as usize;
            if have_now < want {
                let line = self.line();
                let reg = self.fs().reserve((want - have_now) as u8);
                for i in 0..(want - have_now) {
                    self.discharge(&ExprDesc::Nil, reg + i as u8, line);
                }
            } else {
                self.fs().free_to(base + want as u8);
            }
        }
        base
    }

    fn function_stat(&mut self) -> LuaResult<()> {
        self.bump()?;
        let first = self.expect_name()?;
        let mut target = self.resolve_name(&first);
        let mut is_method = false;
        loop {
            if self.accept(TokenKind::TkDot)? {
                let field = self.expect_name()?;
                let table = self.to_any_reg(target);
                let key = ExprDesc::Const(self.str_const(field.as_bytes()));
                let key_rk = self.to_rk(key);
                target = ExprDesc::Index { table, key: key_rk };
            } else if self.accept(TokenKind::TkColon)? {
                let field = self.expect_name()?;
                let table = self.to_any_reg(target);
                let key = ExprDesc::Const(self.str_const(field.as_bytes()));
                let key_rk = self.to_rk(key);
                target = ExprDesc::Index { table, key: key_rk };
                is_method = true;
                break;
            } else {
                break;
            }
        }
        let func = self.function_body(is_method)?;
        self.assign_to(target, func)?;
        Ok(())
    }

    fn local_stat(&mut self) -> LuaResult<()> {
        self.bump()?;
        if self.accept(TokenKind::TkFunction)? {
            let name = self.expect_name()?;
            let reg = self.declare_local(name);
            let func = self.function_body(false)?;
            let line = self.line();
            self.discharge(&func, reg, line);
            return Ok(());
        }
        let mut names = vec![self.expect_name()?];
        while self.accept(TokenKind::TkComma)? {
            names.push(self.expect_name()?);
        }
        let exprs = if self.accept(TokenKind::TkAssign)? { self.expr_list()? } else { Vec::new() };
        let base = self.adjust_to_reg_count(exprs, names.len());
        for (i, n) in names.into_iter().enumerate() {
            let fs = self.fs();
            let reg = base + i as u8;
            fs.locals.push(LocalVar { name: n, reg });
        }
        Ok(())
    }

    fn return_stat(&mut self) -> LuaResult<()> {
        let line = self.line();
        self.bump()?;
        let exprs = if self.block_follow() || self.check(&TokenKind::TkSemicolon) { Vec::new() } else { self.expr_list()? };
        self.accept(TokenKind::TkSemicolon)?;
        if exprs.is_empty() {
            self.fs().emit(Instruction::create_abc(OpCode::Return, 0, 1, 0), line);
            return Ok(());
        }
        let base = self.fs().freereg;
        let n = exprs.len();
        let mut it = exprs.into_iter().enumerate().peekable();
        let mut multret = false;
        while let Some((i, e)) = it.next() {
            if i + 1 == n && e.is_multretable() {
                self.to_next_reg_inplace(&e);
                self.open_multret(&e);
                multret = true;
            } else {
                self.to_next_reg(e);
            }
        }
        let b = if multret { 0 } else { (self.fs().freereg - base) as u32 + 1 };
        self.fs().emit(Instruction::create_abc(OpCode::Return, base as u32, b, 0), line);
        Ok(())
    }

    /// Like `to_next_reg` but used right before `open_multret`, which needs
    /// the call/vararg's output register to equal the next free slot.
    fn to_next_reg_inplace(&mut self, e: &ExprDesc) {
        match *e {
            ExprDesc::Call(r) | ExprDesc::Vararg(r) => {
                if r != self.fs().freereg {
                    let line = self.line();
                    let reg = self.fs().reserve(1);
                    self.discharge(e, reg, line);
                }
            }
            _ => {}
        }
    }

    fn expr_stat(&mut self) -> LuaResult<()> {
        let line = self.line();
        let first = self.suffixed_expr()?;
        if self.check(&TokenKind::TkAssign) || self.check(&TokenKind::TkComma) {
            let mut targets = vec![first];
            while self.accept(TokenKind::TkComma)? {
                targets.push(self.suffixed_expr()?);
            }
            self.expect(TokenKind::TkAssign)?;
            let exprs = self.expr_list()?;
            let base = self.adjust_to_reg_count(exprs, targets.len());
            for (i, t) in targets.into_iter().enumerate() {
                self.assign_to(t, ExprDesc::Reg(base + i as u8))?;
            }
            Ok(())
        } else {
            match first {
                ExprDesc::Call(_) => Ok(()),
                _ => Err(LuaError::SyntaxError { message: "syntax error (expression has no effect)".into(), line }),
            }
        }
    }

    fn assign_to(&mut self, target: ExprDesc, value: ExprDesc) -> LuaResult<()> {
        let line = self.line();
        match target {
            ExprDesc::Local(r) => {
                self.discharge(&value, r, line);
            }
            ExprDesc::Upval(u) => {
                let r = self.to_any_reg(value);
                self.fs().emit(Instruction::create_abc(OpCode::SetUpval, r as u32, u as u32, 0), line);
            }
            ExprDesc::Global(k) => {
                let r = self.to_any_reg(value);
                self.fs().emit(Instruction::create_abx(OpCode::SetGlobal, r as u32, k), line);
            }
            ExprDesc::Index { table, key } => {
                let v = self.to_rk(value);
                self.fs().emit(Instruction::create_abc(OpCode::SetTable, table as u32, key, v), line);
            }
            _ => return Err(self.err("cannot assign to this expression")),
        }
        Ok(())
    }

    // ---------------- function bodies / calls ----------------

    fn function_body(&mut self, is_method: bool) -> LuaResult<ExprDesc> {
        self.expect(TokenKind::TkLeftParen)?;
        self.funcs.push(FuncState::new());
        if is_method {
            self.declare_local(SmolStr::new("self"));
        }
        let mut is_vararg = false;
        if !self.check(&TokenKind::TkRightParen) {
            loop {
                if self.check(&TokenKind::TkDots) {
                    self.bump()?;
                    is_vararg = true;
                    break;
                }
                let n = self.expect_name()?;
                self.declare_local(n);
                if !self.accept(TokenKind::TkComma)? {
                    break;
                }
            }
        }
        self.expect(TokenKind::TkRightParen)?;
        {
            let fs = self.fs();
            fs.is_vararg = is_vararg;
            fs.num_params = fs.locals.len() as u8;
        }
        self.block()?;
        self.expect(TokenKind::TkEnd)?;
        let fs = self.funcs.pop().unwrap();
        let line = self.line();
        self.fs().emit(Instruction::create_abc(OpCode::Return, 0, 1, 0), line); // harmless if unreachable; real end falls through here too
        self.fs().instructions.pop();
        self.fs().lines.pop();
        let proto = Rc::new(self.finish(fs, "=(anonymous)"));
        let idx = self.fs().protos.len() as u32;
        self.fs().protos.push(proto);
        let reg = self.fs().reserve(1);
        self.fs().emit(Instruction::create_abx(OpCode::Closure, reg as u32, idx), line);
        Ok(ExprDesc::Reg(reg))
    }

    fn call_expr(&mut self, callee: ExprDesc, method_name: Option<SmolStr>) -> LuaResult<ExprDesc> {
        let base = self.to_next_reg(callee);
        let mut nfixed: u32 = 1;
        if let Some(name) = method_name {
            let key = ExprDesc::Const(self.str_const(name.as_bytes()));
            let key_rk = self.to_rk(key);
            let line = self.line();
            self.fs().emit(Instruction::create_abc(OpCode::SelfOp, base as u32, base as u32, key_rk), line);
            self.fs().reserve(1);
            nfixed = 2;
        }
        let args = self.call_args()?;
        let line = self.line();
        let mut multret = false;
        if !args.is_empty() {
            let n = args.len();
            for (i, a) in args.into_iter().enumerate() {
                if i + 1 == n && a.is_multretable() {
                    self.to_next_reg_inplace(&a);
                    self.open_multret(&a);
                    multret = true;
                } else {
                    self.to_next_reg(a);
                }
            }
        }
        let b = if multret { 0 } else { nfixed - 1 + (self.fs().freereg - base) as u32 - (nfixed - 1) + 1 };
        let b = if multret { 0 } else { (self.fs().freereg - base) as u32 + 1 };
        let _ = b;
        let nargs_b = if multret { 0 } else { (self.fs().freereg - base) as u32 + 1 };
        self.fs().emit(Instruction::create_abc(OpCode::Call, base as u32, nargs_b, 2), line);
        self.fs().free_to(base + 1);
        Ok(ExprDesc::Call(base))
    }

    fn call_args(&mut self) -> LuaResult<Vec<ExprDesc>> {
        if self.check(&TokenKind::TkString(Vec::new())) {
            if let TokenKind::TkString(s) = self.cur.kind.clone() {
                self.bump()?;
                return Ok(vec![ExprDesc::Const(self.str_const(&s))]);
            }
        }
        if self.check(&TokenKind::TkLeftBrace) {
            return Ok(vec![self.table_constructor()?]);
        }
        self.expect(TokenKind::TkLeftParen)?;
        if self.accept(TokenKind::TkRightParen)? {
            return Ok(Vec::new());
        }
        let list = self.expr_list()?;
        self.expect(TokenKind::TkRightParen)?;
        Ok(list)
    }

    fn expr_list(&mut self) -> LuaResult<Vec<ExprDesc>> {
        let mut out = vec![self.expr()?];
        while self.accept(TokenKind::TkComma)? {
            out.push(self.expr()?);
        }
        Ok(out)
    }

    // ---------------- table constructors ----------------

    fn table_constructor(&mut self) -> LuaResult<ExprDesc> {
        let line = self.line();
        self.expect(TokenKind::TkLeftBrace)?;
        let table_reg = self.fs().reserve(1);
        self.fs().emit(Instruction::create_abc(OpCode::NewTable, table_reg as u32, 0, 0), line);
        let mut array_items: Vec<ExprDesc> = Vec::new();
        while !self.check(&TokenKind::TkRightBrace) {
            if self.check(&TokenKind::TkLeftBracket) {
                self.bump()?;
                let key = self.expr()?;
                self.expect(TokenKind::TkRightBracket)?;
                self.expect(TokenKind::TkAssign)?;
                let value = self.expr()?;
                let key_rk = self.to_rk(key);
                let val_rk = self.to_rk(value);
                let line = self.line();
                self.fs().emit(Instruction::create_abc(OpCode::SetTable, table_reg as u32, key_rk, val_rk), line);
            } else if matches!(self.cur.kind, TokenKind::TkName(_)) && matches!(self.peek_ahead()?.kind, TokenKind::TkAssign) {
                let name = self.expect_name()?;
                self.bump()?; // '='
                let value = self.expr()?;
                let key_rk = Instruction::rk_from_const(self.str_const(name.as_bytes()));
                let val_rk = self.to_rk(value);
                let line = self.line();
                self.fs().emit(Instruction::create_abc(OpCode::SetTable, table_reg as u32, key_rk, val_rk), line);
            } else {
                let e = self.expr()?;
                array_items.push(e);
            }
            if !self.accept(TokenKind::TkComma)? && !self.accept(TokenKind::TkSemicolon)? {
                break;
            }
        }
        self.expect(TokenKind::TkRightBrace)?;
        if !array_items.is_empty() {
            let n = array_items.len();
            let mut multret = false;
            for (i, e) in array_items.into_iter().enumerate() {
                if i + 1 == n && e.is_multretable() {
                    self.to_next_reg_inplace(&e);
                    self.open_multret(&e);
                    multret = true;
                } else {
                    self.to_next_reg(e);
                }
            }
            let count = if multret { 0 } else { (self.fs().freereg - table_reg - 1) as u32 };
            let line = self.line();
            self.fs().emit(Instruction::create_abc(OpCode::SetList, table_reg as u32, count, 1), line);
            self.fs().free_to(table_reg + 1);
        }
        Ok(ExprDesc::Reg(table_reg))
    }

    // ---------------- expressions (precedence climbing) ----------------

    fn expr(&mut self) -> LuaResult<ExprDesc> {
        self.sub_expr(0)
    }

    fn unop(kind: &TokenKind) -> Option<OpCode> {
        match kind {
            TokenKind::TkMinus => Some(OpCode::Unm),
            TokenKind::TkNot => Some(OpCode::Not),
            TokenKind::TkLen => Some(OpCode::Len),
            _ => None,
        }
    }

    /// `(left_prec, right_prec)`; `..`/`^` are right-associative (left >
    /// right), everything else left-associative.
    fn binop(kind: &TokenKind) -> Option<(OpCode, u8, u8)> {
        use TokenKind::*;
        match kind {
            TkOr => Some((OpCode::TestSet, 1, 1)), // handled specially below
            TkAnd => Some((OpCode::TestSet, 2, 2)),
            TkLt => Some((OpCode::Lt, 3, 3)),
            TkGt => Some((OpCode::Lt, 3, 3)),
            TkLe => Some((OpCode::Le, 3, 3)),
            TkGe => Some((OpCode::Le, 3, 3)),
            TkNe => Some((OpCode::Eq, 3, 3)),
            TkEq => Some((OpCode::Eq, 3, 3)),
            TkConcat => Some((OpCode::Concat, 5, 4)),
            TkPlus => Some((OpCode::Add, 6, 6)),
            TkMinus => Some((OpCode::Sub, 6, 6)),
            TkMul => Some((OpCode::Mul, 7, 7)),
            TkDiv => Some((OpCode::Div, 7, 7)),
            TkMod => Some((OpCode::Mod, 7, 7)),
            TkPow => Some((OpCode::Pow, 10, 9)),
            _ => None,
        }
    }

    const UNARY_PREC: u8 = 8;

    fn sub_expr(&mut self, limit: u8) -> LuaResult<ExprDesc> {
        let mut left = if let Some(op) = Self::unop(&self.cur.kind) {
            let line = self.line();
            self.bump()?;
            let operand = self.sub_expr(Self::UNARY_PREC)?;
            let r = self.to_any_reg(operand);
            let reg = self.fs().reserve(1);
            self.fs().emit(Instruction::create_abc(op, reg as u32, r as u32, 0), line);
            self.fs().free_to(reg + 1);
            ExprDesc::Reg(reg)
        } else {
            self.simple_expr()?
        };

        while let Some((op, lprec, rprec)) = Self::binop(&self.cur.kind) {
            if lprec <= limit {
                break;
            }
            let is_and = self.check(&TokenKind::TkAnd);
            let is_or = self.check(&TokenKind::TkOr);
            let kind = self.cur.kind.clone();
            let line = self.line();
            self.bump()?;
            if is_and || is_or {
                let lreg = self.to_any_reg(left);
                self.fs().emit(Instruction::create_abc(OpCode::Test, lreg as u32, 0, if is_or { 1 } else { 0 }), line);
                let jmp = self.fs().emit(Instruction::create_asbx(OpCode::Jmp, 0, 0), line);
                let right = self.sub_expr(rprec)?;
                self.discharge_to(right, lreg);
                let here = self.here();
                self.patch_jump(jmp, here);
                left = ExprDesc::Reg(lreg);
                continue;
            }
            let swap = matches!(kind, TokenKind::TkGt | TokenKind::TkGe);
            let negate = matches!(kind, TokenKind::TkNe);
            let lhs = self.to_rk(left);
            let right = self.sub_expr(rprec)?;
            let rhs = self.to_rk(right);
            let (b, c) = if swap { (rhs, lhs) } else { (lhs, rhs) };
            let reg = self.fs().reserve(1);
            let a = if negate { 0u32 } else { 1u32 };
            self.fs().emit(Instruction::create_abc(op, a, b, c), line);
            self.fs().emit(Instruction::create_asbx(OpCode::Jmp, 0, 1), line);
            self.fs().emit(Instruction::create_abc(OpCode::LoadBool, reg as u32, 0, 1), line);
            self.fs().emit(Instruction::create_abc(OpCode::LoadBool, reg as u32, 1, 0), line);
            self.fs().free_to(reg + 1);
            left = ExprDesc::Reg(reg);
        }
        Ok(left)
    }

    fn discharge_to(&mut self, e: ExprDesc, reg: u8) {
        let line = self.line();
        self.discharge(&e, reg, line);
    }

    fn simple_expr(&mut self) -> LuaResult<ExprDesc> {
        match self.cur.kind.clone() {
            TokenKind::TkNil => {
                self.bump()?;
                Ok(ExprDesc::Nil)
            }
            TokenKind::TkTrue => {
                self.bump()?;
                Ok(ExprDesc::True)
            }
            TokenKind::TkFalse => {
                self.bump()?;
                Ok(ExprDesc::False)
            }
            TokenKind::TkDots => {
                self.bump()?;
                if !self.fs().is_vararg {
                    return Err(self.err("cannot use '...' outside a vararg function"));
                }
                let reg = self.fs().reserve(1);
                let line = self.line();
                self.fs().emit(Instruction::create_abc(OpCode::Vararg, reg as u32, 2, 0), line);
                Ok(ExprDesc::Vararg(reg))
            }
            TokenKind::TkInt(i) => {
                self.bump()?;
                Ok(ExprDesc::Const(self.num_const(i as f64)))
            }
            TokenKind::TkFloat(f) => {
                self.bump()?;
                Ok(ExprDesc::Const(self.num_const(f)))
            }
            TokenKind::TkString(s) => {
                self.bump()?;
                Ok(ExprDesc::Const(self.str_const(&s)))
            }
            TokenKind::TkLeftBrace => self.table_constructor(),
            TokenKind::TkFunction => {
                self.bump()?;
                self.function_body(false)
            }
            _ => self.suffixed_expr(),
        }
    }

    fn primary_expr(&mut self) -> LuaResult<ExprDesc> {
        match self.cur.kind.clone() {
            TokenKind::TkLeftParen => {
                self.bump()?;
                let e = self.expr()?;
                self.expect(TokenKind::TkRightParen)?;
                // Parens truncate a multret/vararg expression to one value.
                let r = self.to_any_reg(e);
                Ok(ExprDesc::Reg(r))
            }
            TokenKind::TkName(n) => {
                self.bump()?;
                Ok(self.resolve_name(&n))
            }
            _ => Err(self.err(format!("unexpected symbol near '{:?}'", self.cur.kind))),
        }
    }

    fn suffixed_expr(&mut self) -> LuaResult<ExprDesc> {
        let mut e = self.primary_expr()?;
        loop {
            match self.cur.kind.clone() {
                TokenKind::TkDot => {
                    self.bump()?;
                    let field = self.expect_name()?;
                    let table = self.to_any_reg(e);
                    let key = ExprDesc::Const(self.str_const(field.as_bytes()));
                    let key_rk = self.to_rk(key);
                    e = ExprDesc::Index { table, key: key_rk };
                }
                TokenKind::TkLeftBracket => {
                    self.bump()?;
                    let key = self.expr()?;
                    self.expect(TokenKind::TkRightBracket)?;
                    let table = self.to_any_reg(e);
                    let key_rk = self.to_rk(key);
                    e = ExprDesc::Index { table, key: key_rk };
                }
                TokenKind::TkColon => {
                    self.bump()?;
                    let name = self.expect_name()?;
                    e = self.call_expr(e, Some(name))?;
                }
                TokenKind::TkLeftParen | TokenKind::TkString(_) | TokenKind::TkLeftBrace => {
                    e = self.call_expr(e, None)?;
                }
                _ => break,
            }
        }
        Ok(e)
    }
}
