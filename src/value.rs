//! The tagged `LuaValue` union and its raw (metamethod-free) operations.
//!
//! Modeled on the teacher's `TValue`, but collapsed to Lua 5.1's single numeric
//! type (no integer/float subtype split) and reworked as a plain Rust enum
//! instead of a C-style `union` + tag byte: heap-resident variants carry an
//! arena index (`*Id`) rather than a pointer, so a `LuaValue` is `Copy` and
//! stays valid across a GC step without the collector ever dereferencing it
//! directly.

use crate::gc::{FunctionId, Heap, StringId, TableId, ThreadId, UserdataId};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug)]
pub enum LuaValue {
    Nil,
    Boolean(bool),
    Number(f64),
    /// Light userdata: a host-opaque tag, not heap-managed, no metatable.
    LightUserdata(u64),
    String(StringId),
    Table(TableId),
    Function(FunctionId),
    Userdata(UserdataId),
    Thread(ThreadId),
}

impl LuaValue {
    #[inline]
    pub fn boolean(b: bool) -> Self {
        LuaValue::Boolean(b)
    }

    #[inline]
    pub fn integer(i: i64) -> Self {
        LuaValue::Number(i as f64)
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    #[inline]
    pub fn is_boolean(&self) -> bool {
        matches!(self, LuaValue::Boolean(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, LuaValue::String(_))
    }

    #[inline]
    pub fn is_table(&self) -> bool {
        matches!(self, LuaValue::Table(_))
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, LuaValue::Function(_))
    }

    #[inline]
    pub fn is_userdata(&self) -> bool {
        matches!(self, LuaValue::Userdata(_) | LuaValue::LightUserdata(_))
    }

    #[inline]
    pub fn is_thread(&self) -> bool {
        matches!(self, LuaValue::Thread(_))
    }

    /// Lua truthiness: everything but `nil` and `false` is true.
    #[inline]
    pub fn truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// A key that can index the array part: a `Number` holding an exact,
    /// positive integral value representable in `i64`.
    #[inline]
    pub fn as_array_index(&self) -> Option<i64> {
        match self {
            LuaValue::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                let i = *n as i64;
                if i as f64 == *n { Some(i) } else { None }
            }
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Boolean(_) => "boolean",
            LuaValue::Number(_) => "number",
            LuaValue::String(_) => "string",
            LuaValue::Table(_) => "table",
            LuaValue::Function(_) => "function",
            LuaValue::Userdata(_) | LuaValue::LightUserdata(_) => "userdata",
            LuaValue::Thread(_) => "thread",
        }
    }

    /// Raw equality: identity for heap objects (interning makes this correct
    /// for strings too), IEEE-754 for numbers (`NaN != NaN`), always false
    /// across differing types.
    pub fn raw_equal(&self, other: &LuaValue) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::LightUserdata(a), LuaValue::LightUserdata(b)) => a == b,
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => a == b,
            (LuaValue::Function(a), LuaValue::Function(b)) => a == b,
            (LuaValue::Userdata(a), LuaValue::Userdata(b)) => a == b,
            (LuaValue::Thread(a), LuaValue::Thread(b)) => a == b,
            _ => false,
        }
    }

    /// Attempt `to_number` coercion, including the numeric-string conversion
    /// Lua allows in arithmetic contexts (not in raw equality).
    pub fn to_number(&self, heap: &Heap) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            LuaValue::String(id) => parse_lua_number(heap.string_bytes(*id)),
            _ => None,
        }
    }

    /// `%.14g`-style formatting for numbers; `"<type>: 0x<addr>"` for
    /// everything else that isn't a string (strings format to their bytes).
    pub fn to_display_string(&self, heap: &Heap) -> String {
        match self {
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Number(n) => format_number(*n),
            LuaValue::String(id) => String::from_utf8_lossy(heap.string_bytes(*id)).into_owned(),
            LuaValue::Table(id) => format!("table: 0x{:08x}", id.0),
            LuaValue::Function(id) => format!("function: 0x{:08x}", id.0),
            LuaValue::Userdata(id) => format!("userdata: 0x{:08x}", id.0),
            LuaValue::LightUserdata(p) => format!("userdata: 0x{:08x}", p),
            LuaValue::Thread(id) => format!("thread: 0x{:08x}", id.0),
        }
    }

    /// Ordering for `<`/`<=` on two numbers (string ordering handled by the
    /// caller, which knows whether both operands are strings).
    pub fn number_partial_cmp(a: f64, b: f64) -> Option<Ordering> {
        a.partial_cmp(&b)
    }
}

/// Format a Lua number the way `%.14g` would: integral floats print without a
/// decimal point, everything else prints with up to 14 significant digits and
/// trailing zeros stripped, matching Lua 5.1's `LUAI_NUMFMT`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n == n.trunc() && n.abs() < 1e15 {
        let mut buf = itoa::Buffer::new();
        return buf.format(n as i64).to_string();
    }
    let mut s = format!("{:.14e}", n);
    // Reconstruct a %g-like rendering from %.14e: trim to 14 significant
    // digits, then prefer plain decimal notation unless the magnitude is
    // extreme, matching glibc's printf("%.14g", n).
    if let Ok(parsed) = format!("{:.13e}", n).parse::<f64>() {
        s = format_g(parsed, 14);
    }
    s
}

fn format_g(n: f64, sig: usize) -> String {
    let exp = if n == 0.0 { 0 } else { n.abs().log10().floor() as i32 };
    if exp < -4 || exp >= sig as i32 {
        let s = format!("{:.*e}", sig.saturating_sub(1), n);
        return trim_exponential(&s);
    }
    let decimals = (sig as i32 - 1 - exp).max(0) as usize;
    let s = format!("{:.*}", decimals, n);
    trim_trailing_zeros(&s)
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0');
    trimmed.trim_end_matches('.').to_string()
}

fn trim_exponential(s: &str) -> String {
    if let Some(pos) = s.find(['e', 'E']) {
        let (mantissa, exp) = s.split_at(pos);
        format!("{}{}", trim_trailing_zeros(mantissa), exp)
    } else {
        s.to_string()
    }
}

/// Parse a Lua numeric literal/coercion string: optional surrounding
/// whitespace, optional sign, decimal or `0x`-prefixed hex.
pub fn parse_lua_number(bytes: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(bytes).ok()?.trim();
    if s.is_empty() {
        return None;
    }
    let (sign, rest) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if rest.len() > 2 && (rest.starts_with("0x") || rest.starts_with("0X")) {
        return i64::from_str_radix(&rest[2..], 16)
            .ok()
            .map(|v| sign * v as f64)
            .or_else(|| u64::from_str_radix(&rest[2..], 16).ok().map(|v| sign * v as f64));
    }
    rest.parse::<f64>().ok().map(|v| sign * v)
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

/// Bit-pattern based `Hash`/`Eq` for use as a table hash-part key. Lua forbids
/// `NaN` keys, so the only subtlety is normalizing `-0.0` to `0.0` so it hashes
/// and compares identically to positive zero, matching `0.0 == -0.0`.
impl std::hash::Hash for LuaValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            LuaValue::Nil => {}
            LuaValue::Boolean(b) => b.hash(state),
            LuaValue::Number(n) => {
                let canon = if *n == 0.0 { 0.0_f64 } else { *n };
                canon.to_bits().hash(state)
            }
            LuaValue::LightUserdata(p) => p.hash(state),
            LuaValue::String(id) => id.0.hash(state),
            LuaValue::Table(id) => id.0.hash(state),
            LuaValue::Function(id) => id.0.hash(state),
            LuaValue::Userdata(id) => id.0.hash(state),
            LuaValue::Thread(id) => id.0.hash(state),
        }
    }
}

impl Eq for LuaValue {}
