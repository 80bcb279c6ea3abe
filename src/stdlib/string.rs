//! `string` library: byte-indexed (not UTF-8 aware, matching Lua 5.1's own
//! byte-string semantics) plus the Lua pattern engine for `find`/`match`/
//! `gmatch`/`gsub`.

use crate::stdlib::helpers::*;
use crate::stdlib::lua_pattern::{self, CapValue};
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};

pub fn open(vm: &mut LuaVM) {
    let lib = new_lib_table(vm, "string");
    register(vm, lib, "len", l_len);
    register(vm, lib, "sub", l_sub);
    register(vm, lib, "upper", l_upper);
    register(vm, lib, "lower", l_lower);
    register(vm, lib, "rep", l_rep);
    register(vm, lib, "reverse", l_reverse);
    register(vm, lib, "byte", l_byte);
    register(vm, lib, "char", l_char);
    register(vm, lib, "format", l_format);
    register(vm, lib, "find", l_find);
    register(vm, lib, "match", l_match);
    register(vm, lib, "gmatch", l_gmatch);
    register(vm, lib, "gsub", l_gsub);

    // Install `string` as the metatable for every string value (`__index =
    // string`), the way Lua 5.1 wires up method-call syntax (`s:upper()`).
    let mt = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let index_key = vm.new_string("__index");
    vm.raw_set(mt, index_key, LuaValue::Table(lib));
    vm.string_metatable = Some(mt);
}

/// Lua's 1-based, negative-from-end string index, clamped into `[0, len]`.
fn str_index(i: i64, len: usize) -> usize {
    if i >= 0 {
        i as usize
    } else {
        (len as i64 + i + 1).max(0) as usize
    }
}

fn l_len(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "len")?;
    Ok(push_result(vm, nargs, &[LuaValue::integer(s.len() as i64)]))
}

fn l_sub(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "sub")?;
    let len = s.len();
    let i = opt_int(vm, nargs, 1, "sub", 1)?;
    let j = opt_int(vm, nargs, 2, "sub", -1)?;
    let mut start = str_index(i, len).max(1);
    let end = str_index(j, len).min(len);
    if start < 1 {
        start = 1;
    }
    let out = if start > end { Vec::new() } else { s[start - 1..end].to_vec() };
    let v = vm.heap.intern(&out, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn l_upper(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "upper")?;
    let out: Vec<u8> = s.iter().map(|b| b.to_ascii_uppercase()).collect();
    let v = vm.heap.intern(&out, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn l_lower(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "lower")?;
    let out: Vec<u8> = s.iter().map(|b| b.to_ascii_lowercase()).collect();
    let v = vm.heap.intern(&out, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn l_rep(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "rep")?;
    let n = check_int(vm, nargs, 1, "rep")?.max(0) as usize;
    let out = s.repeat(n);
    let v = vm.heap.intern(&out, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn l_reverse(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let mut s = check_string(vm, nargs, 0, "reverse")?;
    s.reverse();
    let v = vm.heap.intern(&s, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn l_byte(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "byte")?;
    let len = s.len();
    let i = opt_int(vm, nargs, 1, "byte", 1)?;
    let j = opt_int(vm, nargs, 2, "byte", i)?;
    let start = str_index(i, len).max(1);
    let end = str_index(j, len).min(len);
    if start > end {
        return Ok(push_result(vm, nargs, &[]));
    }
    let values: Vec<LuaValue> = s[start - 1..end].iter().map(|b| LuaValue::integer(*b as i64)).collect();
    Ok(push_result(vm, nargs, &values))
}

fn l_char(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let mut bytes = Vec::with_capacity(nargs);
    for i in 0..nargs {
        bytes.push(check_int(vm, nargs, i, "char")? as u8);
    }
    let v = vm.heap.intern(&bytes, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn l_format(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let fmt = check_string(vm, nargs, 0, "format")?;
    let mut out = Vec::new();
    let mut argi = 1;
    let mut i = 0;
    while i < fmt.len() {
        if fmt[i] != b'%' {
            out.push(fmt[i]);
            i += 1;
            continue;
        }
        i += 1;
        if fmt.get(i) == Some(&b'%') {
            out.push(b'%');
            i += 1;
            continue;
        }
        let spec_start = i;
        while matches!(fmt.get(i), Some(b'-' | b'+' | b' ' | b'#' | b'0')) {
            i += 1;
        }
        while matches!(fmt.get(i), Some(b) if b.is_ascii_digit()) {
            i += 1;
        }
        if fmt.get(i) == Some(&b'.') {
            i += 1;
            while matches!(fmt.get(i), Some(b) if b.is_ascii_digit()) {
                i += 1;
            }
        }
        let conv = *fmt.get(i).ok_or_else(|| vm.runtime_error("invalid format string to 'format'"))?;
        let flags = std::str::from_utf8(&fmt[spec_start..i]).unwrap_or("");
        i += 1;
        match conv {
            b'd' | b'i' => {
                let n = check_int(vm, nargs, argi, "format")?;
                argi += 1;
                out.extend(apply_int_spec(flags, n).into_bytes());
            }
            b'u' => {
                let n = check_int(vm, nargs, argi, "format")? as u64;
                argi += 1;
                out.extend(n.to_string().into_bytes());
            }
            b'x' => {
                let n = check_int(vm, nargs, argi, "format")? as i64 as u64;
                argi += 1;
                out.extend(format!("{:x}", n).into_bytes());
            }
            b'X' => {
                let n = check_int(vm, nargs, argi, "format")? as i64 as u64;
                argi += 1;
                out.extend(format!("{:X}", n).into_bytes());
            }
            b'o' => {
                let n = check_int(vm, nargs, argi, "format")? as i64 as u64;
                argi += 1;
                out.extend(format!("{:o}", n).into_bytes());
            }
            b'c' => {
                let n = check_int(vm, nargs, argi, "format")?;
                argi += 1;
                out.push(n as u8);
            }
            b'f' | b'F' | b'g' | b'G' | b'e' | b'E' => {
                let n = check_number(vm, nargs, argi, "format")?;
                argi += 1;
                out.extend(apply_float_spec(flags, conv, n).into_bytes());
            }
            b's' => {
                let v = arg(vm, nargs, argi);
                argi += 1;
                let s = string_repr(vm, v)?;
                out.extend(s);
            }
            b'q' => {
                let s = check_string(vm, nargs, argi, "format")?;
                argi += 1;
                out.push(b'"');
                for b in s {
                    match b {
                        b'"' | b'\\' => {
                            out.push(b'\\');
                            out.push(b);
                        }
                        b'\n' => out.extend(b"\\n"),
                        0 => out.extend(b"\\0"),
                        _ => out.push(b),
                    }
                }
                out.push(b'"');
            }
            other => return Err(vm.runtime_error(format!("invalid conversion '%{}' to 'format'", other as char))),
        }
    }
    let v = vm.heap.intern(&out, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn string_repr(vm: &mut LuaVM, v: LuaValue) -> LuaResult<Vec<u8>> {
    match v {
        LuaValue::String(id) => Ok(vm.heap.string_bytes(id).to_vec()),
        other => Ok(other.to_display_string(&vm.heap).into_bytes()),
    }
}

fn apply_int_spec(flags: &str, n: i64) -> String {
    let width = flags.trim_start_matches(['-', '+', ' ', '#', '0']).parse::<usize>().unwrap_or(0);
    let zero_pad = flags.starts_with('0') || flags.contains("0");
    let left = flags.contains('-');
    let mut s = n.to_string();
    if s.len() < width {
        let pad = width - s.len();
        if left {
            s.push_str(&" ".repeat(pad));
        } else if zero_pad {
            let (sign, digits) = if s.starts_with('-') { ("-", &s[1..]) } else { ("", s.as_str()) };
            s = format!("{}{}{}", sign, "0".repeat(pad), digits);
        } else {
            s = format!("{}{}", " ".repeat(pad), s);
        }
    }
    s
}

fn apply_float_spec(flags: &str, conv: u8, n: f64) -> String {
    let precision = flags.split('.').nth(1).and_then(|p| p.parse::<usize>().ok()).unwrap_or(6);
    match conv {
        b'f' | b'F' => format!("{:.*}", precision, n),
        b'e' => format!("{:.*e}", precision, n),
        b'E' => format!("{:.*E}", precision, n),
        _ => crate::value::format_number(n),
    }
}

fn cap_to_value(vm: &mut LuaVM, c: &CapValue) -> LuaValue {
    match c {
        CapValue::Str(bytes) => LuaValue::String(vm.heap.intern(bytes, vm.gc.current_white)),
        CapValue::Pos(p) => LuaValue::integer(*p as i64),
    }
}

fn l_find(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "find")?;
    let pat = check_string(vm, nargs, 1, "find")?;
    let init = normalize_init(opt_int(vm, nargs, 2, "find", 1)?, s.len());
    let plain = nargs >= 4 && arg(vm, nargs, 3).truthy();
    if plain || !pat.iter().any(|b| b"^$*+?.([%-".contains(b)) {
        return Ok(match find_plain(&s, &pat, init) {
            Some(pos) => push_result(vm, nargs, &[LuaValue::integer(pos as i64 + 1), LuaValue::integer((pos + pat.len()) as i64)]),
            None => push_result(vm, nargs, &[LuaValue::Nil]),
        });
    }
    match lua_pattern::find(&s, &pat, init).map_err(|e| vm.runtime_error(e))? {
        Some(m) => {
            let mut out = vec![LuaValue::integer(m.start as i64 + 1), LuaValue::integer(m.end as i64)];
            if !pat.contains(&b'(') {
                // no explicit captures: find returns only the span.
            } else {
                out.extend(m.captures.iter().map(|c| cap_to_value(vm, c)));
            }
            Ok(push_result(vm, nargs, &out))
        }
        None => Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    }
}

fn find_plain(s: &[u8], pat: &[u8], init: usize) -> Option<usize> {
    if pat.is_empty() {
        return Some(init.min(s.len()));
    }
    s.get(init..)?.windows(pat.len()).position(|w| w == pat).map(|p| p + init)
}

fn normalize_init(i: i64, len: usize) -> usize {
    if i > 0 {
        (i as usize - 1).min(len)
    } else if i == 0 {
        0
    } else {
        (len as i64 + i).max(0) as usize
    }
}

fn l_match(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "match")?;
    let pat = check_string(vm, nargs, 1, "match")?;
    let init = normalize_init(opt_int(vm, nargs, 2, "match", 1)?, s.len());
    match lua_pattern::find(&s, &pat, init).map_err(|e| vm.runtime_error(e))? {
        Some(m) => {
            let values: Vec<LuaValue> = m.captures.iter().map(|c| cap_to_value(vm, c)).collect();
            Ok(push_result(vm, nargs, &values))
        }
        None => Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    }
}

/// `gmatch`'s iterator closes over `(s, pat, pos)` using a plain Lua table
/// with a `__call` metamethod rather than a captured Rust closure — host
/// functions here are bare `fn` pointers with no upvalues of their own, but a
/// callable table works just as well as the for-in protocol's iterator.
fn l_gmatch(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "gmatch")?;
    let pat = check_string(vm, nargs, 1, "gmatch")?;
    let state = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let s_val = LuaValue::String(vm.heap.intern(&s, vm.gc.current_white));
    let pat_val = LuaValue::String(vm.heap.intern(&pat, vm.gc.current_white));
    let k_s = vm.new_string("s");
    let k_p = vm.new_string("p");
    let k_pos = vm.new_string("pos");
    vm.raw_set(state, k_s, s_val);
    vm.raw_set(state, k_p, pat_val);
    vm.raw_set(state, k_pos, LuaValue::integer(0));
    let mt = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let call_fn = vm.new_host_function("gmatch_iterator", gmatch_step);
    let k_call = vm.new_string("__call");
    vm.raw_set(mt, k_call, call_fn);
    vm.heap.table_mut(state).set_metatable(Some(mt));
    Ok(push_result(vm, nargs, &[LuaValue::Table(state)]))
}

fn gmatch_step(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let state = check_table(vm, nargs, 0, "gmatch_iterator")?;
    let s = {
        let k = vm.new_string("s");
        vm.heap.table(state).raw_get(&k)
    };
    let pat = {
        let k = vm.new_string("p");
        vm.heap.table(state).raw_get(&k)
    };
    let pos = {
        let k = vm.new_string("pos");
        match vm.heap.table(state).raw_get(&k) {
            LuaValue::Number(n) => n as usize,
            _ => 0,
        }
    };
    let s_bytes = match s {
        LuaValue::String(id) => vm.heap.string_bytes(id).to_vec(),
        _ => return Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    };
    let pat_bytes = match pat {
        LuaValue::String(id) => vm.heap.string_bytes(id).to_vec(),
        _ => return Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    };
    if pos > s_bytes.len() {
        return Ok(push_result(vm, nargs, &[LuaValue::Nil]));
    }
    match lua_pattern::find(&s_bytes, &pat_bytes, pos).map_err(|e| vm.runtime_error(e))? {
        Some(m) => {
            let next_pos = if m.end > m.start { m.end } else { m.end + 1 };
            let k_pos = vm.new_string("pos");
            vm.raw_set(state, k_pos, LuaValue::integer(next_pos as i64));
            let values: Vec<LuaValue> = m.captures.iter().map(|c| cap_to_value(vm, c)).collect();
            Ok(push_result(vm, nargs, &values))
        }
        None => Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    }
}

fn l_gsub(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let s = check_string(vm, nargs, 0, "gsub")?;
    let pat = check_string(vm, nargs, 1, "gsub")?;
    let repl = arg(vm, nargs, 2);
    let max_n = opt_int(vm, nargs, 3, "gsub", i64::MAX)?;

    let mut out = Vec::new();
    let mut pos = 0usize;
    let mut count: i64 = 0;
    while pos <= s.len() && count < max_n {
        let Some(m) = lua_pattern::find(&s, &pat, pos).map_err(|e| vm.runtime_error(e))? else {
            break;
        };
        out.extend(&s[pos..m.start]);
        let whole: Vec<u8> = s[m.start..m.end].to_vec();
        let caps: Vec<LuaValue> = if m.captures.is_empty() {
            vec![vm.new_string(&String::from_utf8_lossy(&whole))]
        } else {
            m.captures.iter().map(|c| cap_to_value(vm, c)).collect()
        };
        let replaced = gsub_replacement(vm, repl, &whole, &caps)?;
        out.extend(replaced.unwrap_or(whole));
        count += 1;
        pos = if m.end > m.start {
            m.end
        } else {
            if m.end < s.len() {
                out.push(s[m.end]);
            }
            m.end + 1
        };
    }
    if pos < s.len() {
        out.extend(&s[pos..]);
    }
    let v = vm.heap.intern(&out, vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v), LuaValue::integer(count)]))
}

fn gsub_replacement(vm: &mut LuaVM, repl: LuaValue, whole: &[u8], caps: &[LuaValue]) -> LuaResult<Option<Vec<u8>>> {
    match repl {
        LuaValue::String(id) => {
            let template = vm.heap.string_bytes(id).to_vec();
            let mut out = Vec::new();
            let mut i = 0;
            while i < template.len() {
                if template[i] == b'%' && i + 1 < template.len() {
                    let d = template[i + 1];
                    if d == b'%' {
                        out.push(b'%');
                    } else if d == b'0' {
                        out.extend(whole);
                    } else if d.is_ascii_digit() {
                        let idx = (d - b'0') as usize;
                        if let Some(c) = caps.get(idx - 1) {
                            out.extend(value_bytes(vm, *c));
                        }
                    } else {
                        out.push(d);
                    }
                    i += 2;
                } else {
                    out.push(template[i]);
                    i += 1;
                }
            }
            Ok(Some(out))
        }
        LuaValue::Table(id) => {
            let key = caps[0];
            let v = vm.heap.table(id).raw_get(&key);
            Ok(match v {
                LuaValue::Nil | LuaValue::Boolean(false) => None,
                other => Some(value_bytes(vm, other)),
            })
        }
        LuaValue::Function(_) => {
            let results = vm.call(repl, caps)?;
            Ok(match results.into_iter().next().unwrap_or(LuaValue::Nil) {
                LuaValue::Nil | LuaValue::Boolean(false) => None,
                other => Some(value_bytes(vm, other)),
            })
        }
        _ => Ok(None),
    }
}

fn value_bytes(vm: &LuaVM, v: LuaValue) -> Vec<u8> {
    match v {
        LuaValue::String(id) => vm.heap.string_bytes(id).to_vec(),
        other => other.to_display_string(&vm.heap).into_bytes(),
    }
}
