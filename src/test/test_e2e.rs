//! Literal end-to-end scenarios, checked both in-Lua and against the
//! Rust-level return values the embedder actually sees.

use crate::value::LuaValue;
use crate::vm::LuaVM;

fn run(source: &str) -> (LuaVM, Vec<LuaValue>) {
    let mut vm = LuaVM::new();
    vm.open_libs();
    let values = vm.do_string(source).expect("script should succeed");
    (vm, values)
}

fn as_number(v: &LuaValue) -> f64 {
    match v {
        LuaValue::Number(n) => *n,
        other => panic!("expected number, got {:?}", other),
    }
}

fn as_str(vm: &LuaVM, v: &LuaValue) -> String {
    match v {
        LuaValue::String(id) => String::from_utf8_lossy(vm.heap.string_bytes(*id)).into_owned(),
        other => panic!("expected string, got {:?}", other),
    }
}

fn as_bool(v: &LuaValue) -> bool {
    match v {
        LuaValue::Boolean(b) => *b,
        other => panic!("expected boolean, got {:?}", other),
    }
}

#[test]
fn scenario_arithmetic_precedence() {
    let (_vm, values) = run("return 1 + 2 * 3");
    assert_eq!(values.len(), 1);
    assert_eq!(as_number(&values[0]), 7.0);
}

#[test]
fn scenario_table_build_and_length() {
    let (_vm, values) = run(
        r#"
        local t = {}
        for i=1,5 do t[i] = i*i end
        return t[1], t[5], #t
    "#,
    );
    assert_eq!(values.len(), 3);
    assert_eq!(as_number(&values[0]), 1.0);
    assert_eq!(as_number(&values[1]), 25.0);
    assert_eq!(as_number(&values[2]), 5.0);
}

#[test]
fn scenario_closure_shared_upvalue() {
    let (_vm, values) = run(
        r#"
        local function mk()
            local x = 0
            return function() x = x + 1; return x end
        end
        local c = mk()
        return c(), c(), c()
    "#,
    );
    assert_eq!(values.len(), 3);
    assert_eq!(as_number(&values[0]), 1.0);
    assert_eq!(as_number(&values[1]), 2.0);
    assert_eq!(as_number(&values[2]), 3.0);
}

#[test]
fn scenario_coroutine_resume_yield_roundtrip() {
    let (vm, values) = run(
        r#"
        local co = coroutine.create(function(a)
            local b = coroutine.yield(a + 1)
            return b * 2
        end)
        local ok1, v1 = coroutine.resume(co, 10)
        local ok2, v2 = coroutine.resume(co, 5)
        return ok1, v1, ok2, v2, coroutine.status(co)
    "#,
    );
    assert_eq!(values.len(), 5);
    assert_eq!(as_bool(&values[0]), true);
    assert_eq!(as_number(&values[1]), 11.0);
    assert_eq!(as_bool(&values[2]), true);
    assert_eq!(as_number(&values[3]), 10.0);
    assert_eq!(as_str(&vm, &values[4]), "dead");
}

#[test]
fn scenario_add_metamethod() {
    let (vm, values) = run(
        r#"
        local mt = { __add = function(a,b) return "added" end }
        local x = setmetatable({}, mt)
        return x + 1
    "#,
    );
    assert_eq!(values.len(), 1);
    assert_eq!(as_str(&vm, &values[0]), "added");
}

#[test]
fn scenario_repeated_concat_interning() {
    let (_vm, values) = run(
        r#"
        local s = ""
        for i=1,10000 do s = s .. "x" end
        return #s
    "#,
    );
    assert_eq!(values.len(), 1);
    assert_eq!(as_number(&values[0]), 10000.0);
}

#[test]
fn scenario_resume_past_dead_coroutine() {
    let (_vm, values) = run(
        r#"
        local co = coroutine.create(function() return 1 end)
        coroutine.resume(co)
        local ok, err = coroutine.resume(co)
        return ok, err, coroutine.status(co)
    "#,
    );
    assert_eq!(as_bool(&values[0]), false);
    assert_eq!(values.len(), 3);
}

#[test]
fn scenario_division_by_zero() {
    let (_vm, values) = run(
        r#"
        return 1/0, -1/0, (0/0 ~= 0/0)
    "#,
    );
    assert_eq!(as_number(&values[0]), f64::INFINITY);
    assert_eq!(as_number(&values[1]), f64::NEG_INFINITY);
    assert_eq!(as_bool(&values[2]), true);
}
