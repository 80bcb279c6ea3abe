//! `math` library: the standard trig/rounding set plus `random`/`randomseed`
//! backed by `rand`, matching how the teacher reaches for `rand` rather than
//! hand-rolling a PRNG.

use crate::stdlib::helpers::*;
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
}

pub fn open(vm: &mut LuaVM) {
    let lib = new_lib_table(vm, "math");
    let pi = vm.new_string("pi");
    vm.raw_set(lib, pi, LuaValue::Number(std::f64::consts::PI));
    let huge = vm.new_string("huge");
    vm.raw_set(lib, huge, LuaValue::Number(f64::INFINITY));

    register(vm, lib, "abs", l_abs);
    register(vm, lib, "ceil", l_ceil);
    register(vm, lib, "floor", l_floor);
    register(vm, lib, "sqrt", l_sqrt);
    register(vm, lib, "sin", l_sin);
    register(vm, lib, "cos", l_cos);
    register(vm, lib, "tan", l_tan);
    register(vm, lib, "asin", l_asin);
    register(vm, lib, "acos", l_acos);
    register(vm, lib, "atan", l_atan);
    register(vm, lib, "atan2", l_atan2);
    register(vm, lib, "exp", l_exp);
    register(vm, lib, "log", l_log);
    register(vm, lib, "log10", l_log10);
    register(vm, lib, "pow", l_pow);
    register(vm, lib, "fmod", l_fmod);
    register(vm, lib, "modf", l_modf);
    register(vm, lib, "max", l_max);
    register(vm, lib, "min", l_min);
    register(vm, lib, "deg", l_deg);
    register(vm, lib, "rad", l_rad);
    register(vm, lib, "random", l_random);
    register(vm, lib, "randomseed", l_randomseed);
}

macro_rules! unary_fn {
    ($name:ident, $op:expr) => {
        fn $name(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
            let n = check_number(vm, nargs, 0, stringify!($name))?;
            let f: fn(f64) -> f64 = $op;
            Ok(push_result(vm, nargs, &[LuaValue::Number(f(n))]))
        }
    };
}

unary_fn!(l_sqrt, f64::sqrt);
unary_fn!(l_sin, f64::sin);
unary_fn!(l_cos, f64::cos);
unary_fn!(l_tan, f64::tan);
unary_fn!(l_asin, f64::asin);
unary_fn!(l_acos, f64::acos);
unary_fn!(l_exp, f64::exp);
unary_fn!(l_deg, f64::to_degrees);
unary_fn!(l_rad, f64::to_radians);

fn l_abs(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let n = check_number(vm, nargs, 0, "abs")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(n.abs())]))
}

fn l_ceil(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let n = check_number(vm, nargs, 0, "ceil")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(n.ceil())]))
}

fn l_floor(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let n = check_number(vm, nargs, 0, "floor")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(n.floor())]))
}

fn l_atan(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let n = check_number(vm, nargs, 0, "atan")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(n.atan())]))
}

fn l_atan2(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let y = check_number(vm, nargs, 0, "atan2")?;
    let x = check_number(vm, nargs, 1, "atan2")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(y.atan2(x))]))
}

fn l_log(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let n = check_number(vm, nargs, 0, "log")?;
    let r = if nargs >= 2 {
        let base = check_number(vm, nargs, 1, "log")?;
        n.log(base)
    } else {
        n.ln()
    };
    Ok(push_result(vm, nargs, &[LuaValue::Number(r)]))
}

fn l_log10(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let n = check_number(vm, nargs, 0, "log10")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(n.log10())]))
}

fn l_pow(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let x = check_number(vm, nargs, 0, "pow")?;
    let y = check_number(vm, nargs, 1, "pow")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(x.powf(y))]))
}

fn l_fmod(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let x = check_number(vm, nargs, 0, "fmod")?;
    let y = check_number(vm, nargs, 1, "fmod")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(x % y)]))
}

fn l_modf(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let n = check_number(vm, nargs, 0, "modf")?;
    let int_part = n.trunc();
    Ok(push_result(vm, nargs, &[LuaValue::Number(int_part), LuaValue::Number(n - int_part)]))
}

fn l_max(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let mut best = check_number(vm, nargs, 0, "max")?;
    for i in 1..nargs {
        let n = check_number(vm, nargs, i, "max")?;
        if n > best {
            best = n;
        }
    }
    Ok(push_result(vm, nargs, &[LuaValue::Number(best)]))
}

fn l_min(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let mut best = check_number(vm, nargs, 0, "min")?;
    for i in 1..nargs {
        let n = check_number(vm, nargs, i, "min")?;
        if n < best {
            best = n;
        }
    }
    Ok(push_result(vm, nargs, &[LuaValue::Number(best)]))
}

fn l_random(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let result = match nargs {
        0 => RNG.with(|r| r.borrow_mut().gen::<f64>()),
        1 => {
            let m = check_int(vm, nargs, 0, "random")?;
            if m < 1 {
                return Err(vm.runtime_error("bad argument #1 to 'random' (interval is empty)"));
            }
            RNG.with(|r| r.borrow_mut().gen_range(1..=m)) as f64
        }
        _ => {
            let lo = check_int(vm, nargs, 0, "random")?;
            let hi = check_int(vm, nargs, 1, "random")?;
            if lo > hi {
                return Err(vm.runtime_error("bad argument #2 to 'random' (interval is empty)"));
            }
            RNG.with(|r| r.borrow_mut().gen_range(lo..=hi)) as f64
        }
    };
    Ok(push_result(vm, nargs, &[LuaValue::Number(result)]))
}

fn l_randomseed(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let seed = check_number(vm, nargs, 0, "randomseed")? as u64;
    RNG.with(|r| *r.borrow_mut() = StdRng::seed_from_u64(seed));
    Ok(push_result(vm, nargs, &[]))
}
