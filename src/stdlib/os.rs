//! `os` library: time/date/environment queries, date formatting via `chrono`.

use crate::stdlib::helpers::*;
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn open(vm: &mut LuaVM) {
    let lib = new_lib_table(vm, "os");
    register(vm, lib, "time", l_time);
    register(vm, lib, "date", l_date);
    register(vm, lib, "clock", l_clock);
    register(vm, lib, "difftime", l_difftime);
    register(vm, lib, "getenv", l_getenv);
    register(vm, lib, "exit", l_exit);
}

fn l_time(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    if nargs >= 1 && !arg(vm, nargs, 0).is_nil() {
        let t = check_table(vm, nargs, 0, "time")?;
        let get = |vm: &mut LuaVM, name: &str, default: i64| -> i64 {
            let k = vm.new_string(name);
            match vm.heap.table(t).raw_get(&k) {
                LuaValue::Number(n) => n as i64,
                _ => default,
            }
        };
        let year = get(vm, "year", 1970);
        let month = get(vm, "month", 1);
        let day = get(vm, "day", 1);
        let hour = get(vm, "hour", 12);
        let min = get(vm, "min", 0);
        let sec = get(vm, "sec", 0);
        let dt = Local
            .with_ymd_and_hms(year as i32, month as u32, day as u32, hour as u32, min as u32, sec as u32)
            .single();
        let ts = dt.map(|d| d.timestamp()).unwrap_or(0);
        return Ok(push_result(vm, nargs, &[LuaValue::integer(ts)]));
    }
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    Ok(push_result(vm, nargs, &[LuaValue::integer(secs as i64)]))
}

fn l_date(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let fmt = opt_string(vm, nargs, 0, "date", b"%c")?;
    let mut fmt = String::from_utf8_lossy(&fmt).to_string();
    let utc = fmt.starts_with('!');
    if utc {
        fmt.remove(0);
    }
    let time = if nargs >= 2 {
        check_int(vm, nargs, 1, "date")?
    } else {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
    };

    if fmt == "*t" || fmt == "!*t" {
        let t = build_date_table(vm, time, utc);
        return Ok(push_result(vm, nargs, &[LuaValue::Table(t)]));
    }

    let formatted = if utc {
        let dt: DateTime<Utc> = Utc.timestamp_opt(time, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        strftime(&dt, &fmt)
    } else {
        let dt: DateTime<Local> = Local.timestamp_opt(time, 0).single().unwrap_or_else(|| Local.timestamp_opt(0, 0).unwrap());
        strftime(&dt, &fmt)
    };
    let v = vm.heap.intern(formatted.as_bytes(), vm.gc.current_white);
    Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
}

fn strftime<Tz: chrono::TimeZone>(dt: &DateTime<Tz>, fmt: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format(fmt).to_string()
}

fn build_date_table(vm: &mut LuaVM, time: i64, utc: bool) -> crate::gc::TableId {
    let t = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let mut set = |vm: &mut LuaVM, name: &str, value: i64| {
        let k = vm.new_string(name);
        vm.raw_set(t, k, LuaValue::integer(value));
    };
    if utc {
        let dt: DateTime<Utc> = Utc.timestamp_opt(time, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        set(vm, "year", dt.year() as i64);
        set(vm, "month", dt.month() as i64);
        set(vm, "day", dt.day() as i64);
        set(vm, "hour", dt.hour() as i64);
        set(vm, "min", dt.minute() as i64);
        set(vm, "sec", dt.second() as i64);
        set(vm, "wday", dt.weekday().num_days_from_sunday() as i64 + 1);
        set(vm, "yday", dt.ordinal() as i64);
    } else {
        let dt: DateTime<Local> = Local.timestamp_opt(time, 0).single().unwrap_or_else(|| Local.timestamp_opt(0, 0).unwrap());
        set(vm, "year", dt.year() as i64);
        set(vm, "month", dt.month() as i64);
        set(vm, "day", dt.day() as i64);
        set(vm, "hour", dt.hour() as i64);
        set(vm, "min", dt.minute() as i64);
        set(vm, "sec", dt.second() as i64);
        set(vm, "wday", dt.weekday().num_days_from_sunday() as i64 + 1);
        set(vm, "yday", dt.ordinal() as i64);
    }
    let k_isdst = vm.new_string("isdst");
    vm.raw_set(t, k_isdst, LuaValue::Boolean(false));
    t
}

fn l_clock(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);
    Ok(push_result(vm, nargs, &[LuaValue::Number(secs)]))
}

fn l_difftime(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let t2 = check_number(vm, nargs, 0, "difftime")?;
    let t1 = check_number(vm, nargs, 1, "difftime")?;
    Ok(push_result(vm, nargs, &[LuaValue::Number(t2 - t1)]))
}

fn l_getenv(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let name = check_string(vm, nargs, 0, "getenv")?;
    let name = String::from_utf8_lossy(&name).to_string();
    match std::env::var(&name) {
        Ok(val) => {
            let v = vm.heap.intern(val.as_bytes(), vm.gc.current_white);
            Ok(push_result(vm, nargs, &[LuaValue::String(v)]))
        }
        Err(_) => Ok(push_result(vm, nargs, &[LuaValue::Nil])),
    }
}

fn l_exit(vm: &mut LuaVM, nargs: usize) -> LuaResult<usize> {
    let code = opt_int(vm, nargs, 0, "exit", 0)?;
    std::process::exit(code as i32);
}
