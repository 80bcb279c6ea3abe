use crate::object::Userdata;
use crate::value::LuaValue;
use crate::vm::{LuaResult, LuaVM};

fn mark_finalized(vm: &mut LuaVM, _nargs: usize) -> LuaResult<usize> {
    vm.set_global("finalized", LuaValue::Boolean(true));
    Ok(0)
}

#[test]
fn test_gc_runs_finalizer_on_unreachable_userdata() {
    let mut vm = LuaVM::new();
    vm.open_libs();

    let white = vm.gc.current_white;
    let ud = vm.heap.create_userdata(Userdata::new(Vec::new()), white);
    let mt = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    let gc_fn = vm.new_host_function("__gc", mark_finalized);
    let key = vm.new_string("__gc");
    vm.raw_set(mt, key, gc_fn);
    vm.heap.userdata_mut(ud).metatable = Some(mt);
    // Keep the metatable itself rooted, independent of `ud`, the way a
    // script-level metatable usually lives in a global or upvalue rather
    // than being reachable only through the userdata it is about to collect.
    vm.set_global("__mt", LuaValue::Table(mt));

    // `ud` is never stored anywhere reachable from the roots, so the next
    // full collection should consider it dead and run its finalizer.
    vm.collect_garbage();

    assert!(matches!(vm.get_global("finalized"), LuaValue::Boolean(true)));
}

#[test]
fn test_gc_reclaims_across_repeated_cycles() {
    let mut vm = LuaVM::new();
    vm.open_libs();

    for _ in 0..50 {
        vm.new_table();
    }
    vm.collect_garbage();
    let after_first = vm.heap.tables.len();

    for _ in 0..50 {
        vm.new_table();
    }
    vm.collect_garbage();
    let after_second = vm.heap.tables.len();

    // Garbage tables created between cycles must not accumulate: a
    // survivor that stayed permanently black would never be swept again,
    // so the live count would keep growing cycle over cycle.
    assert_eq!(after_first, after_second);
}

#[test]
fn test_gc_collects_object_that_survives_then_dies() {
    let mut vm = LuaVM::new();
    vm.open_libs();
    vm.collect_garbage();
    let baseline = vm.heap.tables.len();

    let t = vm.new_table();
    vm.set_global("g", t);
    vm.collect_garbage(); // `g` is rooted via globals: survives, gets blackened.
    assert_eq!(vm.heap.tables.len(), baseline + 1);

    vm.set_global("g", LuaValue::Nil);
    vm.collect_garbage(); // now unreachable: a black survivor must still die.
    assert_eq!(vm.heap.tables.len(), baseline);
}
