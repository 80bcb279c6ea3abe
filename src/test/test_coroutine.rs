use crate::execute;

#[test]
fn test_coroutine_resume_yield_roundtrip() {
    let result = execute(
        r#"
        local co = coroutine.create(function(a, b)
            assert(a == 1 and b == 2)
            local x = coroutine.yield(a + b)
            assert(x == 10)
            return "done"
        end)

        local ok, sum = coroutine.resume(co, 1, 2)
        assert(ok == true and sum == 3)
        assert(coroutine.status(co) == "suspended")

        local ok2, result = coroutine.resume(co, 10)
        assert(ok2 == true and result == "done")
        assert(coroutine.status(co) == "dead")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_coroutine_wrap() {
    let result = execute(
        r#"
        local function gen()
            local function iter()
                coroutine.yield(1)
                coroutine.yield(2)
                coroutine.yield(3)
            end
            return coroutine.wrap(iter)
        end
        local next_val = gen()
        assert(next_val() == 1)
        assert(next_val() == 2)
        assert(next_val() == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_coroutine_error_propagates_to_resumer() {
    let result = execute(
        r#"
        local co = coroutine.create(function()
            error("inner failure")
        end)
        local ok, err = coroutine.resume(co)
        assert(ok == false)
        assert(string.find(err, "inner failure") ~= nil)
        assert(coroutine.status(co) == "dead")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
