use crate::execute;

#[test]
fn test_if_elseif_else() {
    let result = execute(
        r#"
        local function classify(n)
            if n < 0 then
                return "negative"
            elseif n == 0 then
                return "zero"
            else
                return "positive"
            end
        end
        assert(classify(-1) == "negative")
        assert(classify(0) == "zero")
        assert(classify(1) == "positive")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_while_and_break() {
    let result = execute(
        r#"
        local i = 0
        local sum = 0
        while i < 10 do
            i = i + 1
            if i == 5 then
                break
            end
            sum = sum + i
        end
        assert(sum == 10)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_repeat_until() {
    let result = execute(
        r#"
        local i = 0
        repeat
            i = i + 1
        until i >= 5
        assert(i == 5)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_numeric_for() {
    let result = execute(
        r#"
        local sum = 0
        for i = 1, 10 do
            sum = sum + i
        end
        assert(sum == 55)

        local count = 0
        for i = 10, 1, -2 do
            count = count + 1
        end
        assert(count == 5)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_generic_for_pairs_ipairs() {
    let result = execute(
        r#"
        local t = {10, 20, 30}
        local sum = 0
        for i, v in ipairs(t) do
            sum = sum + v
        end
        assert(sum == 60)

        local keys = {}
        local m = {a = 1, b = 2}
        local count = 0
        for k, v in pairs(m) do
            count = count + v
        end
        assert(count == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_and_or_short_circuit() {
    let result = execute(
        r#"
        local calls = 0
        local function side(v)
            calls = calls + 1
            return v
        end
        local a = false and side(1)
        assert(calls == 0)
        local b = true or side(2)
        assert(calls == 0)
        local c = true and side(3)
        assert(calls == 1 and c == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
