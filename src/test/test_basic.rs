use crate::execute;

#[test]
fn test_arithmetic() {
    let result = execute(
        r#"
        assert(1 + 2 == 3)
        assert(10 / 4 == 2.5)
        assert(10 % 3 == 1)
        assert(2 ^ 10 == 1024)
        assert(-5 == 0 - 5)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_string_concat_and_length() {
    let result = execute(
        r#"
        local s = "foo" .. "bar"
        assert(s == "foobar")
        assert(#s == 6)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_locals_and_globals() {
    let result = execute(
        r#"
        x = 10
        local y = 20
        assert(x + y == 30)
        do
            local x = 99
            assert(x == 99)
        end
        assert(x == 10)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_multiple_assignment_and_varargs() {
    let result = execute(
        r#"
        local function f(...)
            return ...
        end
        local a, b, c = f(1, 2, 3)
        assert(a == 1 and b == 2 and c == 3)

        local function count(...)
            return select('#', ...)
        end
        assert(count(1, 2, 3, 4) == 4)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_select() {
    let result = execute(
        r#"
        local a, b, c = select(1, "a", "b", "c")
        assert(a == "a" and b == "b" and c == "c")

        local x, y = select(2, "a", "b", "c")
        assert(x == "b" and y == "c")

        assert(select(3, "a", "b", "c") == "c")
        assert(select('#', "a", "b", "c") == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_tostring_tonumber() {
    let result = execute(
        r#"
        assert(tostring(10) == "10")
        assert(tonumber("42") == 42)
        assert(tonumber("abc") == nil)
        assert(type(1) == "number")
        assert(type("s") == "string")
        assert(type(nil) == "nil")
        assert(type(true) == "boolean")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
