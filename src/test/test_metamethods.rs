use crate::execute;

#[test]
fn test_arithmetic_metamethods() {
    let result = execute(
        r#"
        local Vector = {}
        Vector.__index = Vector
        Vector.__add = function(a, b)
            return setmetatable({x = a.x + b.x, y = a.y + b.y}, Vector)
        end
        Vector.__tostring = function(v)
            return "(" .. v.x .. "," .. v.y .. ")"
        end

        local a = setmetatable({x = 1, y = 2}, Vector)
        local b = setmetatable({x = 3, y = 4}, Vector)
        local c = a + b
        assert(c.x == 4 and c.y == 6)
        assert(tostring(c) == "(4,6)")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_eq_lt_le_metamethods() {
    let result = execute(
        r#"
        local mt = {
            __eq = function(a, b) return a.v == b.v end,
            __lt = function(a, b) return a.v < b.v end,
            __le = function(a, b) return a.v <= b.v end,
        }
        local a = setmetatable({v = 1}, mt)
        local b = setmetatable({v = 2}, mt)
        local c = setmetatable({v = 1}, mt)
        assert(a == c)
        assert(a < b)
        assert(a <= c)
        assert(not (b < a))
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_call_metamethod() {
    let result = execute(
        r#"
        local callable = setmetatable({}, {
            __call = function(self, x)
                return x * 2
            end,
        })
        assert(callable(21) == 42)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
