use crate::execute;

#[test]
fn test_closures_share_upvalue() {
    let result = execute(
        r#"
        local function make_counter()
            local n = 0
            return function()
                n = n + 1
                return n
            end
        end
        local c = make_counter()
        assert(c() == 1)
        assert(c() == 2)
        assert(c() == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_recursive_function() {
    let result = execute(
        r#"
        local function fact(n)
            if n <= 1 then
                return 1
            end
            return n * fact(n - 1)
        end
        assert(fact(6) == 720)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_methods_and_self() {
    let result = execute(
        r#"
        local obj = {value = 10}
        function obj:get()
            return self.value
        end
        function obj:add(n)
            self.value = self.value + n
            return self.value
        end
        assert(obj:get() == 10)
        assert(obj:add(5) == 15)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_pcall_catches_error() {
    let result = execute(
        r#"
        local ok, err = pcall(function()
            error("boom")
        end)
        assert(ok == false)
        assert(string.find(err, "boom") ~= nil)

        local ok2, v = pcall(function() return 42 end)
        assert(ok2 == true and v == 42)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_metatable_index_and_newindex() {
    let result = execute(
        r#"
        local base = {greet = function(self) return "hi " .. self.name end}
        local mt = {__index = base}
        local obj = setmetatable({name = "lua"}, mt)
        assert(obj:greet() == "hi lua")

        local log = {}
        local proxy = setmetatable({}, {
            __newindex = function(t, k, v)
                log[#log + 1] = k
                rawset(t, k, v)
            end,
        })
        proxy.x = 1
        assert(proxy.x == 1)
        assert(log[1] == "x")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
