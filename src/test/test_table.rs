use crate::execute;

#[test]
fn test_table_insert_remove() {
    let result = execute(
        r#"
        local t = {1, 2, 3}
        table.insert(t, 4)
        assert(#t == 4 and t[4] == 4)
        table.insert(t, 1, 0)
        assert(t[1] == 0 and t[2] == 1 and #t == 5)
        local removed = table.remove(t, 1)
        assert(removed == 0 and t[1] == 1 and #t == 4)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_table_concat() {
    let result = execute(
        r#"
        local t = {"a", "b", "c"}
        assert(table.concat(t) == "abc")
        assert(table.concat(t, ",") == "a,b,c")
        assert(table.concat(t, ",", 2, 3) == "b,c")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_table_sort_default_and_custom() {
    let result = execute(
        r#"
        local t = {3, 1, 4, 1, 5, 9, 2, 6}
        table.sort(t)
        for i = 1, #t - 1 do
            assert(t[i] <= t[i + 1])
        end

        local names = {"banana", "apple", "cherry"}
        table.sort(names, function(a, b) return a > b end)
        assert(names[1] == "cherry")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_table_unpack() {
    let result = execute(
        r#"
        local t = {10, 20, 30}
        local a, b, c = table.unpack(t)
        assert(a == 10 and b == 20 and c == 30)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
