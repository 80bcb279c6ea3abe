use crate::execute;

#[test]
fn test_string_len_sub_case() {
    let result = execute(
        r#"
        assert(string.len("hello") == 5)
        assert(#"hello" == 5)
        assert(string.sub("hello", 2, 4) == "ell")
        assert(string.sub("hello", -2) == "lo")
        assert(string.upper("abc") == "ABC")
        assert(string.lower("ABC") == "abc")
        assert(string.rep("ab", 3) == "ababab")
        assert(string.reverse("abc") == "cba")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_string_byte_char() {
    let result = execute(
        r#"
        assert(string.byte("A") == 65)
        assert(string.char(65, 66, 67) == "ABC")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_string_format() {
    let result = execute(
        r#"
        assert(string.format("%d-%s", 5, "x") == "5-x")
        assert(string.format("%%") == "%")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_string_find_match() {
    let result = execute(
        r#"
        local s, e = string.find("hello world", "wor")
        assert(s == 7 and e == 9)

        local word = string.match("hello world", "%a+")
        assert(word == "hello")

        local k, v = string.match("key=value", "(%a+)=(%a+)")
        assert(k == "key" and v == "value")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_string_gmatch_iterates() {
    let result = execute(
        r#"
        local words = {}
        for w in string.gmatch("the quick brown fox", "%a+") do
            words[#words + 1] = w
        end
        assert(#words == 4)
        assert(words[1] == "the")
        assert(words[4] == "fox")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_string_method_call_syntax() {
    let result = execute(
        r#"
        assert(("hello"):upper() == "HELLO")
        local s = "  hi  "
        assert(("abc"):sub(2) == "bc")
        assert(s:len() == 6)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_string_gsub_function_and_limit() {
    let result = execute(
        r#"
        local s1, n1 = string.gsub("hello world", "%w+", function(w)
            return string.upper(w)
        end)
        assert(s1 == "HELLO WORLD")
        assert(n1 == 2)

        local s2, n2 = string.gsub("aaaa", "a", "b", 2)
        assert(s2 == "bbaa")
        assert(n2 == 2)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
