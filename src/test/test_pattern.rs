use crate::execute;

#[test]
fn test_character_classes() {
    let result = execute(
        r#"
        assert(string.match("abc123", "%a+") == "abc")
        assert(string.match("abc123", "%d+") == "123")
        assert(string.match("  hi", "%s+") ~= nil)
        assert(string.match("  hi", "%S+") == "hi")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_anchors() {
    let result = execute(
        r#"
        assert(string.match("hello", "^hel") == "hel")
        assert(string.match("hello", "llo$") == "llo")
        assert(string.match("hello", "^hello$") == "hello")
        assert(string.match("xhello", "^hello") == nil)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_sets_and_ranges() {
    let result = execute(
        r#"
        assert(string.match("cat", "[abc]at") == "cat")
        assert(string.match("hat", "[^abc]at") == "hat")
        assert(string.match("z9", "[a-z][0-9]") == "z9")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_captures_and_position_capture() {
    let result = execute(
        r#"
        local y, m, d = string.match("2026-07-28", "(%d+)-(%d+)-(%d+)")
        assert(y == "2026" and m == "07" and d == "28")

        local pos = string.match("xxabc", "()abc")
        assert(pos == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_balanced_match() {
    let result = execute(
        r#"
        local inner = string.match("(nested (parens) here)", "%b()")
        assert(inner == "(nested (parens) here)")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
