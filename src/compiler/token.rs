//! Token kinds, named the way the teacher's `lua_token_kind.rs` names them
//! (`Tk` prefix), trimmed to the punctuation/keyword set Lua 5.1 actually
//! has — no `goto`/`::label::`, no bitwise operators, no `//`.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    // keywords
    TkAnd,
    TkBreak,
    TkDo,
    TkElse,
    TkElseIf,
    TkEnd,
    TkFalse,
    TkFor,
    TkFunction,
    TkIf,
    TkIn,
    TkLocal,
    TkNil,
    TkNot,
    TkOr,
    TkRepeat,
    TkReturn,
    TkThen,
    TkTrue,
    TkUntil,
    TkWhile,

    // punctuation
    TkPlus,
    TkMinus,
    TkMul,
    TkDiv,
    TkMod,
    TkPow,
    TkLen,
    TkEq,
    TkNe,
    TkLe,
    TkGe,
    TkLt,
    TkGt,
    TkAssign,
    TkLeftParen,
    TkRightParen,
    TkLeftBrace,
    TkRightBrace,
    TkLeftBracket,
    TkRightBracket,
    TkSemicolon,
    TkColon,
    TkComma,
    TkDot,
    TkConcat,
    TkDots,

    TkName(smol_str::SmolStr),
    TkInt(i64),
    TkFloat(f64),
    TkString(Vec<u8>),

    TkEof,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}
