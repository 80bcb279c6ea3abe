//! Hand-written scanner, grounded on the teacher's `lua_tokenize.rs` in
//! spirit (byte-at-a-time scanning, long-bracket handling for strings and
//! comments) but driving straight to `Token`s instead of building a
//! `rowan` green tree, since this compiler emits bytecode directly.

use crate::compiler::token::{Token, TokenKind};
use crate::vm::error::LuaError;

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

pub type LexResult<T> = Result<T, LuaError>;

fn syntax_error(line: u32, message: impl Into<String>) -> LuaError {
    LuaError::SyntaxError {
        message: message.into(),
        line,
    }
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        let bytes = src.as_bytes();
        // Skip a shebang line, as the reference implementation does.
        let start = if bytes.starts_with(b"#") {
            bytes.iter().position(|&b| b == b'\n').map(|p| p + 1).unwrap_or(bytes.len())
        } else {
            0
        };
        Lexer { src: bytes, pos: start, line: 1 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token> {
        self.skip_trivia()?;
        let line = self.line;
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::TkEof, line });
        };
        let kind = match c {
            b'+' => { self.advance(); TokenKind::TkPlus }
            b'-' => { self.advance(); TokenKind::TkMinus }
            b'*' => { self.advance(); TokenKind::TkMul }
            b'/' => { self.advance(); TokenKind::TkDiv }
            b'%' => { self.advance(); TokenKind::TkMod }
            b'^' => { self.advance(); TokenKind::TkPow }
            b'#' => { self.advance(); TokenKind::TkLen }
            b'(' => { self.advance(); TokenKind::TkLeftParen }
            b')' => { self.advance(); TokenKind::TkRightParen }
            b'{' => { self.advance(); TokenKind::TkLeftBrace }
            b'}' => { self.advance(); TokenKind::TkRightBrace }
            b']' => { self.advance(); TokenKind::TkRightBracket }
            b';' => { self.advance(); TokenKind::TkSemicolon }
            b':' => { self.advance(); TokenKind::TkColon }
            b',' => { self.advance(); TokenKind::TkComma }
            b'=' => {
                self.advance();
                if self.eat(b'=') { TokenKind::TkEq } else { TokenKind::TkAssign }
            }
            b'~' => {
                self.advance();
                if self.eat(b'=') { TokenKind::TkNe } else {
                    return Err(syntax_error(line, "unexpected symbol near '~'"));
                }
            }
            b'<' => {
                self.advance();
                if self.eat(b'=') { TokenKind::TkLe } else { TokenKind::TkLt }
            }
            b'>' => {
                self.advance();
                if self.eat(b'=') { TokenKind::TkGe } else { TokenKind::TkGt }
            }
            b'[' => {
                if let Some(level) = self.long_bracket_level() {
                    TokenKind::TkString(self.read_long_bracket(level)?)
                } else {
                    self.advance();
                    TokenKind::TkLeftBracket
                }
            }
            b'.' => {
                if self.peek_at(1) == Some(b'.') {
                    if self.peek_at(2) == Some(b'.') {
                        self.advance();
                        self.advance();
                        self.advance();
                        TokenKind::TkDots
                    } else {
                        self.advance();
                        self.advance();
                        TokenKind::TkConcat
                    }
                } else if self.peek_at(1).map(|b| b.is_ascii_digit()).unwrap_or(false) {
                    self.read_number()?
                } else {
                    self.advance();
                    TokenKind::TkDot
                }
            }
            b'"' | b'\'' => self.read_short_string(c)?,
            b'0'..=b'9' => self.read_number()?,
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.read_name(),
            other => {
                return Err(syntax_error(line, format!("unexpected symbol near '{}'", other as char)));
            }
        };
        Ok(Token { kind, line })
    }

    fn skip_trivia(&mut self) -> LexResult<()> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    self.advance();
                    self.advance();
                    if self.peek() == Some(b'[') {
                        if let Some(level) = self.long_bracket_level() {
                            self.read_long_bracket(level)?;
                            continue;
                        }
                    }
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// If a long-bracket opener (`[=*[`) starts at the current position,
    /// consume it and return its level (the number of `=` signs). Otherwise
    /// leave `self.pos` untouched.
    fn long_bracket_level(&mut self) -> Option<usize> {
        let save = self.pos;
        self.advance(); // the first '['
        let mut level = 0;
        while self.peek() == Some(b'=') {
            self.advance();
            level += 1;
        }
        if self.peek() == Some(b'[') {
            self.advance();
            Some(level)
        } else {
            self.pos = save;
            None
        }
    }

    /// Read the body of a long string/comment whose opener was already
    /// consumed by `long_bracket_level`, up through its matching `]=*]`.
    fn read_long_bracket(&mut self, level: usize) -> LexResult<Vec<u8>> {
        if self.peek() == Some(b'\n') {
            self.advance();
        }
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(syntax_error(self.line, "unfinished long string/comment")),
                Some(b']') => {
                    let save = self.pos;
                    self.advance();
                    let mut seen = 0;
                    while self.peek() == Some(b'=') {
                        self.advance();
                        seen += 1;
                    }
                    if seen == level && self.peek() == Some(b']') {
                        self.advance();
                        return Ok(out);
                    }
                    self.pos = save;
                    out.push(self.advance().unwrap());
                }
                Some(_) => out.push(self.advance().unwrap()),
            }
        }
    }

    fn read_short_string(&mut self, quote: u8) -> LexResult<TokenKind> {
        let line = self.line;
        self.advance();
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(syntax_error(line, "unfinished string")),
                Some(b) if b == quote => {
                    self.advance();
                    return Ok(TokenKind::TkString(out));
                }
                Some(b'\\') => {
                    self.advance();
                    match self.peek() {
                        Some(b'n') => { self.advance(); out.push(b'\n'); }
                        Some(b't') => { self.advance(); out.push(b'\t'); }
                        Some(b'r') => { self.advance(); out.push(b'\r'); }
                        Some(b'a') => { self.advance(); out.push(0x07); }
                        Some(b'b') => { self.advance(); out.push(0x08); }
                        Some(b'f') => { self.advance(); out.push(0x0c); }
                        Some(b'v') => { self.advance(); out.push(0x0b); }
                        Some(b'\\') => { self.advance(); out.push(b'\\'); }
                        Some(b'"') => { self.advance(); out.push(b'"'); }
                        Some(b'\'') => { self.advance(); out.push(b'\''); }
                        Some(b'\n') => { self.advance(); out.push(b'\n'); }
                        Some(d) if d.is_ascii_digit() => {
                            let mut n: u32 = 0;
                            for _ in 0..3 {
                                match self.peek() {
                                    Some(d) if d.is_ascii_digit() => {
                                        n = n * 10 + (d - b'0') as u32;
                                        self.advance();
                                    }
                                    _ => break,
                                }
                            }
                            out.push(n as u8);
                        }
                        Some(b'x') => {
                            self.advance();
                            let mut n: u32 = 0;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d) if d.is_ascii_hexdigit() => {
                                        n = n * 16 + (d as char).to_digit(16).unwrap();
                                        self.advance();
                                    }
                                    _ => break,
                                }
                            }
                            out.push(n as u8);
                        }
                        _ => return Err(syntax_error(self.line, "invalid escape sequence")),
                    }
                }
                Some(_) => out.push(self.advance().unwrap()),
            }
        }
    }

    fn read_number(&mut self) -> LexResult<TokenKind> {
        let start = self.pos;
        let line = self.line;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
                self.advance();
            }
            let text = std::str::from_utf8(&self.src[start + 2..self.pos]).unwrap();
            let v = i64::from_str_radix(text, 16)
                .map(|v| v as f64)
                .or_else(|_| u64::from_str_radix(text, 16).map(|v| v as f64))
                .map_err(|_| syntax_error(line, "malformed number"))?;
            return Ok(TokenKind::TkFloat(v));
        }
        let mut is_float = false;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.') {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.advance();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        if is_float {
            let v = text.parse::<f64>().map_err(|_| syntax_error(line, "malformed number"))?;
            Ok(TokenKind::TkFloat(v))
        } else {
            match text.parse::<i64>() {
                Ok(v) => Ok(TokenKind::TkInt(v)),
                Err(_) => {
                    let v = text.parse::<f64>().map_err(|_| syntax_error(line, "malformed number"))?;
                    Ok(TokenKind::TkFloat(v))
                }
            }
        }
    }

    fn read_name(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b == b'_' || b.is_ascii_alphanumeric()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        match text {
            "and" => TokenKind::TkAnd,
            "break" => TokenKind::TkBreak,
            "do" => TokenKind::TkDo,
            "else" => TokenKind::TkElse,
            "elseif" => TokenKind::TkElseIf,
            "end" => TokenKind::TkEnd,
            "false" => TokenKind::TkFalse,
            "for" => TokenKind::TkFor,
            "function" => TokenKind::TkFunction,
            "if" => TokenKind::TkIf,
            "in" => TokenKind::TkIn,
            "local" => TokenKind::TkLocal,
            "nil" => TokenKind::TkNil,
            "not" => TokenKind::TkNot,
            "or" => TokenKind::TkOr,
            "repeat" => TokenKind::TkRepeat,
            "return" => TokenKind::TkReturn,
            "then" => TokenKind::TkThen,
            "true" => TokenKind::TkTrue,
            "until" => TokenKind::TkUntil,
            "while" => TokenKind::TkWhile,
            _ => TokenKind::TkName(smol_str::SmolStr::new(text)),
        }
    }
}
