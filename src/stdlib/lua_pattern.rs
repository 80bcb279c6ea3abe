//! Lua pattern matching, the backtracking matcher from `lstrlib.c` ported
//! byte-for-byte in spirit (character classes, `%b`/`%f`, captures, anchors)
//! rather than compiled to a real regex engine — Lua patterns aren't regular
//! expressions and don't map onto one cleanly.

const MAX_CAPTURES: usize = 32;
const CAP_UNFINISHED: isize = -1;
const CAP_POSITION: isize = -2;

#[derive(Clone, Copy)]
struct Capture {
    start: usize,
    len: isize,
}

pub struct MatchState<'a> {
    src: &'a [u8],
    pat: &'a [u8],
    captures: Vec<Capture>,
}

#[derive(Clone, Debug)]
pub enum CapValue {
    Str(Vec<u8>),
    Pos(usize),
}

impl<'a> MatchState<'a> {
    fn new(src: &'a [u8], pat: &'a [u8]) -> Self {
        MatchState { src, pat, captures: Vec::with_capacity(MAX_CAPTURES) }
    }

    fn class_end(&self, p: usize) -> Result<usize, String> {
        let mut p = p;
        let c = *self.pat.get(p).ok_or("malformed pattern (ends with '%')")?;
        p += 1;
        if c == b'%' {
            if p >= self.pat.len() {
                return Err("malformed pattern (ends with '%')".into());
            }
            return Ok(p + 1);
        }
        if c == b'[' {
            if self.pat.get(p) == Some(&b'^') {
                p += 1;
            }
            // A do-while: the char right after '[' (or '[^') is always taken
            // literally, even if it is itself ']'; only a ']' peeked
            // afterwards closes the class.
            loop {
                let consumed = *self.pat.get(p).ok_or("malformed pattern (missing ']')")?;
                p += 1;
                if consumed == b'%' {
                    if p >= self.pat.len() {
                        return Err("malformed pattern (ends with '%')".into());
                    }
                    p += 1;
                }
                if p >= self.pat.len() {
                    return Err("malformed pattern (missing ']')".into());
                }
                if self.pat[p] == b']' {
                    break;
                }
            }
            return Ok(p + 1);
        }
        Ok(p)
    }

    fn match_class(c: u8, cl: u8) -> bool {
        let res = match cl.to_ascii_lowercase() {
            b'a' => c.is_ascii_alphabetic(),
            b'd' => c.is_ascii_digit(),
            b'l' => c.is_ascii_lowercase(),
            b's' => c.is_ascii_whitespace(),
            b'u' => c.is_ascii_uppercase(),
            b'w' => c.is_ascii_alphanumeric(),
            b'c' => c.is_ascii_control(),
            b'p' => c.is_ascii_punctuation(),
            b'x' => c.is_ascii_hexdigit(),
            _ => return cl == c,
        };
        if cl.is_ascii_uppercase() {
            !res
        } else {
            res
        }
    }

    fn match_set(&self, c: u8, p_start: usize, p_end: usize) -> bool {
        let mut p = p_start + 1;
        let mut negate = false;
        if self.pat.get(p) == Some(&b'^') {
            negate = true;
            p += 1;
        }
        let mut found = false;
        while p < p_end - 1 {
            if self.pat[p] == b'%' {
                p += 1;
                if Self::match_class(c, self.pat[p]) {
                    found = true;
                }
                p += 1;
            } else if p + 2 < p_end - 1 && self.pat[p + 1] == b'-' {
                if self.pat[p] <= c && c <= self.pat[p + 2] {
                    found = true;
                }
                p += 3;
            } else {
                if self.pat[p] == c {
                    found = true;
                }
                p += 1;
            }
        }
        found != negate
    }

    fn single_match(&self, s: usize, p: usize, ep: usize) -> bool {
        let Some(&c) = self.src.get(s) else { return false };
        match self.pat[p] {
            b'.' => true,
            b'%' => Self::match_class(c, self.pat[p + 1]),
            b'[' => self.match_set(c, p, ep),
            pc => pc == c,
        }
    }

    fn do_match(&mut self, s: usize, p: usize) -> Result<Option<usize>, String> {
        if p >= self.pat.len() {
            return Ok(Some(s));
        }
        match self.pat[p] {
            b'(' => {
                if self.pat.get(p + 1) == Some(&b')') {
                    self.start_capture(s, p + 2, CAP_POSITION)
                } else {
                    self.start_capture(s, p + 1, CAP_UNFINISHED)
                }
            }
            b')' => self.end_capture(s, p + 1),
            b'$' if p + 1 == self.pat.len() => Ok((s == self.src.len()).then_some(s)),
            b'%' if matches!(self.pat.get(p + 1), Some(b'b')) => self.match_balance(s, p + 2),
            b'%' if matches!(self.pat.get(p + 1), Some(b'f')) => {
                let p2 = p + 2;
                if self.pat.get(p2) != Some(&b'[') {
                    return Err("missing '[' after '%f' in pattern".into());
                }
                let ep = self.class_end(p2)?;
                let prev = if s == 0 { 0u8 } else { self.src[s - 1] };
                let cur = self.src.get(s).copied().unwrap_or(0);
                if !self.match_set(prev, p2, ep) && self.match_set(cur, p2, ep) {
                    self.do_match(s, ep)
                } else {
                    Ok(None)
                }
            }
            b'%' if matches!(self.pat.get(p + 1), Some(d) if d.is_ascii_digit()) => {
                let idx = (self.pat[p + 1] - b'0') as usize;
                self.match_capture(s, p + 2, idx)
            }
            _ => {
                let ep = self.class_end(p)?;
                let matches_here = self.single_match(s, p, ep);
                match self.pat.get(ep) {
                    Some(b'?') => {
                        if matches_here {
                            if let Some(r) = self.do_match(s + 1, ep + 1)? {
                                return Ok(Some(r));
                            }
                        }
                        self.do_match(s, ep + 1)
                    }
                    Some(b'*') => self.max_expand(s, p, ep),
                    Some(b'+') => {
                        if matches_here {
                            self.max_expand(s + 1, p, ep)
                        } else {
                            Ok(None)
                        }
                    }
                    Some(b'-') => self.min_expand(s, p, ep),
                    _ => {
                        if matches_here {
                            self.do_match(s + 1, ep)
                        } else {
                            Ok(None)
                        }
                    }
                }
            }
        }
    }

    fn max_expand(&mut self, s: usize, p: usize, ep: usize) -> Result<Option<usize>, String> {
        let mut i = 0;
        while self.single_match(s + i, p, ep) {
            i += 1;
        }
        loop {
            if let Some(r) = self.do_match(s + i, ep + 1)? {
                return Ok(Some(r));
            }
            if i == 0 {
                return Ok(None);
            }
            i -= 1;
        }
    }

    fn min_expand(&mut self, mut s: usize, p: usize, ep: usize) -> Result<Option<usize>, String> {
        loop {
            if let Some(r) = self.do_match(s, ep + 1)? {
                return Ok(Some(r));
            }
            if self.single_match(s, p, ep) {
                s += 1;
            } else {
                return Ok(None);
            }
        }
    }

    fn start_capture(&mut self, s: usize, p: usize, what: isize) -> Result<Option<usize>, String> {
        self.captures.push(Capture { start: s, len: what });
        let r = self.do_match(s, p)?;
        if r.is_none() {
            self.captures.pop();
        }
        Ok(r)
    }

    fn end_capture(&mut self, s: usize, p: usize) -> Result<Option<usize>, String> {
        let idx = self
            .captures
            .iter()
            .rposition(|c| c.len == CAP_UNFINISHED)
            .ok_or("invalid pattern capture")?;
        self.captures[idx].len = (s - self.captures[idx].start) as isize;
        let r = self.do_match(s, p)?;
        if r.is_none() {
            self.captures[idx].len = CAP_UNFINISHED;
        }
        Ok(r)
    }

    fn match_capture(&mut self, s: usize, p: usize, idx: usize) -> Result<Option<usize>, String> {
        if idx == 0 || idx > self.captures.len() || self.captures[idx - 1].len < 0 {
            return Err("invalid capture index".into());
        }
        let cap = self.captures[idx - 1];
        let text = &self.src[cap.start..cap.start + cap.len as usize];
        if self.src[s..].starts_with(text) {
            self.do_match(s + text.len(), p)
        } else {
            Ok(None)
        }
    }

    fn match_balance(&mut self, s: usize, p: usize) -> Result<Option<usize>, String> {
        if p + 1 >= self.pat.len() {
            return Err("missing arguments to '%b'".into());
        }
        let (b, e) = (self.pat[p], self.pat[p + 1]);
        if self.src.get(s) != Some(&b) {
            return Ok(None);
        }
        let mut depth = 1;
        let mut i = s + 1;
        while i < self.src.len() {
            if self.src[i] == e {
                depth -= 1;
                if depth == 0 {
                    return self.do_match(i + 1, p + 2);
                }
            } else if self.src[i] == b {
                depth += 1;
            }
            i += 1;
        }
        Ok(None)
    }

    fn captures_at(&self, s: usize, e: usize) -> Vec<CapValue> {
        if self.captures.is_empty() {
            return vec![CapValue::Str(self.src[s..e].to_vec())];
        }
        self.captures
            .iter()
            .map(|c| {
                if c.len == CAP_POSITION {
                    CapValue::Pos(c.start + 1)
                } else {
                    CapValue::Str(self.src[c.start..c.start + c.len.max(0) as usize].to_vec())
                }
            })
            .collect()
    }
}

pub struct MatchResult {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<CapValue>,
}

/// Find the first match of `pat` in `src` starting the search at byte offset
/// `init`. `anchor` (pattern starts with `^`) is handled by the caller
/// stripping the `^` and passing it through here explicitly.
pub fn find(src: &[u8], pat: &[u8], init: usize) -> Result<Option<MatchResult>, String> {
    let (anchor, pat) = if pat.first() == Some(&b'^') { (true, &pat[1..]) } else { (false, pat) };
    let mut s = init.min(src.len());
    loop {
        let mut ms = MatchState::new(src, pat);
        if let Some(e) = ms.do_match(s, 0)? {
            let caps = ms.captures_at(s, e);
            return Ok(Some(MatchResult { start: s, end: e, captures: caps }));
        }
        if anchor || s >= src.len() {
            return Ok(None);
        }
        s += 1;
    }
}
