//! Literal and display serialization
//!
//! `to_literal` produces round-trippable MOO source text: strings quoted and
//! escaped, lists and maps fully expanded, errors by code name, floats always
//! carrying a decimal point. `parse_literal` is its inverse and accepts
//! exactly the grammar `to_literal` emits (plus surrounding whitespace); the
//! snapshot writer stores property values this way.
//!
//! `to_display` is the `tostr` rendering: scalars as natural text, LIST as
//! `"{list}"`, MAP as `"[map]"`, ERR as its human message.
//!
//! Anonymous objects and waifs serialize as opaque placeholders and are
//! excluded from the round-trip guarantee.

use crate::error::Error;
use crate::objid::Objid;
use crate::string::MooStr;
use crate::value::Var;

/// Round-trippable literal text.
pub fn to_literal(v: &Var) -> MooStr {
    let mut out = Vec::new();
    write_literal(v, &mut out);
    MooStr::from_bytes(out)
}

fn write_literal(v: &Var, out: &mut Vec<u8>) {
    match v {
        Var::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Var::Float(f) => out.extend_from_slice(float_text(*f).as_bytes()),
        Var::Obj(o) => out.extend_from_slice(o.to_string().as_bytes()),
        Var::Err(e) => out.extend_from_slice(e.name().as_bytes()),
        Var::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Var::Str(s) => {
            out.push(b'"');
            for &b in s.as_bytes() {
                if b == b'"' || b == b'\\' {
                    out.push(b'\\');
                }
                out.push(b);
            }
            out.push(b'"');
        }
        Var::List(l) => {
            out.push(b'{');
            for (i, item) in l.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(b", ");
                }
                write_literal(item, out);
            }
            out.push(b'}');
        }
        Var::Map(m) => {
            out.push(b'[');
            for (i, (k, val)) in m.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(b", ");
                }
                write_literal(k, out);
                out.extend_from_slice(b" -> ");
                write_literal(val, out);
            }
            out.push(b']');
        }
        Var::Anon(_) => out.extend_from_slice(b"*anonymous*"),
        Var::Waif(_) => out.extend_from_slice(b"*waif*"),
    }
}

/// Float text always shows a decimal point (or exponent) so it reads back as
/// FLOAT, never INT.
fn float_text(f: f64) -> String {
    // Rust's Debug for f64 is the shortest round-trip form and renders
    // integral values as "1.0".
    format!("{f:?}")
}

/// The `tostr` rendering.
pub fn to_display(v: &Var) -> MooStr {
    match v {
        Var::Int(n) => MooStr::from(n.to_string()),
        Var::Float(f) => MooStr::from(float_text(*f)),
        Var::Obj(o) => MooStr::from(o.to_string()),
        Var::Err(e) => MooStr::from_str(e.message()),
        Var::Bool(b) => MooStr::from_str(if *b { "true" } else { "false" }),
        Var::Str(s) => s.clone(),
        Var::List(_) => MooStr::from_str("{list}"),
        Var::Map(_) => MooStr::from_str("[map]"),
        Var::Anon(_) => MooStr::from_str("*anonymous*"),
        Var::Waif(_) => MooStr::from_str("*waif*"),
    }
}

/// Parse a literal produced by [`to_literal`]. The entire input (modulo
/// surrounding whitespace) must be consumed.
pub fn parse_literal(input: &[u8]) -> Result<Var, String> {
    let mut p = Lit { input, pos: 0 };
    p.skip_ws();
    let v = p.value()?;
    p.skip_ws();
    if p.pos != p.input.len() {
        return Err(format!("trailing characters at byte {}", p.pos));
    }
    Ok(v)
}

struct Lit<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lit<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), String> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{}' at byte {}", b as char, self.pos))
        }
    }

    fn value(&mut self) -> Result<Var, String> {
        match self.peek() {
            Some(b'"') => self.string(),
            Some(b'{') => self.list(),
            Some(b'[') => self.map(),
            Some(b'#') => self.objid(),
            Some(b'E') => self.error_or_number(),
            Some(b't') | Some(b'f') => self.boolean(),
            Some(c) if c == b'-' || c == b'+' || c.is_ascii_digit() => self.number(),
            Some(c) => Err(format!("unexpected '{}' at byte {}", c as char, self.pos)),
            None => Err("unexpected end of input".into()),
        }
    }

    fn string(&mut self) -> Result<Var, String> {
        self.expect(b'"')?;
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                Some(b'"') => return Ok(Var::Str(MooStr::from_bytes(bytes))),
                Some(b'\\') => match self.bump() {
                    Some(c) => bytes.push(c),
                    None => return Err("unterminated escape".into()),
                },
                Some(c) => bytes.push(c),
                None => return Err("unterminated string".into()),
            }
        }
    }

    fn list(&mut self) -> Result<Var, String> {
        self.expect(b'{')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Var::list(items));
        }
        loop {
            self.skip_ws();
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => return Ok(Var::list(items)),
                _ => return Err(format!("expected ',' or '}}' at byte {}", self.pos)),
            }
        }
    }

    fn map(&mut self) -> Result<Var, String> {
        self.expect(b'[')?;
        let mut pairs = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Var::map(pairs));
        }
        loop {
            self.skip_ws();
            let key = self.value()?;
            self.skip_ws();
            self.expect(b'-')?;
            self.expect(b'>')?;
            self.skip_ws();
            let value = self.value()?;
            pairs.push((key, value));
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => return Ok(Var::map(pairs)),
                _ => return Err(format!("expected ',' or ']' at byte {}", self.pos)),
            }
        }
    }

    fn objid(&mut self) -> Result<Var, String> {
        self.expect(b'#')?;
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
        text.parse::<i64>()
            .map(|n| Var::Obj(Objid(n)))
            .map_err(|_| format!("bad object id at byte {start}"))
    }

    fn error_or_number(&mut self) -> Result<Var, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
        Error::parse(text)
            .map(Var::Err)
            .ok_or_else(|| format!("unknown error code {text:?}"))
    }

    fn boolean(&mut self) -> Result<Var, String> {
        let rest = &self.input[self.pos..];
        if rest.starts_with(b"true") {
            self.pos += 4;
            Ok(Var::Bool(true))
        } else if rest.starts_with(b"false") {
            self.pos += 5;
            Ok(Var::Bool(false))
        } else {
            Err(format!("unexpected token at byte {}", self.pos))
        }
    }

    fn number(&mut self) -> Result<Var, String> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some(b'-' | b'+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| "bad number".to_string())?;
        if is_float {
            let f: f64 = text.parse().map_err(|_| format!("bad float {text:?}"))?;
            if !f.is_finite() {
                return Err(format!("non-finite float {text:?}"));
            }
            Ok(Var::Float(f))
        } else {
            text.parse::<i64>()
                .map(Var::Int)
                .map_err(|_| format!("bad integer {text:?}"))
        }
    }
}
