//! String builtins, including MOO pattern matching.
//!
//! MOO patterns are Emacs-style regular expressions with `%` as the escape
//! character. They are translated to the `regex` crate's syntax; the only
//! untranslatable construct is a back-reference (`%1`..`%9`) inside the
//! pattern itself, which raises E_INVARG. `%1`..`%9` in a `substitute`
//! template are fully supported.

use super::{need_args, want_int, want_list, want_str, BfFn};
use crate::vm::{Activation, Raise, TaskCtx};
use byre_core::{Error, MooStr, Var};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub fn register(map: &mut HashMap<&'static str, BfFn>) {
    map.insert("strcmp", bf_strcmp);
    map.insert("index", bf_index);
    map.insert("rindex", bf_rindex);
    map.insert("strsub", bf_strsub);
    map.insert("strtr", bf_strtr);
    map.insert("explode", bf_explode);
    map.insert("trim", bf_trim);
    map.insert("ltrim", bf_ltrim);
    map.insert("rtrim", bf_rtrim);
    map.insert("chr", bf_chr);
    map.insert("ord", bf_ord);
    map.insert("match", bf_match);
    map.insert("rmatch", bf_rmatch);
    map.insert("substitute", bf_substitute);
    map.insert("encode_binary", bf_encode_binary);
    map.insert("decode_binary", bf_decode_binary);
    map.insert("encode_base64", bf_encode_base64);
    map.insert("decode_base64", bf_decode_base64);
    map.insert("string_hash", bf_string_hash);
    map.insert("string_hmac", bf_string_hmac);
    map.insert("crypt", bf_crypt);
}

fn bf_strcmp(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let a = want_str(&args[0])?;
    let b = want_str(&args[1])?;
    let cmp = match a.as_bytes().cmp(b.as_bytes()) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    Ok(Var::Int(cmp))
}

fn fold(bytes: &[u8], case_matters: bool) -> Vec<u8> {
    if case_matters {
        bytes.to_vec()
    } else {
        bytes.to_ascii_lowercase()
    }
}

fn case_flag(args: &[Var], at: usize) -> bool {
    args.get(at).map(|v| v.is_truthy()).unwrap_or(false)
}

/// `index(subject, what [, case-matters])`: 1-based position or 0.
fn bf_index(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(3))?;
    let subject = fold(want_str(&args[0])?.as_bytes(), case_flag(&args, 2));
    let what = fold(want_str(&args[1])?.as_bytes(), case_flag(&args, 2));
    Ok(Var::Int(find_sub(&subject, &what).map(|p| p as i64 + 1).unwrap_or(0)))
}

fn bf_rindex(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(3))?;
    let subject = fold(want_str(&args[0])?.as_bytes(), case_flag(&args, 2));
    let what = fold(want_str(&args[1])?.as_bytes(), case_flag(&args, 2));
    Ok(Var::Int(rfind_sub(&subject, &what).map(|p| p as i64 + 1).unwrap_or(0)))
}

fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// `strsub(subject, what, with [, case-matters])`: replace every
/// occurrence.
fn bf_strsub(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 3, Some(4))?;
    let subject = want_str(&args[0])?;
    let what = want_str(&args[1])?;
    let with = want_str(&args[2])?;
    if what.is_empty() {
        return Err(Raise::error(Error::InvArg));
    }
    let case = case_flag(&args, 3);
    let folded_subject = fold(subject.as_bytes(), case);
    let folded_what = fold(what.as_bytes(), case);

    let mut out = Vec::with_capacity(subject.len());
    let mut i = 0;
    while i < subject.len() {
        if i + folded_what.len() <= subject.len()
            && folded_subject[i..i + folded_what.len()] == folded_what[..]
        {
            out.extend_from_slice(with.as_bytes());
            i += folded_what.len();
        } else {
            out.push(subject.as_bytes()[i]);
            i += 1;
        }
    }
    let v = Var::Str(MooStr::from_bytes(out));
    ctx.check_limits(&v)?;
    Ok(v)
}

/// `strtr(subject, from, to)`: byte-wise transliteration; `from` longer
/// than `to` deletes.
fn bf_strtr(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 3, Some(4))?;
    let subject = want_str(&args[0])?;
    let from = want_str(&args[1])?;
    let to = want_str(&args[2])?;
    let mut table: [Option<Option<u8>>; 256] = [None; 256];
    for (i, &f) in from.as_bytes().iter().enumerate() {
        table[f as usize] = Some(to.as_bytes().get(i).copied());
    }
    let mut out = Vec::with_capacity(subject.len());
    for &b in subject.as_bytes() {
        match table[b as usize] {
            None => out.push(b),
            Some(Some(t)) => out.push(t),
            Some(None) => {}
        }
    }
    Ok(Var::Str(MooStr::from_bytes(out)))
}

/// `explode(subject [, separator])`: split, dropping empty pieces.
fn bf_explode(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let subject = want_str(&args[0])?;
    let sep = match args.get(1) {
        Some(v) => want_str(v)?,
        None => MooStr::from_str(" "),
    };
    if sep.is_empty() {
        return Err(Raise::error(Error::InvArg));
    }
    let mut pieces = Vec::new();
    let bytes = subject.as_bytes();
    let sep = sep.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i + sep.len() <= bytes.len() {
        if &bytes[i..i + sep.len()] == sep {
            if i > start {
                pieces.push(Var::Str(MooStr::from_bytes(bytes[start..i].to_vec())));
            }
            i += sep.len();
            start = i;
        } else {
            i += 1;
        }
    }
    if start < bytes.len() {
        pieces.push(Var::Str(MooStr::from_bytes(bytes[start..].to_vec())));
    }
    Ok(Var::list(pieces))
}

fn trim_set(args: &[Var], at: usize) -> Result<Vec<u8>, Raise> {
    match args.get(at) {
        Some(v) => Ok(want_str(v)?.as_bytes().to_vec()),
        None => Ok(vec![b' ', b'\t']),
    }
}

fn bf_trim(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let s = want_str(&args[0])?;
    let set = trim_set(&args, 1)?;
    let bytes = s.as_bytes();
    let start = bytes.iter().position(|b| !set.contains(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !set.contains(b)).map(|e| e + 1).unwrap_or(start);
    Ok(Var::Str(MooStr::from_bytes(bytes[start..end].to_vec())))
}

fn bf_ltrim(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let s = want_str(&args[0])?;
    let set = trim_set(&args, 1)?;
    let bytes = s.as_bytes();
    let start = bytes.iter().position(|b| !set.contains(b)).unwrap_or(bytes.len());
    Ok(Var::Str(MooStr::from_bytes(bytes[start..].to_vec())))
}

fn bf_rtrim(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let s = want_str(&args[0])?;
    let set = trim_set(&args, 1)?;
    let bytes = s.as_bytes();
    let end = bytes.iter().rposition(|b| !set.contains(b)).map(|e| e + 1).unwrap_or(0);
    Ok(Var::Str(MooStr::from_bytes(bytes[..end].to_vec())))
}

fn bf_chr(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let n = want_int(&args[0])?;
    if !(1..=255).contains(&n) {
        return Err(Raise::error(Error::InvArg));
    }
    Ok(Var::Str(MooStr::from_bytes(vec![n as u8])))
}

fn bf_ord(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let s = want_str(&args[0])?;
    match s.as_bytes().first() {
        Some(&b) => Ok(Var::Int(b as i64)),
        None => Err(Raise::error(Error::InvArg)),
    }
}

// ----------------------------------------------------------------------
// MOO patterns
// ----------------------------------------------------------------------

/// Translate a MOO `%`-pattern to `regex` syntax.
fn moo_pattern_to_regex(pattern: &str, case_matters: bool) -> Result<regex::Regex, Raise> {
    let mut out = String::new();
    if !case_matters {
        out.push_str("(?i)");
    }
    // The subject is treated as a single line, like the original matcher.
    out.push_str("(?s)");
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '%' {
            i += 1;
            let Some(&next) = bytes.get(i) else {
                return Err(Raise::error(Error::InvArg));
            };
            match next as char {
                '(' => out.push('('),
                ')' => out.push(')'),
                '|' => out.push('|'),
                'b' | 'B' => out.push_str(if next == b'b' { r"\b" } else { r"\B" }),
                'w' => out.push_str(r"\w"),
                'W' => out.push_str(r"\W"),
                '<' | '>' => out.push_str(r"\b"),
                '1'..='9' => {
                    // Back-references inside the pattern have no regex
                    // crate equivalent.
                    return Err(Raise::error(Error::InvArg));
                }
                other => out.push_str(&regex::escape(&other.to_string())),
            }
            i += 1;
        } else {
            match c {
                '(' | ')' | '|' | '{' | '}' | '\\' => {
                    out.push_str(&regex::escape(&c.to_string()))
                }
                // . * + ? [ ] ^ $ keep their meaning.
                _ => out.push(c),
            }
            i += 1;
        }
    }
    regex::Regex::new(&out).map_err(|_| Raise::error(Error::InvArg))
}

/// Build the `{start, end, replacements, subject}` match result.
fn match_result(caps: &regex::Captures, subject: &MooStr) -> Var {
    let whole = caps.get(0).expect("capture 0 always present");
    let mut groups = Vec::with_capacity(9);
    for i in 1..=9 {
        let pair = match caps.get(i) {
            Some(m) => vec![Var::Int(m.start() as i64 + 1), Var::Int(m.end() as i64)],
            None => vec![Var::Int(0), Var::Int(-1)],
        };
        groups.push(Var::list(pair));
    }
    Var::list(vec![
        Var::Int(whole.start() as i64 + 1),
        Var::Int(whole.end() as i64),
        Var::list(groups),
        Var::Str(subject.clone()),
    ])
}

fn do_match(args: &[Var], last: bool) -> Result<Var, Raise> {
    need_args(args, 2, Some(3))?;
    let subject = want_str(&args[0])?;
    let pattern = want_str(&args[1])?;
    let case = args.get(2).map(|v| v.is_truthy()).unwrap_or(false);
    let re = moo_pattern_to_regex(&pattern.to_string_lossy(), case)?;
    let text = subject.to_string_lossy();
    let caps = if last {
        let mut found = None;
        let mut at = 0;
        while let Some(c) = re.captures_at(&text, at) {
            let start = c.get(0).expect("capture 0").start();
            let end = c.get(0).expect("capture 0").end();
            found = Some(c);
            at = if end > start { end } else { end + 1 };
            if at > text.len() {
                break;
            }
        }
        found
    } else {
        re.captures(&text)
    };
    Ok(match caps {
        Some(c) => match_result(&c, &subject),
        None => Var::empty_list(),
    })
}

fn bf_match(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    do_match(&args, false)
}

fn bf_rmatch(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    do_match(&args, true)
}

/// `substitute(template, match_result)`: `%0`..`%9` pull captured spans
/// out of the matched subject; `%%` is a literal percent.
fn bf_substitute(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    substitute_impl(&args)
}

fn substitute_impl(args: &[Var]) -> Result<Var, Raise> {
    need_args(args, 2, Some(2))?;
    let template = want_str(&args[0])?;
    let subs = want_list(&args[1])?;
    if subs.len() != 4 {
        return Err(Raise::error(Error::InvArg));
    }
    let start = want_int(&subs[0])?;
    let end = want_int(&subs[1])?;
    let groups = want_list(&subs[2])?;
    let subject = want_str(&subs[3])?;
    if groups.len() != 9 {
        return Err(Raise::error(Error::InvArg));
    }

    let span = |s: i64, e: i64| -> Result<Vec<u8>, Raise> {
        if s == 0 && e == -1 {
            return Ok(Vec::new());
        }
        if s < 1 || e < s - 1 || e as usize > subject.len() {
            return Err(Raise::error(Error::InvArg));
        }
        Ok(subject.as_bytes()[(s - 1) as usize..e as usize].to_vec())
    };

    let mut out = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let Some(&next) = bytes.get(i + 1) else {
                return Err(Raise::error(Error::InvArg));
            };
            match next {
                b'%' => out.push(b'%'),
                b'0' => out.extend_from_slice(&span(start, end)?),
                b'1'..=b'9' => {
                    let g = &groups[(next - b'1') as usize];
                    let pair = want_list(g)?;
                    if pair.len() != 2 {
                        return Err(Raise::error(Error::InvArg));
                    }
                    out.extend_from_slice(&span(want_int(&pair[0])?, want_int(&pair[1])?)?);
                }
                _ => return Err(Raise::error(Error::InvArg)),
            }
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(Var::Str(MooStr::from_bytes(out)))
}

// ----------------------------------------------------------------------
// Encodings and hashes
// ----------------------------------------------------------------------

fn bf_encode_binary(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let s = want_str(&args[0])?;
    Ok(Var::Str(s.encode_binary()))
}

fn bf_decode_binary(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let s = want_str(&args[0])?;
    s.decode_binary()
        .map(Var::Str)
        .map_err(|_| Raise::error(Error::InvArg))
}

fn bf_encode_base64(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    use base64::Engine;
    let s = want_str(&args[0])?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(s.as_bytes());
    Ok(Var::str(&encoded))
}

fn bf_decode_base64(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    use base64::Engine;
    let s = want_str(&args[0])?;
    let text: String = s
        .to_string_lossy()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map(|bytes| Var::Str(MooStr::from_bytes(bytes)))
        .map_err(|_| Raise::error(Error::InvArg))
}

/// `string_hash(str [, algorithm])`: SHA-256 only; the historical MD5 and
/// SHA-1 names are rejected rather than silently weakened.
fn bf_string_hash(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    if let Some(alg) = args.get(1) {
        let name = want_str(alg)?.to_string_lossy().to_ascii_uppercase();
        if name != "SHA256" && name != "SHA-256" {
            return Err(Raise::error(Error::InvArg));
        }
    }
    let s = want_str(&args[0])?;
    let digest = Sha256::digest(s.as_bytes());
    Ok(Var::str(&hex::encode(digest)))
}

fn bf_string_hmac(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let s = want_str(&args[0])?;
    let key = want_str(&args[1])?;
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|_| Raise::error(Error::InvArg))?;
    mac.update(s.as_bytes());
    Ok(Var::str(&hex::encode(mac.finalize().into_bytes())))
}

/// `crypt` is a platform stub: byre does not link a crypt(3).
fn bf_crypt(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    want_str(&args[0])?;
    Err(Raise::error_msg(
        Error::InvArg,
        "crypt() is unsupported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Var {
        Var::str(text)
    }

    #[test]
    fn pattern_translation_groups_and_classes() {
        let re = moo_pattern_to_regex("%(%w+%) here", false).unwrap();
        let caps = re.captures("word here").unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "word");
        // Parens without % are literal.
        let re = moo_pattern_to_regex("(x)", false).unwrap();
        assert!(re.is_match("(x)"));
        assert!(!re.is_match("x"));
    }

    #[test]
    fn pattern_backrefs_are_rejected() {
        assert!(moo_pattern_to_regex("%(a%)%1", false).is_err());
    }

    #[test]
    fn match_is_case_insensitive_by_default() {
        let out = do_match(&[s("Hello"), s("hello")], false).unwrap();
        let Var::List(items) = out else { panic!() };
        assert_eq!(items[0], Var::Int(1));
        assert_eq!(items[1], Var::Int(5));
        let out = do_match(&[s("Hello"), s("hello"), Var::Int(1)], false).unwrap();
        assert_eq!(out, Var::empty_list());
    }

    #[test]
    fn rmatch_finds_the_last_occurrence() {
        let out = do_match(&[s("aXbXc"), s("x")], true).unwrap();
        let Var::List(items) = out else { panic!() };
        assert_eq!(items[0], Var::Int(4));
    }

    #[test]
    fn substitute_replays_groups() {
        let m = do_match(&[s("*** once ***"), s("%(o%w+%)")], false).unwrap();
        let out = substitute_impl(&[s("<%1> and <%0>"), m]).unwrap();
        assert_eq!(out, s("<once> and <once>"));
    }

    #[test]
    fn substitute_unmatched_group_is_empty() {
        let m = do_match(&[s("abc"), s("a%(x%)?%(b%)")], false).unwrap();
        let out = substitute_impl(&[s("[%1][%2]"), m]).unwrap();
        assert_eq!(out, s("[][b]"));
    }
}
