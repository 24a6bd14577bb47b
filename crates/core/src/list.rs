//! List, string and sequence operations
//!
//! MOO sequences are 1-indexed. Reads out of range raise E_RANGE; ranged
//! reads with `start > end` yield the empty container without error.
//!
//! All "mutating" operations take their receiver by value and return a new
//! `Var`. When the receiver's `Arc` is uniquely held the payload is reused
//! in place (`Arc::make_mut`), otherwise it is cloned first; either way the
//! caller observes value semantics and aliases are never disturbed.

use crate::error::Error;
use crate::string::MooStr;
use crate::value::Var;
use std::sync::Arc;

/// `length(v)` for LIST, MAP and STR (byte count).
pub fn length(v: &Var) -> Result<i64, Error> {
    match v {
        Var::List(l) => Ok(l.len() as i64),
        Var::Map(m) => Ok(m.len() as i64),
        Var::Str(s) => Ok(s.len() as i64),
        _ => Err(Error::Type),
    }
}

fn check_index(i: i64, len: usize) -> Result<usize, Error> {
    if i < 1 || i as usize > len {
        Err(Error::Range)
    } else {
        Ok((i - 1) as usize)
    }
}

/// `v[i]` for LIST and STR. The map read path is in `map::get`.
pub fn index(v: &Var, i: &Var) -> Result<Var, Error> {
    match v {
        Var::List(l) => {
            let Var::Int(i) = i else { return Err(Error::Type) };
            let idx = check_index(*i, l.len())?;
            Ok(l[idx].clone())
        }
        Var::Str(s) => {
            let Var::Int(i) = i else { return Err(Error::Type) };
            let idx = check_index(*i, s.len())?;
            Ok(Var::Str(MooStr::from_bytes(vec![s.as_bytes()[idx]])))
        }
        Var::Map(m) => crate::map::get(m, i),
        _ => Err(Error::Type),
    }
}

/// `v[a..b]` for LIST and STR. `a > b` yields the empty container with no
/// bounds check; otherwise both ends must lie in `1..=len`.
pub fn range(v: &Var, a: i64, b: i64) -> Result<Var, Error> {
    match v {
        Var::List(l) => {
            if a > b {
                return Ok(Var::empty_list());
            }
            let start = check_index(a, l.len())?;
            let end = check_index(b, l.len())?;
            Ok(Var::list(l[start..=end].to_vec()))
        }
        Var::Str(s) => {
            if a > b {
                return Ok(Var::str(""));
            }
            let start = check_index(a, s.len())?;
            let end = check_index(b, s.len())?;
            Ok(Var::Str(MooStr::from_bytes(s.as_bytes()[start..=end].to_vec())))
        }
        Var::Map(m) => Ok(Var::Map(Arc::new(crate::map::range(m, v_a(a), v_b(b))))),
        _ => Err(Error::Type),
    }
}

// Map ranges are keyed, not positional; integer endpoints arrive here only
// from the generic range path and are treated as INT keys.
fn v_a(a: i64) -> Var {
    Var::Int(a)
}
fn v_b(b: i64) -> Var {
    Var::Int(b)
}

/// `v[i] = x` (copy-on-write). For STR, `x` must be a single byte.
pub fn index_set(v: Var, i: &Var, x: Var) -> Result<Var, Error> {
    match v {
        Var::List(mut l) => {
            let Var::Int(i) = i else { return Err(Error::Type) };
            let idx = check_index(*i, l.len())?;
            Arc::make_mut(&mut l)[idx] = x;
            Ok(Var::List(l))
        }
        Var::Str(s) => {
            let Var::Int(i) = i else { return Err(Error::Type) };
            let idx = check_index(*i, s.len())?;
            let Var::Str(rep) = x else { return Err(Error::Type) };
            if rep.len() != 1 {
                return Err(Error::InvArg);
            }
            let mut bytes = s.as_bytes().to_vec();
            bytes[idx] = rep.as_bytes()[0];
            Ok(Var::Str(MooStr::from_bytes(bytes)))
        }
        Var::Map(m) => Ok(Var::Map(crate::map::set(m, i.clone(), x))),
        _ => Err(Error::Type),
    }
}

/// `v[a..b] = r` (copy-on-write range replacement). The replaced slice and
/// the replacement may differ in length. With `a > b` the empty slice just
/// before position `a` is replaced, i.e. the contents are inserted there;
/// the insertion point must lie in `1..=len+1`.
pub fn range_set(v: Var, a: i64, b: i64, r: Var) -> Result<Var, Error> {
    match v {
        Var::List(l) => {
            let Var::List(r) = r else { return Err(Error::Type) };
            let items = splice_bounds(l.len(), a, b)?;
            let mut out = Vec::with_capacity(l.len() + r.len());
            out.extend_from_slice(&l[..items.0]);
            out.extend_from_slice(&r);
            out.extend_from_slice(&l[items.1..]);
            Ok(Var::list(out))
        }
        Var::Str(s) => {
            let Var::Str(r) = r else { return Err(Error::Type) };
            let items = splice_bounds(s.len(), a, b)?;
            let mut out = Vec::with_capacity(s.len() + r.len());
            out.extend_from_slice(&s.as_bytes()[..items.0]);
            out.extend_from_slice(r.as_bytes());
            out.extend_from_slice(&s.as_bytes()[items.1..]);
            Ok(Var::Str(MooStr::from_bytes(out)))
        }
        _ => Err(Error::Type),
    }
}

/// Resolve `[a..b]` assignment bounds to a half-open byte/element window.
fn splice_bounds(len: usize, a: i64, b: i64) -> Result<(usize, usize), Error> {
    if a > b {
        // Empty slice: insert before position a.
        if a < 1 || a as usize > len + 1 {
            return Err(Error::Range);
        }
        let at = (a - 1) as usize;
        Ok((at, at))
    } else {
        let start = check_index(a, len)?;
        let end = check_index(b, len)?;
        Ok((start, end + 1))
    }
}

/// `listappend(list, value [, index])`: insert *after* `index`; index 0
/// prepends; out of range raises E_RANGE.
pub fn listappend(list: Var, value: Var, index: Option<i64>) -> Result<Var, Error> {
    let Var::List(mut l) = list else { return Err(Error::Type) };
    let len = l.len();
    let after = index.unwrap_or(len as i64);
    if after < 0 || after as usize > len {
        return Err(Error::Range);
    }
    Arc::make_mut(&mut l).insert(after as usize, value);
    Ok(Var::List(l))
}

/// `listinsert(list, value [, index])`: insert *before* `index`, clamped to
/// `[1, len+1]`.
pub fn listinsert(list: Var, value: Var, index: Option<i64>) -> Result<Var, Error> {
    let Var::List(mut l) = list else { return Err(Error::Type) };
    let len = l.len();
    let before = index.unwrap_or(1).clamp(1, len as i64 + 1);
    Arc::make_mut(&mut l).insert((before - 1) as usize, value);
    Ok(Var::List(l))
}

/// `listdelete(list, index)`.
pub fn listdelete(list: Var, index: i64) -> Result<Var, Error> {
    let Var::List(mut l) = list else { return Err(Error::Type) };
    let idx = check_index(index, l.len())?;
    Arc::make_mut(&mut l).remove(idx);
    Ok(Var::List(l))
}

/// `setadd(list, value)`: append unless already present. Existing duplicate
/// elements are left alone.
pub fn setadd(list: Var, value: Var) -> Result<Var, Error> {
    let Var::List(mut l) = list else { return Err(Error::Type) };
    if !l.iter().any(|e| *e == value) {
        Arc::make_mut(&mut l).push(value);
    }
    Ok(Var::List(l))
}

/// `setremove(list, value)`: remove the first occurrence by `==`.
pub fn setremove(list: Var, value: Var) -> Result<Var, Error> {
    let Var::List(mut l) = list else { return Err(Error::Type) };
    if let Some(pos) = l.iter().position(|e| *e == value) {
        Arc::make_mut(&mut l).remove(pos);
    }
    Ok(Var::List(l))
}

/// `is_member(value, list)` and the `in` operator: 1-based index or 0.
pub fn is_member(value: &Var, list: &Var) -> Result<i64, Error> {
    let Var::List(l) = list else { return Err(Error::Type) };
    Ok(l.iter()
        .position(|e| e == value)
        .map(|p| p as i64 + 1)
        .unwrap_or(0))
}

pub fn reverse(list: Var) -> Result<Var, Error> {
    match list {
        Var::List(mut l) => {
            Arc::make_mut(&mut l).reverse();
            Ok(Var::List(l))
        }
        Var::Str(s) => {
            let mut bytes = s.as_bytes().to_vec();
            bytes.reverse();
            Ok(Var::Str(MooStr::from_bytes(bytes)))
        }
        _ => Err(Error::Type),
    }
}

/// `sort(list [, reverse])` using the cross-type total order, so mixed lists
/// sort by type tag first. The sort is stable.
pub fn sort(list: Var, reverse: bool) -> Result<Var, Error> {
    let Var::List(mut l) = list else { return Err(Error::Type) };
    let items = Arc::make_mut(&mut l);
    items.sort_by(|a, b| a.sort_cmp(b));
    if reverse {
        items.reverse();
    }
    Ok(Var::List(l))
}

/// `unique(list)`: drop later duplicates by `==`, preserving first-seen
/// order. Quadratic, like the original; lists here are small.
pub fn unique(list: Var) -> Result<Var, Error> {
    let Var::List(l) = list else { return Err(Error::Type) };
    let mut out: Vec<Var> = Vec::with_capacity(l.len());
    for item in l.iter() {
        if !out.iter().any(|e| e == item) {
            out.push(item.clone());
        }
    }
    Ok(Var::list(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l123() -> Var {
        Var::list(vec![Var::Int(1), Var::Int(2), Var::Int(3)])
    }

    #[test]
    fn index_is_one_based() {
        assert_eq!(index(&l123(), &Var::Int(1)), Ok(Var::Int(1)));
        assert_eq!(index(&l123(), &Var::Int(3)), Ok(Var::Int(3)));
        assert_eq!(index(&l123(), &Var::Int(0)), Err(Error::Range));
        assert_eq!(index(&l123(), &Var::Int(4)), Err(Error::Range));
        assert_eq!(index(&l123(), &Var::str("x")), Err(Error::Type));
    }

    #[test]
    fn string_index_yields_one_byte_string() {
        assert_eq!(index(&Var::str("abc"), &Var::Int(2)), Ok(Var::str("b")));
    }

    #[test]
    fn reversed_range_is_empty_without_bounds_check() {
        assert_eq!(range(&l123(), 3, 1), Ok(Var::empty_list()));
        assert_eq!(range(&l123(), 99, -5), Ok(Var::empty_list()));
        assert_eq!(range(&Var::str("abc"), 3, 1), Ok(Var::str("")));
    }

    #[test]
    fn forward_range_is_bounds_checked() {
        assert_eq!(
            range(&l123(), 1, 2),
            Ok(Var::list(vec![Var::Int(1), Var::Int(2)]))
        );
        assert_eq!(range(&l123(), 1, 4), Err(Error::Range));
        assert_eq!(range(&l123(), 0, 2), Err(Error::Range));
    }

    #[test]
    fn index_set_is_copy_on_write() {
        let a = l123();
        let b = index_set(a.clone(), &Var::Int(1), Var::Int(99)).unwrap();
        assert_eq!(index(&a, &Var::Int(1)), Ok(Var::Int(1)));
        assert_eq!(index(&b, &Var::Int(1)), Ok(Var::Int(99)));
    }

    #[test]
    fn range_set_can_grow_and_shrink() {
        let grown = range_set(l123(), 2, 2, Var::list(vec![Var::Int(8), Var::Int(9)])).unwrap();
        assert_eq!(
            grown,
            Var::list(vec![Var::Int(1), Var::Int(8), Var::Int(9), Var::Int(3)])
        );
        let shrunk = range_set(l123(), 1, 2, Var::empty_list()).unwrap();
        assert_eq!(shrunk, Var::list(vec![Var::Int(3)]));
    }

    #[test]
    fn range_set_with_reversed_bounds_inserts() {
        let v = range_set(l123(), 2, 1, Var::list(vec![Var::str("x")])).unwrap();
        assert_eq!(
            v,
            Var::list(vec![Var::Int(1), Var::str("x"), Var::Int(2), Var::Int(3)])
        );
        // Insertion point past len+1 is a range error.
        assert!(range_set(l123(), 5, 4, Var::empty_list()).is_err());
    }

    #[test]
    fn range_set_requires_matching_container() {
        assert_eq!(
            range_set(l123(), 1, 1, Var::str("x")),
            Err(Error::Type)
        );
        assert_eq!(
            range_set(Var::str("abc"), 1, 1, Var::empty_list()),
            Err(Error::Type)
        );
    }

    #[test]
    fn listappend_semantics() {
        let v = listappend(l123(), Var::Int(9), Some(0)).unwrap();
        assert_eq!(index(&v, &Var::Int(1)), Ok(Var::Int(9)));
        let v = listappend(l123(), Var::Int(9), None).unwrap();
        assert_eq!(index(&v, &Var::Int(4)), Ok(Var::Int(9)));
        assert_eq!(listappend(l123(), Var::Int(9), Some(7)), Err(Error::Range));
    }

    #[test]
    fn listinsert_clamps() {
        let v = listinsert(l123(), Var::Int(9), Some(99)).unwrap();
        assert_eq!(index(&v, &Var::Int(4)), Ok(Var::Int(9)));
        let v = listinsert(l123(), Var::Int(9), Some(-5)).unwrap();
        assert_eq!(index(&v, &Var::Int(1)), Ok(Var::Int(9)));
    }

    #[test]
    fn setadd_checks_existence_only() {
        let dupes = Var::list(vec![Var::Int(1), Var::Int(1)]);
        // Already present: unchanged, duplicates not collapsed.
        assert_eq!(setadd(dupes.clone(), Var::Int(1)).unwrap(), dupes);
        assert_eq!(
            setadd(dupes, Var::Int(2)).unwrap(),
            Var::list(vec![Var::Int(1), Var::Int(1), Var::Int(2)])
        );
    }

    #[test]
    fn setremove_removes_first_occurrence() {
        let dupes = Var::list(vec![Var::Int(1), Var::Int(2), Var::Int(1)]);
        assert_eq!(
            setremove(dupes, Var::Int(1)).unwrap(),
            Var::list(vec![Var::Int(2), Var::Int(1)])
        );
    }

    #[test]
    fn is_member_returns_one_based_index() {
        let l = Var::list(vec![Var::str("a"), Var::str("b"), Var::str("c")]);
        assert_eq!(is_member(&Var::str("b"), &l), Ok(2));
        assert_eq!(is_member(&Var::str("z"), &l), Ok(0));
    }

    #[test]
    fn sort_handles_mixed_types() {
        let mixed = Var::list(vec![Var::str("a"), Var::Int(2), Var::Int(1)]);
        assert_eq!(
            sort(mixed, false).unwrap(),
            Var::list(vec![Var::Int(1), Var::Int(2), Var::str("a")])
        );
    }

    #[test]
    fn unique_preserves_first_seen_order() {
        let l = Var::list(vec![Var::Int(2), Var::Int(1), Var::Int(2), Var::Int(1)]);
        assert_eq!(
            unique(l).unwrap(),
            Var::list(vec![Var::Int(2), Var::Int(1)])
        );
    }
}
