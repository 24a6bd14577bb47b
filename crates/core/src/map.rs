//! Map operations
//!
//! A MOO map is an association from keys (any value) to values. Iteration
//! order is the map's own stable order: insertion order, with in-place
//! replacement keeping the original position. Lookup is linear by `==`;
//! maps in MOO code are small and the constant factor beats hashing for
//! the common sizes.
//!
//! Ranged access is keyed, not positional: `m[a..b]` selects the entries
//! whose key falls between `a` and `b` in the cross-type sort order.

use crate::error::Error;
use crate::value::Var;
use std::cmp::Ordering;
use std::sync::Arc;

pub type Pairs = Arc<Vec<(Var, Var)>>;

/// `m[k]`; absent key raises E_RANGE.
pub fn get(pairs: &Pairs, key: &Var) -> Result<Var, Error> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .ok_or(Error::Range)
}

pub fn contains_key(pairs: &Pairs, key: &Var) -> bool {
    pairs.iter().any(|(k, _)| k == key)
}

/// `m[k] = v` (copy-on-write): replace in place or append.
pub fn set(mut pairs: Pairs, key: Var, value: Var) -> Pairs {
    let entries = Arc::make_mut(&mut pairs);
    if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
        entry.1 = value;
    } else {
        entries.push((key, value));
    }
    pairs
}

/// `mapdelete(m, k)`; absent key raises E_RANGE.
pub fn delete(mut pairs: Pairs, key: &Var) -> Result<Pairs, Error> {
    let entries = Arc::make_mut(&mut pairs);
    match entries.iter().position(|(k, _)| k == key) {
        Some(pos) => {
            entries.remove(pos);
            Ok(pairs)
        }
        None => Err(Error::Range),
    }
}

pub fn keys(pairs: &Pairs) -> Var {
    Var::list(pairs.iter().map(|(k, _)| k.clone()).collect())
}

pub fn values(pairs: &Pairs) -> Var {
    Var::list(pairs.iter().map(|(_, v)| v.clone()).collect())
}

/// Entries whose key `k` satisfies `a <= k <= b` in sort order, kept in the
/// map's own order.
pub fn range(pairs: &Pairs, a: Var, b: Var) -> Vec<(Var, Var)> {
    pairs
        .iter()
        .filter(|(k, _)| {
            k.sort_cmp(&a) != Ordering::Less && k.sort_cmp(&b) != Ordering::Greater
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Pairs {
        Arc::new(vec![
            (Var::str("a"), Var::Int(1)),
            (Var::Int(2), Var::str("two")),
        ])
    }

    #[test]
    fn get_by_any_key_type() {
        assert_eq!(get(&sample(), &Var::str("a")), Ok(Var::Int(1)));
        assert_eq!(get(&sample(), &Var::Int(2)), Ok(Var::str("two")));
        assert_eq!(get(&sample(), &Var::str("missing")), Err(Error::Range));
    }

    #[test]
    fn set_replaces_in_place_keeping_order() {
        let m = set(sample(), Var::str("a"), Var::Int(9));
        assert_eq!(m[0], (Var::str("a"), Var::Int(9)));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn set_appends_new_keys() {
        let m = set(sample(), Var::Bool(true), Var::Int(3));
        assert_eq!(m[2], (Var::Bool(true), Var::Int(3)));
    }

    #[test]
    fn set_is_copy_on_write() {
        let original = sample();
        let _m = set(original.clone(), Var::str("a"), Var::Int(9));
        assert_eq!(get(&original, &Var::str("a")), Ok(Var::Int(1)));
    }

    #[test]
    fn delete_missing_is_range_error() {
        assert!(delete(sample(), &Var::str("zzz")).is_err());
        let m = delete(sample(), &Var::Int(2)).unwrap();
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn range_selects_by_sorted_key_window() {
        let m: Pairs = Arc::new(vec![
            (Var::Int(5), Var::str("five")),
            (Var::Int(1), Var::str("one")),
            (Var::Int(3), Var::str("three")),
        ]);
        let picked = range(&m, Var::Int(2), Var::Int(5));
        assert_eq!(picked.len(), 2);
        // Map order preserved, not key order.
        assert_eq!(picked[0].0, Var::Int(5));
        assert_eq!(picked[1].0, Var::Int(3));
    }
}
