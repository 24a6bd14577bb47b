//! `Var`: the MOO tagged value
//!
//! Every value carries its variant tag; there is no implicit coercion.
//! Composites (List, Map) and strings are `Arc`-shared so that cloning is
//! O(1); mutation goes through the copy-on-write paths in `list`/`map`.
//!
//! Equality is type-strict and structural (`1 == 1.0` is false, floats
//! compare bitwise). Ordering is defined only within INT, FLOAT, STR and
//! OBJ pairs; everything else raises E_TYPE. A separate *sort order* gives
//! a total order across types for the `sort` builtin and map-key ranges.

use crate::error::Error;
use crate::objid::Objid;
use crate::string::MooStr;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

/// Handle to an anonymous object.
///
/// The object record itself lives in the store's anonymous arena at `slot`;
/// this handle carries only the invalidation bit, flipped by the store when
/// any persistent ancestor undergoes a structural change. Invalidation is
/// permanent.
#[derive(Debug)]
pub struct AnonRef {
    pub slot: usize,
    invalid: AtomicBool,
}

impl AnonRef {
    pub fn new(slot: usize) -> Self {
        AnonRef {
            slot,
            invalid: AtomicBool::new(false),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(AtomicOrdering::Acquire)
    }

    pub fn invalidate(&self) {
        self.invalid.store(true, AtomicOrdering::Release);
    }
}

/// A waif: a lightweight instance bound to a class object.
///
/// Waif properties live in their own bag, a namespace distinct from object
/// properties. Waifs compare by identity.
#[derive(Debug)]
pub struct WaifRef {
    pub class: Objid,
    pub owner: Objid,
    pub props: Mutex<HashMap<String, Var>>,
}

impl WaifRef {
    pub fn new(class: Objid, owner: Objid) -> Self {
        WaifRef {
            class,
            owner,
            props: Mutex::new(HashMap::new()),
        }
    }
}

/// Alias for the list payload; kept distinct so signatures read as intent.
pub type Sequence = Vec<Var>;

/// The MOO value universe.
#[derive(Debug, Clone)]
pub enum Var {
    Int(i64),
    Float(f64),
    Str(MooStr),
    Obj(Objid),
    Err(Error),
    Bool(bool),
    List(Arc<Vec<Var>>),
    Map(Arc<Vec<(Var, Var)>>),
    Anon(Arc<AnonRef>),
    Waif(Arc<WaifRef>),
}

impl Var {
    // Constructors kept short because they appear everywhere.
    pub fn str(s: &str) -> Var {
        Var::Str(MooStr::from_str(s))
    }

    pub fn string(s: String) -> Var {
        Var::Str(MooStr::from(s))
    }

    pub fn list(items: Vec<Var>) -> Var {
        Var::List(Arc::new(items))
    }

    pub fn map(pairs: Vec<(Var, Var)>) -> Var {
        Var::Map(Arc::new(pairs))
    }

    pub fn empty_list() -> Var {
        Var::List(Arc::new(Vec::new()))
    }

    pub fn empty_map() -> Var {
        Var::Map(Arc::new(Vec::new()))
    }

    pub fn obj(id: i64) -> Var {
        Var::Obj(Objid(id))
    }

    /// The `typeof` code. Scalar codes follow the LambdaMOO numbering with
    /// the extension types appended.
    pub fn type_code(&self) -> i64 {
        match self {
            Var::Int(_) => 0,
            Var::Obj(_) => 1,
            Var::Str(_) => 2,
            Var::Err(_) => 3,
            Var::List(_) => 4,
            Var::Float(_) => 9,
            Var::Map(_) => 10,
            Var::Anon(_) => 12,
            Var::Waif(_) => 13,
            Var::Bool(_) => 14,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Var::Int(_) => "int",
            Var::Obj(_) => "obj",
            Var::Str(_) => "str",
            Var::Err(_) => "err",
            Var::List(_) => "list",
            Var::Float(_) => "float",
            Var::Map(_) => "map",
            Var::Anon(_) => "anon",
            Var::Waif(_) => "waif",
            Var::Bool(_) => "bool",
        }
    }

    /// Truth: 0, 0.0, "", {}, [], negative object ids, E_NONE and `false`
    /// are falsy; everything else (including non-zero error codes) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Var::Int(n) => *n != 0,
            Var::Float(f) => *f != 0.0,
            Var::Str(s) => !s.is_empty(),
            Var::Obj(o) => o.0 >= 0,
            Var::Err(e) => *e != Error::None,
            Var::Bool(b) => *b,
            Var::List(l) => !l.is_empty(),
            Var::Map(m) => !m.is_empty(),
            Var::Anon(_) | Var::Waif(_) => true,
        }
    }

    /// Ordering for `<` / `<=` / `>` / `>=`. Defined only within
    /// {INT, FLOAT, STR (byte-wise), OBJ}; all other pairs are E_TYPE.
    pub fn compare(&self, other: &Var) -> Result<Ordering, Error> {
        match (self, other) {
            (Var::Int(a), Var::Int(b)) => Ok(a.cmp(b)),
            // NaN cannot exist as a value, so partial_cmp always succeeds.
            (Var::Float(a), Var::Float(b)) => {
                a.partial_cmp(b).ok_or(Error::Float)
            }
            (Var::Str(a), Var::Str(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            (Var::Obj(a), Var::Obj(b)) => Ok(a.cmp(b)),
            _ => Err(Error::Type),
        }
    }

    fn sort_tag(&self) -> u8 {
        match self {
            Var::Int(_) => 0,
            Var::Obj(_) => 1,
            Var::Float(_) => 2,
            Var::Err(_) => 3,
            Var::Str(_) => 4,
            Var::Bool(_) => 5,
            Var::List(_) => 6,
            Var::Map(_) => 7,
            Var::Anon(_) => 8,
            Var::Waif(_) => 9,
        }
    }

    /// Total order across all types: by type tag first, then by value
    /// within the tag. Used by `sort` and by map-key range matching.
    pub fn sort_cmp(&self, other: &Var) -> Ordering {
        let tag = self.sort_tag().cmp(&other.sort_tag());
        if tag != Ordering::Equal {
            return tag;
        }
        match (self, other) {
            (Var::Int(a), Var::Int(b)) => a.cmp(b),
            (Var::Obj(a), Var::Obj(b)) => a.cmp(b),
            (Var::Float(a), Var::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Var::Err(a), Var::Err(b)) => a.cmp(b),
            (Var::Str(a), Var::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Var::Bool(a), Var::Bool(b)) => a.cmp(b),
            (Var::List(a), Var::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let c = x.sort_cmp(y);
                    if c != Ordering::Equal {
                        return c;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Var::Map(a), Var::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let c = ka.sort_cmp(kb);
                    if c != Ordering::Equal {
                        return c;
                    }
                    let c = va.sort_cmp(vb);
                    if c != Ordering::Equal {
                        return c;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Var::Anon(a), Var::Anon(b)) => a.slot.cmp(&b.slot),
            (Var::Waif(a), Var::Waif(b)) => {
                (Arc::as_ptr(a) as usize).cmp(&(Arc::as_ptr(b) as usize))
            }
            _ => unreachable!("sort_tag matched but variants differ"),
        }
    }

    /// Structural byte-size estimate used by quota enforcement and exposed
    /// via `value_bytes`.
    ///
    /// Constants: 16 per scalar; strings add their byte length plus a NUL;
    /// lists and maps cost two headers plus their contents. Stable within a
    /// run and strictly monotone under element insertion.
    pub fn value_bytes(&self) -> usize {
        const VAR_SIZE: usize = 16;
        match self {
            Var::Int(_)
            | Var::Float(_)
            | Var::Obj(_)
            | Var::Err(_)
            | Var::Bool(_)
            | Var::Anon(_)
            | Var::Waif(_) => VAR_SIZE,
            Var::Str(s) => VAR_SIZE + s.len() + 1,
            Var::List(l) => {
                2 * VAR_SIZE + l.iter().map(Var::value_bytes).sum::<usize>()
            }
            Var::Map(m) => {
                2 * VAR_SIZE
                    + m.iter()
                        .map(|(k, v)| k.value_bytes() + v.value_bytes())
                        .sum::<usize>()
            }
        }
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Var) -> bool {
        match (self, other) {
            (Var::Int(a), Var::Int(b)) => a == b,
            // Bitwise: no epsilon, and 0.0 != -0.0. NaN cannot exist.
            (Var::Float(a), Var::Float(b)) => a.to_bits() == b.to_bits(),
            (Var::Str(a), Var::Str(b)) => a == b,
            (Var::Obj(a), Var::Obj(b)) => a == b,
            (Var::Err(a), Var::Err(b)) => a == b,
            (Var::Bool(a), Var::Bool(b)) => a == b,
            (Var::List(a), Var::List(b)) => a == b,
            (Var::Map(a), Var::Map(b)) => a == b,
            (Var::Anon(a), Var::Anon(b)) => Arc::ptr_eq(a, b),
            (Var::Waif(a), Var::Waif(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Var {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_type_strict() {
        assert_ne!(Var::Int(1), Var::Float(1.0));
        assert_ne!(Var::Int(1), Var::Bool(true));
        assert_ne!(Var::Int(0), Var::Err(Error::None));
        assert_eq!(Var::str("abc"), Var::str("abc"));
        assert_ne!(Var::str("abc"), Var::str("ABC"));
    }

    #[test]
    fn list_equality_is_structural() {
        let a = Var::list(vec![Var::Int(1), Var::str("x")]);
        let b = Var::list(vec![Var::Int(1), Var::str("x")]);
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_rejects_mixed_types() {
        assert_eq!(Var::Int(1).compare(&Var::Float(2.0)), Err(Error::Type));
        assert_eq!(Var::Err(Error::Type).compare(&Var::Err(Error::Div)), Err(Error::Type));
        assert_eq!(Var::Int(1).compare(&Var::Int(2)), Ok(Ordering::Less));
    }

    #[test]
    fn string_ordering_is_byte_wise() {
        assert_eq!(
            Var::str("Z").compare(&Var::str("a")),
            Ok(Ordering::Less),
            "uppercase sorts before lowercase in byte order"
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Var::Int(0).is_truthy());
        assert!(!Var::Float(0.0).is_truthy());
        assert!(!Var::str("").is_truthy());
        assert!(!Var::empty_list().is_truthy());
        assert!(!Var::empty_map().is_truthy());
        assert!(!Var::obj(-1).is_truthy());
        assert!(!Var::Err(Error::None).is_truthy());
        assert!(!Var::Bool(false).is_truthy());
        assert!(Var::Err(Error::Type).is_truthy(), "non-E_NONE errors are truthy");
        assert!(Var::Int(-5).is_truthy());
        assert!(Var::obj(0).is_truthy());
    }

    #[test]
    fn sort_order_groups_by_type() {
        let mut vals = vec![
            Var::str("a"),
            Var::Int(3),
            Var::Float(0.5),
            Var::obj(2),
            Var::Int(1),
        ];
        vals.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            vals,
            vec![Var::Int(1), Var::Int(3), Var::obj(2), Var::Float(0.5), Var::str("a")]
        );
    }

    #[test]
    fn value_bytes_is_monotone_on_append() {
        let empty = Var::empty_list();
        let one = Var::list(vec![Var::Int(1)]);
        let two = Var::list(vec![Var::Int(1), Var::Int(2)]);
        assert!(one.value_bytes() > empty.value_bytes());
        assert!(two.value_bytes() > one.value_bytes());
        // The delta between {1,2} and {} is exactly two scalars.
        assert_eq!(
            two.value_bytes() - empty.value_bytes(),
            2 * Var::Int(1).value_bytes()
        );
    }

    #[test]
    fn value_bytes_is_stable() {
        let v = Var::list(vec![Var::str("hello"), Var::Int(2)]);
        assert_eq!(v.value_bytes(), v.value_bytes());
    }

    #[test]
    fn waifs_compare_by_identity() {
        let w = Arc::new(WaifRef::new(Objid(5), Objid(2)));
        let a = Var::Waif(w.clone());
        let b = Var::Waif(w);
        let c = Var::Waif(Arc::new(WaifRef::new(Objid(5), Objid(2))));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
