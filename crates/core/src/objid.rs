//! Object ids
//!
//! An object id is a signed integer. Negative ids are syntactically valid
//! (the parser accepts `#-1`) and serve as sentinels; they never refer to
//! live objects.

use std::fmt;

/// A MOO object id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Objid(pub i64);

/// `#-1`: "nothing"; the location of nowhere, the parent of orphans.
pub const NOTHING: Objid = Objid(-1);
/// `#-2`: ambiguous command match.
pub const AMBIGUOUS: Objid = Objid(-2);
/// `#-3`: failed command match.
pub const FAILED_MATCH: Objid = Objid(-3);
/// `#0`: the system object; `$foo` is sugar for `#0.foo`.
pub const SYSTEM_OBJECT: Objid = Objid(0);

impl Objid {
    /// Whether this id could possibly name a live object.
    ///
    /// This is a syntactic check only; the store decides actual validity
    /// (recycled, beyond the high-water mark).
    pub fn is_positional(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for Objid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_hash_prefix() {
        assert_eq!(Objid(7).to_string(), "#7");
        assert_eq!(NOTHING.to_string(), "#-1");
    }

    #[test]
    fn sentinels_are_not_positional() {
        assert!(!NOTHING.is_positional());
        assert!(!AMBIGUOUS.is_positional());
        assert!(SYSTEM_OBJECT.is_positional());
    }
}
