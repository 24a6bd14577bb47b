//! Object records
//!
//! An `Object` is one slot in the store: flags, ownership, containment,
//! inheritance links, the property table and the verb table. Built-in
//! attributes (name, owner, location, ...) are struct fields, never entries
//! in the property table.

use byre_compiler::Program;
use byre_core::value::AnonRef;
use byre_core::{Error, Objid, Var, NOTHING};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Object flag bits. RECYCLED implies INVALID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u16);

impl Flags {
    pub const PLAYER: u16 = 1 << 0;
    pub const PROGRAMMER: u16 = 1 << 1;
    pub const WIZARD: u16 = 1 << 2;
    pub const READ: u16 = 1 << 3;
    pub const WRITE: u16 = 1 << 4;
    pub const FERTILE: u16 = 1 << 5;
    pub const ANONYMOUS: u16 = 1 << 6;
    pub const INVALID: u16 = 1 << 7;
    pub const RECYCLED: u16 = 1 << 8;

    pub fn has(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u16, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// Property permissions: 'r', 'w' and 'c' ('c' requires 'w').
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropPerms {
    pub read: bool,
    pub write: bool,
    pub chown: bool,
}

impl PropPerms {
    /// Parse the canonical permission string. Exactly one of
    /// `"" "r" "w" "rw" "rwc"`; reorderings and a bare `c` are E_INVARG.
    pub fn parse(s: &str) -> Result<PropPerms, Error> {
        match s {
            "" => Ok(PropPerms {
                read: false,
                write: false,
                chown: false,
            }),
            "r" => Ok(PropPerms {
                read: true,
                write: false,
                chown: false,
            }),
            "w" => Ok(PropPerms {
                read: false,
                write: true,
                chown: false,
            }),
            "rw" => Ok(PropPerms {
                read: true,
                write: true,
                chown: false,
            }),
            "rwc" => Ok(PropPerms {
                read: true,
                write: true,
                chown: true,
            }),
            _ => Err(Error::InvArg),
        }
    }

    pub fn to_string(self) -> String {
        let mut s = String::new();
        if self.read {
            s.push('r');
        }
        if self.write {
            s.push('w');
        }
        if self.chown {
            s.push('c');
        }
        s
    }
}

/// One property slot. A slot with no value is *clear*: reads continue up
/// the inheritance chain. `defined_here` marks the defining site.
#[derive(Debug, Clone)]
pub struct PropertySlot {
    pub value: Option<Var>,
    pub owner: Objid,
    pub perms: PropPerms,
    pub defined_here: bool,
}

impl PropertySlot {
    pub fn is_clear(&self) -> bool {
        self.value.is_none()
    }
}

/// Verb permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerbPerms {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    /// 'd': include line numbers and locals in stack traces.
    pub debug: bool,
}

impl VerbPerms {
    /// Verb permission strings are order-insensitive, unlike property
    /// strings; any combination of `rwxd` is accepted.
    pub fn parse(s: &str) -> Result<VerbPerms, Error> {
        let mut p = VerbPerms::default();
        for c in s.chars() {
            match c {
                'r' => p.read = true,
                'w' => p.write = true,
                'x' => p.execute = true,
                'd' => p.debug = true,
                _ => return Err(Error::InvArg),
            }
        }
        Ok(p)
    }

    pub fn to_string(self) -> String {
        let mut s = String::new();
        if self.read {
            s.push('r');
        }
        if self.write {
            s.push('w');
        }
        if self.execute {
            s.push('x');
        }
        if self.debug {
            s.push('d');
        }
        s
    }
}

/// Direct/indirect object specifier in a verb's argument spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSpec {
    This,
    Any,
    None,
}

impl ArgSpec {
    pub fn parse(s: &str) -> Result<ArgSpec, Error> {
        match s {
            "this" => Ok(ArgSpec::This),
            "any" => Ok(ArgSpec::Any),
            "none" => Ok(ArgSpec::None),
            _ => Err(Error::InvArg),
        }
    }

    pub fn to_str(self) -> &'static str {
        match self {
            ArgSpec::This => "this",
            ArgSpec::Any => "any",
            ArgSpec::None => "none",
        }
    }
}

/// The recognized prepositions. Each entry is the full slash form; any
/// single token of an entry selects it, and the canonical expanded form is
/// what `verb_args` reports.
pub const PREPOSITIONS: &[&str] = &[
    "with/using",
    "at/to",
    "in front of",
    "in/inside/into",
    "on top of/on/onto/upon",
    "out of/from inside/from",
    "over",
    "through",
    "under/underneath/beneath",
    "behind",
    "beside",
    "for/about",
    "is",
    "as",
    "off/off of",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepSpec {
    Any,
    None,
    /// Index into [`PREPOSITIONS`].
    Other(usize),
}

impl PrepSpec {
    /// Accepts `any`, `none`, or a single preposition token (`with`, `at`,
    /// ...). The full slash form is not accepted as input.
    pub fn parse(s: &str) -> Result<PrepSpec, Error> {
        match s {
            "any" => Ok(PrepSpec::Any),
            "none" => Ok(PrepSpec::None),
            _ => {
                if s.contains('/') {
                    return Err(Error::InvArg);
                }
                for (i, entry) in PREPOSITIONS.iter().enumerate() {
                    if entry.split('/').any(|tok| tok == s) {
                        return Ok(PrepSpec::Other(i));
                    }
                }
                Err(Error::InvArg)
            }
        }
    }

    /// The canonical expanded form reported by `verb_args`.
    pub fn to_str(self) -> &'static str {
        match self {
            PrepSpec::Any => "any",
            PrepSpec::None => "none",
            PrepSpec::Other(i) => PREPOSITIONS[i],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerbArgs {
    pub dobj: ArgSpec,
    pub prep: PrepSpec,
    pub iobj: ArgSpec,
}

impl VerbArgs {
    /// `this none this`, the convention for verbs only called with `:`.
    pub fn this_none_this() -> VerbArgs {
        VerbArgs {
            dobj: ArgSpec::This,
            prep: PrepSpec::None,
            iobj: ArgSpec::This,
        }
    }
}

/// One verb definition. The verb table is ordered and addressable by
/// 1-based index; `names` is the space-separated alias string.
#[derive(Debug, Clone)]
pub struct VerbDef {
    pub names: String,
    pub owner: Objid,
    pub perms: VerbPerms,
    pub args: VerbArgs,
    /// Source lines as last set by `set_verb_code`.
    pub code: Vec<String>,
    /// Compiled lazily; cleared whenever the source changes.
    pub program: Option<Arc<Program>>,
}

impl VerbDef {
    /// Does `name` match any alias? Aliases may abbreviate with `*`:
    /// `g*et` matches `g`, `ge`, `get`; a bare `*` matches anything.
    pub fn matches(&self, name: &str) -> bool {
        self.names
            .split_whitespace()
            .any(|alias| alias_matches(alias, name))
    }
}

pub fn alias_matches(alias: &str, name: &str) -> bool {
    if alias == "*" {
        return true;
    }
    let alias = alias.as_bytes();
    let name = name.as_bytes();
    match alias.iter().position(|&b| b == b'*') {
        None => alias.eq_ignore_ascii_case(name),
        Some(star) => {
            let prefix = &alias[..star];
            let rest = &alias[star + 1..];
            if name.len() < prefix.len() {
                return false;
            }
            if !name[..prefix.len()].eq_ignore_ascii_case(prefix) {
                return false;
            }
            if rest.is_empty() {
                // Trailing star: any suffix is fine.
                return true;
            }
            let tail = &name[prefix.len()..];
            tail.len() <= rest.len() && rest[..tail.len()].eq_ignore_ascii_case(tail)
        }
    }
}

/// A persistent (or anonymous) object record.
#[derive(Debug, Clone, Default)]
pub struct Object {
    pub id: Objid,
    pub name: String,
    pub flags: Flags,
    pub owner: Objid,
    pub location: Objid,
    pub last_move: i64,
    pub parents: Vec<Objid>,
    pub children: Vec<Objid>,
    pub contents: Vec<Objid>,
    /// Property table keyed by lower-cased name.
    pub props: HashMap<String, PropertySlot>,
    /// Names defined on this object, in definition order (snapshot order).
    pub propdefs: Vec<String>,
    pub verbs: Vec<VerbDef>,
    /// Live anonymous children cloned from this object, for invalidation.
    pub anon_children: Vec<Weak<AnonRef>>,
}

impl Object {
    pub fn new(id: Objid) -> Object {
        Object {
            id,
            name: String::new(),
            owner: NOTHING,
            location: NOTHING,
            ..Object::default()
        }
    }

    pub fn is_recycled(&self) -> bool {
        self.flags.has(Flags::RECYCLED)
    }

    pub fn is_wizard(&self) -> bool {
        self.flags.has(Flags::WIZARD)
    }

    pub fn is_fertile(&self) -> bool {
        self.flags.has(Flags::FERTILE)
    }

    pub fn is_player(&self) -> bool {
        self.flags.has(Flags::PLAYER)
    }

    /// Flip every live anonymous back-reference to invalid and drop the
    /// dead weak handles.
    pub fn invalidate_anon_children(&mut self) {
        for weak in self.anon_children.drain(..) {
            if let Some(anon) = weak.upgrade() {
                anon.invalidate();
            }
        }
    }
}

/// The built-in attribute names that are fields, not properties.
pub const BUILTIN_PROPERTIES: &[&str] = &[
    "name", "owner", "location", "contents", "parents", "children", "programmer", "wizard",
    "player", "r", "w", "f", "a",
];

pub fn is_builtin_property(name: &str) -> bool {
    BUILTIN_PROPERTIES
        .iter()
        .any(|b| b.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_perms_accept_canonical_forms_only() {
        assert!(PropPerms::parse("").is_ok());
        assert!(PropPerms::parse("r").is_ok());
        assert!(PropPerms::parse("w").is_ok());
        assert!(PropPerms::parse("rw").is_ok());
        assert!(PropPerms::parse("rwc").is_ok());
        for bad in ["wr", "crw", "c", "rc", "x", "rwcc"] {
            assert_eq!(PropPerms::parse(bad), Err(Error::InvArg), "{bad:?}");
        }
    }

    #[test]
    fn prop_perms_round_trip() {
        for s in ["", "r", "w", "rw", "rwc"] {
            assert_eq!(PropPerms::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn verb_perms_any_order() {
        let p = VerbPerms::parse("dxr").unwrap();
        assert!(p.read && p.execute && p.debug && !p.write);
        assert_eq!(p.to_string(), "rxd");
        assert!(VerbPerms::parse("rz").is_err());
    }

    #[test]
    fn preposition_single_token_only() {
        assert_eq!(PrepSpec::parse("with").unwrap(), PrepSpec::Other(0));
        assert_eq!(PrepSpec::parse("using").unwrap(), PrepSpec::Other(0));
        assert_eq!(PrepSpec::parse("onto").unwrap(), PrepSpec::Other(4));
        assert!(PrepSpec::parse("with/using").is_err());
        assert!(PrepSpec::parse("sideways").is_err());
        assert_eq!(PrepSpec::parse("with").unwrap().to_str(), "with/using");
    }

    #[test]
    fn verb_alias_matching() {
        let v = VerbDef {
            names: "g*et take".to_string(),
            owner: Objid(2),
            perms: VerbPerms::default(),
            args: VerbArgs::this_none_this(),
            code: vec![],
            program: None,
        };
        assert!(v.matches("g"));
        assert!(v.matches("ge"));
        assert!(v.matches("get"));
        assert!(!v.matches("gets"));
        assert!(v.matches("take"));
        assert!(v.matches("TAKE"));
        assert!(!v.matches("t"));
    }

    #[test]
    fn star_alias_matches_everything() {
        assert!(alias_matches("*", "anything"));
        assert!(alias_matches("foo*", "foo"));
        assert!(alias_matches("foo*", "foobar"), "trailing star takes any suffix");
        assert!(!alias_matches("foo*", "fo"));
    }

    #[test]
    fn builtin_property_names() {
        assert!(is_builtin_property("name"));
        assert!(is_builtin_property("OWNER"));
        assert!(!is_builtin_property("description"));
    }
}
