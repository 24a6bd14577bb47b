//! Snapshot load / save
//!
//! A line-oriented textual dump. The file opens with an integer version
//! marker; versions 4 and 17 are accepted on load, 17 is written. Sections
//! appear in a fixed order: players, pending finalization, clocks, the
//! three task slots (always empty: task state does not survive a restart),
//! connections, the object array, the anonymous slot, and per-verb code
//! blocks terminated by a `.` line.
//!
//! Loader robustness rules:
//! - a `parents` field may be a single object id or a list; both are
//!   accepted and normalized to a list
//! - a property value line reading `clear` sets the clear flag with no
//!   local value
//! - verb code lines beginning with `.` are escaped with a second `.`
//!
//! Property values are stored as literals, binary-escaped (`~HH`) so every
//! line stays printable 7-bit.

use crate::object::{Flags, Object, PropPerms, PropertySlot, VerbArgs, VerbDef, VerbPerms};
use crate::object::{ArgSpec, PrepSpec};
use crate::store::Store;
use byre_core::literal::{parse_literal, to_literal};
use byre_core::{MooStr, Objid, NOTHING};
use std::fmt;
use std::io::{BufRead, Write};
use tracing::{info, warn};

pub const VERSION: u32 = 17;

#[derive(Debug)]
pub enum SnapshotError {
    Io(std::io::Error),
    /// (1-based line number, description)
    Parse(usize, String),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "snapshot I/O error: {e}"),
            SnapshotError::Parse(line, msg) => write!(f, "snapshot line {line}: {msg}"),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

// ----------------------------------------------------------------------
// Writing
// ----------------------------------------------------------------------

pub fn save<W: Write>(store: &Store, out: &mut W) -> Result<(), SnapshotError> {
    writeln!(out, "** byre database, format version {VERSION} **")?;

    writeln!(out, "players {}", store.players.len())?;
    for p in &store.players {
        writeln!(out, "{p}")?;
    }
    writeln!(out, "pending_finalization 0")?;
    writeln!(out, "clocks 0")?;
    writeln!(out, "queued_tasks 0")?;
    writeln!(out, "suspended_tasks 0")?;
    writeln!(out, "interrupted_tasks 0")?;
    writeln!(out, "connections 0")?;

    let objects: Vec<&Object> = store.all_objects().collect();
    writeln!(out, "objects {} max {}", objects.len(), store.max_object().0)?;
    for obj in &objects {
        write_object(obj, out)?;
    }

    writeln!(out, "anonymous 0")?;

    let code_blocks: usize = objects.iter().map(|o| o.verbs.len()).sum();
    writeln!(out, "verb_code {code_blocks}")?;
    for obj in &objects {
        for (i, verb) in obj.verbs.iter().enumerate() {
            writeln!(out, "{}:{}", obj.id, i + 1)?;
            for line in &verb.code {
                if line.starts_with('.') {
                    writeln!(out, ".{line}")?;
                } else {
                    writeln!(out, "{line}")?;
                }
            }
            writeln!(out, ".")?;
        }
    }
    info!(objects = objects.len(), "snapshot written");
    Ok(())
}

fn write_object<W: Write>(obj: &Object, out: &mut W) -> Result<(), SnapshotError> {
    writeln!(out, "{}", obj.id)?;
    if obj.is_recycled() {
        writeln!(out, "recycled")?;
        return Ok(());
    }
    writeln!(out, "{}", obj.name)?;
    writeln!(out, "flags {}", obj.flags.0)?;
    writeln!(out, "owner {}", obj.owner)?;
    writeln!(out, "location {}", obj.location)?;
    writeln!(out, "last_move {}", obj.last_move)?;
    writeln!(out, "parents {}", objid_list(&obj.parents))?;
    writeln!(out, "children {}", objid_list(&obj.children))?;
    writeln!(out, "contents {}", objid_list(&obj.contents))?;

    writeln!(out, "verbs {}", obj.verbs.len())?;
    for v in &obj.verbs {
        writeln!(out, "{}", v.names)?;
        writeln!(out, "owner {}", v.owner)?;
        writeln!(out, "perms {}", v.perms.to_string())?;
        writeln!(out, "dobj {}", v.args.dobj.to_str())?;
        writeln!(out, "prep {}", prep_token(v.args.prep))?;
        writeln!(out, "iobj {}", v.args.iobj.to_str())?;
    }

    writeln!(out, "propdefs {}", obj.propdefs.len())?;
    for name in &obj.propdefs {
        writeln!(out, "{name}")?;
    }

    // Defined-here slots first (in propdefs order), inherited after: the
    // reader counts on it.
    let mut names: Vec<&String> = obj.propdefs.iter().collect();
    let mut inherited: Vec<&String> = obj
        .props
        .keys()
        .filter(|k| !obj.propdefs.contains(*k))
        .collect();
    inherited.sort();
    names.extend(inherited);

    writeln!(out, "propvals {}", names.len())?;
    for name in names {
        let slot = &obj.props[name];
        writeln!(out, "{name}")?;
        writeln!(out, "owner {}", slot.owner)?;
        writeln!(out, "perms {}", slot.perms.to_string())?;
        match &slot.value {
            None => writeln!(out, "clear")?,
            Some(v) => {
                let lit = to_literal(v);
                writeln!(out, "value {}", lit.encode_binary())?;
            }
        }
    }
    Ok(())
}

fn objid_list(ids: &[Objid]) -> String {
    let items: Vec<String> = ids.iter().map(|o| o.to_string()).collect();
    format!("{{{}}}", items.join(", "))
}

/// The single token we write for a preposition spec (the first alias).
fn prep_token(p: PrepSpec) -> String {
    match p {
        PrepSpec::Any => "any".to_string(),
        PrepSpec::None => "none".to_string(),
        PrepSpec::Other(_) => p
            .to_str()
            .split('/')
            .next()
            .unwrap_or("none")
            .to_string(),
    }
}

// ----------------------------------------------------------------------
// Reading
// ----------------------------------------------------------------------

struct Lines<R> {
    reader: R,
    number: usize,
}

impl<R: BufRead> Lines<R> {
    fn next(&mut self) -> Result<String, SnapshotError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(SnapshotError::Parse(
                self.number,
                "unexpected end of file".into(),
            ));
        }
        self.number += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn err<T>(&self, msg: impl Into<String>) -> Result<T, SnapshotError> {
        Err(SnapshotError::Parse(self.number, msg.into()))
    }

    /// A `keyword <rest>` line; returns the rest.
    fn field(&mut self, keyword: &str) -> Result<String, SnapshotError> {
        let line = self.next()?;
        match line.strip_prefix(keyword) {
            Some(rest) => Ok(rest.trim_start().to_string()),
            None => self.err(format!("expected '{keyword} ...', got {line:?}")),
        }
    }

    fn count(&mut self, keyword: &str) -> Result<usize, SnapshotError> {
        let rest = self.field(keyword)?;
        // Tolerate trailing annotations such as "max N".
        let first = rest.split_whitespace().next().unwrap_or("");
        match first.parse() {
            Ok(n) => Ok(n),
            Err(_) => self.err(format!("bad {keyword} count {rest:?}")),
        }
    }

    fn objid_field(&mut self, keyword: &str) -> Result<Objid, SnapshotError> {
        let rest = self.field(keyword)?;
        match parse_objid(&rest) {
            Some(o) => Ok(o),
            None => self.err(format!("bad object id {rest:?}")),
        }
    }
}

fn parse_objid(s: &str) -> Option<Objid> {
    s.trim().strip_prefix('#')?.parse().ok().map(Objid)
}

/// Accept `#5` or `{#5, #6}` and normalize to a list. A historically
/// common loader bug is rejecting the single form; both are mandatory.
fn parse_objid_or_list(s: &str) -> Option<Vec<Objid>> {
    let s = s.trim();
    if let Some(o) = parse_objid(s) {
        return Some(vec![o]);
    }
    let inner = s.strip_prefix('{')?.strip_suffix('}')?;
    let mut out = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        out.push(parse_objid(part)?);
    }
    Some(out)
}

pub fn load<R: BufRead>(reader: R) -> Result<Store, SnapshotError> {
    let mut lines = Lines { reader, number: 0 };
    let header = lines.next()?;
    let version = parse_version(&header)
        .ok_or_else(|| SnapshotError::Parse(1, format!("bad header {header:?}")))?;
    if version != 4 && version != VERSION {
        return Err(SnapshotError::Parse(
            1,
            format!("unsupported format version {version}"),
        ));
    }

    let mut store = Store::new();
    let player_count = lines.count("players")?;
    for _ in 0..player_count {
        let line = lines.next()?;
        match parse_objid(&line) {
            Some(o) => store.players.push(o),
            None => return lines.err(format!("bad player id {line:?}")),
        }
    }
    // Fixed empty sections; counts are read and their bodies skipped.
    for section in [
        "pending_finalization",
        "clocks",
        "queued_tasks",
        "suspended_tasks",
        "interrupted_tasks",
        "connections",
    ] {
        let n = lines.count(section)?;
        for _ in 0..n {
            lines.next()?;
        }
    }

    let object_count = lines.count("objects")?;
    for _ in 0..object_count {
        let obj = read_object(&mut lines)?;
        store.insert_raw(obj);
    }

    if version == VERSION {
        let n = lines.count("anonymous")?;
        for _ in 0..n {
            lines.next()?;
        }
    }

    let code_blocks = lines.count("verb_code")?;
    for _ in 0..code_blocks {
        read_code_block(&mut lines, &mut store)?;
    }

    check_integrity(&store);
    info!(objects = object_count, version, "snapshot loaded");
    Ok(store)
}

fn parse_version(header: &str) -> Option<u32> {
    let idx = header.find("version")?;
    header[idx + "version".len()..]
        .trim()
        .trim_end_matches(|c: char| !c.is_ascii_digit())
        .trim()
        .parse()
        .ok()
}

fn read_object<R: BufRead>(lines: &mut Lines<R>) -> Result<Object, SnapshotError> {
    let id_line = lines.next()?;
    let id = match parse_objid(&id_line) {
        Some(o) => o,
        None => return lines.err(format!("expected object id, got {id_line:?}")),
    };
    let mut obj = Object::new(id);

    let name = lines.next()?;
    if name == "recycled" {
        obj.flags.set(Flags::RECYCLED, true);
        obj.flags.set(Flags::INVALID, true);
        return Ok(obj);
    }
    obj.name = name;

    let flags = lines.field("flags")?;
    obj.flags = Flags(flags.parse().map_err(|_| {
        SnapshotError::Parse(lines.number, format!("bad flags {flags:?}"))
    })?);
    obj.owner = lines.objid_field("owner")?;
    obj.location = lines.objid_field("location")?;
    let last_move = lines.field("last_move")?;
    obj.last_move = last_move.parse().unwrap_or(0);

    let parents = lines.field("parents")?;
    obj.parents = match parse_objid_or_list(&parents) {
        Some(list) => list.into_iter().filter(|o| *o != NOTHING).collect(),
        None => return lines.err(format!("bad parents field {parents:?}")),
    };
    let children = lines.field("children")?;
    obj.children = parse_objid_or_list(&children)
        .ok_or_else(|| SnapshotError::Parse(lines.number, "bad children field".into()))?;
    let contents = lines.field("contents")?;
    obj.contents = parse_objid_or_list(&contents)
        .ok_or_else(|| SnapshotError::Parse(lines.number, "bad contents field".into()))?;

    let verb_count = lines.count("verbs")?;
    for _ in 0..verb_count {
        let names = lines.next()?;
        let owner = lines.objid_field("owner")?;
        let perms_s = lines.field("perms")?;
        let perms = VerbPerms::parse(&perms_s)
            .map_err(|_| SnapshotError::Parse(lines.number, format!("bad verb perms {perms_s:?}")))?;
        let dobj_s = lines.field("dobj")?;
        let prep_s = lines.field("prep")?;
        let iobj_s = lines.field("iobj")?;
        let args = VerbArgs {
            dobj: ArgSpec::parse(&dobj_s)
                .map_err(|_| SnapshotError::Parse(lines.number, format!("bad dobj {dobj_s:?}")))?,
            prep: PrepSpec::parse(&prep_s)
                .map_err(|_| SnapshotError::Parse(lines.number, format!("bad prep {prep_s:?}")))?,
            iobj: ArgSpec::parse(&iobj_s)
                .map_err(|_| SnapshotError::Parse(lines.number, format!("bad iobj {iobj_s:?}")))?,
        };
        obj.verbs.push(VerbDef {
            names,
            owner,
            perms,
            args,
            code: Vec::new(),
            program: None,
        });
    }

    let propdef_count = lines.count("propdefs")?;
    for _ in 0..propdef_count {
        obj.propdefs.push(lines.next()?.to_ascii_lowercase());
    }

    let propval_count = lines.count("propvals")?;
    for i in 0..propval_count {
        let name = lines.next()?.to_ascii_lowercase();
        let owner = lines.objid_field("owner")?;
        let perms_s = lines.field("perms")?;
        let perms = PropPerms::parse(&perms_s).map_err(|_| {
            SnapshotError::Parse(lines.number, format!("bad property perms {perms_s:?}"))
        })?;
        let value_line = lines.next()?;
        let value = if value_line == "clear" {
            None
        } else if let Some(encoded) = value_line.strip_prefix("value ") {
            let decoded = MooStr::from_str(encoded)
                .decode_binary()
                .map_err(|_| SnapshotError::Parse(lines.number, "bad value escape".into()))?;
            Some(parse_literal(decoded.as_bytes()).map_err(|e| {
                SnapshotError::Parse(lines.number, format!("bad value literal: {e}"))
            })?)
        } else {
            return lines.err(format!("expected 'clear' or 'value ...', got {value_line:?}"));
        };
        // The first propdefs_count values are defined here, the rest
        // inherited.
        obj.props.insert(
            name,
            PropertySlot {
                value,
                owner,
                perms,
                defined_here: i < propdef_count,
            },
        );
    }
    Ok(obj)
}

fn read_code_block<R: BufRead>(
    lines: &mut Lines<R>,
    store: &mut Store,
) -> Result<(), SnapshotError> {
    let header = lines.next()?;
    let (obj_part, index_part) = header
        .split_once(':')
        .ok_or_else(|| SnapshotError::Parse(lines.number, format!("bad code header {header:?}")))?;
    let obj = parse_objid(obj_part)
        .ok_or_else(|| SnapshotError::Parse(lines.number, "bad code object id".into()))?;
    let index: usize = index_part
        .trim()
        .parse()
        .map_err(|_| SnapshotError::Parse(lines.number, "bad code verb index".into()))?;

    let mut code = Vec::new();
    loop {
        let line = lines.next()?;
        if line == "." {
            break;
        }
        if let Some(stripped) = line.strip_prefix('.') {
            code.push(stripped.to_string());
        } else {
            code.push(line);
        }
    }

    match store
        .find_mut(obj)
        .and_then(|o| o.verbs.get_mut(index.saturating_sub(1)))
    {
        Some(verb) => verb.code = code,
        None => warn!(obj = obj.0, index, "verb code for unknown verb; dropped"),
    }
    Ok(())
}

/// Post-load integrity pass: warn (and repair) when the derived relations
/// disagree with the stored ones.
fn check_integrity(store: &Store) {
    for obj in store.all_objects() {
        if obj.is_recycled() {
            continue;
        }
        for p in &obj.parents {
            let ok = store
                .find(*p)
                .map(|po| po.children.contains(&obj.id))
                .unwrap_or(false);
            if !ok {
                warn!(child = obj.id.0, parent = p.0, "parent/children mismatch");
            }
        }
        if obj.location != NOTHING {
            let ok = store
                .find(obj.location)
                .map(|l| l.contents.contains(&obj.id))
                .unwrap_or(false);
            if !ok {
                warn!(obj = obj.id.0, loc = obj.location.0, "location/contents mismatch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::add_property;
    use byre_core::Var;
    use crate::verbs::{add_verb, set_verb_code};
    use std::io::BufReader;

    const WIZ: Objid = Objid(1);

    fn build_world() -> Store {
        let mut store = Store::minimal();
        let parent = store.create(&[Objid(0)], WIZ, WIZ, true).unwrap();
        add_property(
            &mut store,
            parent,
            "color",
            Var::str("red"),
            WIZ,
            PropPerms::parse("rw").unwrap(),
            WIZ,
            true,
        )
        .unwrap();
        let child = store.create(&[parent], WIZ, WIZ, true).unwrap();
        store.move_object(child, parent).unwrap();
        add_verb(
            &mut store,
            parent,
            WIZ,
            VerbPerms::parse("rxd").unwrap(),
            "tick".to_string(),
            VerbArgs::this_none_this(),
            WIZ,
            true,
        )
        .unwrap();
        set_verb_code(
            &mut store,
            parent,
            &Var::Int(1),
            vec!["return 1 + 1;".to_string()],
            WIZ,
            true,
        )
        .unwrap();
        store
    }

    fn round_trip(store: &Store) -> Store {
        let mut buf = Vec::new();
        save(store, &mut buf).unwrap();
        load(BufReader::new(buf.as_slice())).unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = build_world();
        let loaded = round_trip(&store);
        assert_eq!(loaded.max_object(), store.max_object());
        assert_eq!(loaded.players, store.players);

        let parent = loaded.get(Objid(2)).unwrap();
        assert_eq!(parent.propdefs, vec!["color".to_string()]);
        assert_eq!(
            parent.props["color"].value,
            Some(Var::str("red"))
        );
        assert!(parent.props["color"].defined_here);
        assert_eq!(parent.verbs[0].names, "tick");
        assert_eq!(parent.verbs[0].code, vec!["return 1 + 1;".to_string()]);

        let child = loaded.get(Objid(3)).unwrap();
        assert!(child.props["color"].is_clear());
        assert!(!child.props["color"].defined_here);
        assert_eq!(child.location, Objid(2));
        assert!(parent.contents.contains(&Objid(3)));
    }

    #[test]
    fn round_trip_of_a_round_trip_is_identical_text() {
        let store = build_world();
        let mut first = Vec::new();
        save(&store, &mut first).unwrap();
        let loaded = load(BufReader::new(first.as_slice())).unwrap();
        let mut second = Vec::new();
        save(&loaded, &mut second).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&first),
            String::from_utf8_lossy(&second)
        );
    }

    #[test]
    fn single_objid_parents_are_accepted() {
        let store = build_world();
        let mut buf = Vec::new();
        save(&store, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        // Degrade the child's parents field to the single-OBJ form.
        let hacked = text.replace("parents {#2}", "parents #2");
        assert_ne!(hacked, text);
        let loaded = load(BufReader::new(hacked.as_bytes())).unwrap();
        assert_eq!(loaded.get(Objid(3)).unwrap().parents, vec![Objid(2)]);
    }

    #[test]
    fn recycled_objects_survive_as_husks() {
        let mut store = build_world();
        let victim = store.create(&[Objid(0)], WIZ, WIZ, true).unwrap();
        store.recycle(victim).unwrap();
        let loaded = round_trip(&store);
        assert!(!loaded.is_valid(victim));
        assert_eq!(loaded.max_object(), store.max_object());
    }

    #[test]
    fn binary_property_values_round_trip() {
        let mut store = build_world();
        let obj = Objid(2);
        let gnarly = Var::Str(MooStr::from_bytes(vec![0x00, b'\n', 0xff, b'"']));
        add_property(
            &mut store,
            obj,
            "blob",
            gnarly.clone(),
            WIZ,
            PropPerms::parse("r").unwrap(),
            WIZ,
            true,
        )
        .unwrap();
        let loaded = round_trip(&store);
        assert_eq!(loaded.get(obj).unwrap().props["blob"].value, Some(gnarly));
    }

    #[test]
    fn dot_lines_in_verb_code_are_escaped() {
        let mut store = build_world();
        store.get_mut(Objid(2)).unwrap().verbs[0].code =
            vec!["\"...\";".to_string(), ".".to_string()];
        let loaded = round_trip(&store);
        assert_eq!(
            loaded.get(Objid(2)).unwrap().verbs[0].code,
            vec!["\"...\";".to_string(), ".".to_string()]
        );
    }

    #[test]
    fn truncated_file_reports_line() {
        let store = build_world();
        let mut buf = Vec::new();
        save(&store, &mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        let err = load(BufReader::new(buf.as_slice())).unwrap_err();
        assert!(matches!(err, SnapshotError::Parse(..) | SnapshotError::Io(_)));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let text = "** byre database, format version 9 **\n";
        assert!(load(BufReader::new(text.as_bytes())).is_err());
    }
}
