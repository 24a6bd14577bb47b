//! Verbs: table operations and resolution
//!
//! The verb table is ordered; a verb is addressable by 1-based index or by
//! any of its space-separated aliases (with `*` abbreviation). Resolution
//! by name is the same depth-first, left-to-right, cycle-safe walk as
//! property lookup. No lookup cache: the tree walk is cheap at MOO scale
//! and a cache would have to be invalidated on any verb mutation anywhere
//! in the ancestor chain.

use crate::object::{Flags, VerbArgs, VerbDef, VerbPerms};
use crate::store::{ObjRef, Store};
use byre_compiler::{compile, Program};
use byre_core::{Error, Objid, Var};
use std::collections::HashSet;
use std::sync::Arc;

/// A resolved verb: the object whose table holds it, and its index there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerbLoc {
    pub definer: Objid,
    pub index: usize,
}

/// Resolve `name` starting at `target`, walking parents depth-first
/// left-to-right. Anonymous targets search their own (empty-by-design)
/// table first, then the persistent chain.
pub fn resolve(store: &Store, target: &ObjRef, name: &str) -> Result<VerbLoc, Error> {
    let obj = store.deref(target)?;
    // Anonymous objects never define verbs of their own, so only a
    // persistent target can match locally.
    if let ObjRef::Obj(id) = target {
        if let Some(index) = local_match(&obj.verbs, name) {
            return Ok(VerbLoc {
                definer: *id,
                index,
            });
        }
    }
    let mut visited = HashSet::new();
    for parent in obj.parents.clone() {
        if let Some(loc) = walk(store, parent, name, &mut visited) {
            return Ok(loc);
        }
    }
    Err(Error::VerbNf)
}

fn walk(store: &Store, id: Objid, name: &str, visited: &mut HashSet<Objid>) -> Option<VerbLoc> {
    if !visited.insert(id) {
        return None;
    }
    let obj = store.find(id)?;
    if let Some(index) = local_match(&obj.verbs, name) {
        return Some(VerbLoc { definer: id, index });
    }
    for parent in &obj.parents {
        if let Some(loc) = walk(store, *parent, name, visited) {
            return Some(loc);
        }
    }
    None
}

fn local_match(verbs: &[VerbDef], name: &str) -> Option<usize> {
    verbs.iter().position(|v| v.matches(name))
}

/// Address a verb on one object by name or 1-based index: names miss with
/// E_VERBNF, indexes miss with E_RANGE.
pub fn index_on(store: &Store, obj: Objid, selector: &Var) -> Result<usize, Error> {
    let object = store.get(obj)?;
    match selector {
        Var::Int(n) => {
            if *n < 1 || *n as usize > object.verbs.len() {
                Err(Error::Range)
            } else {
                Ok((*n - 1) as usize)
            }
        }
        Var::Str(s) => {
            let name = s.to_string_lossy();
            local_match(&object.verbs, &name).ok_or(Error::VerbNf)
        }
        _ => Err(Error::Type),
    }
}

fn verb_readable(v: &VerbDef, progr: Objid, wizard: bool) -> bool {
    wizard || progr == v.owner || v.perms.read
}

fn verb_writable(v: &VerbDef, progr: Objid, wizard: bool) -> bool {
    wizard || progr == v.owner || v.perms.write
}

/// `verbs(obj)`: the full alias string of each verb, in table order.
pub fn verbs(store: &Store, obj: Objid, progr: Objid, wizard: bool) -> Result<Vec<String>, Error> {
    let object = store.get(obj)?;
    if !(wizard || progr == object.owner || object.flags.has(Flags::READ)) {
        return Err(Error::Perm);
    }
    Ok(object.verbs.iter().map(|v| v.names.clone()).collect())
}

/// `verb_info` -> `{owner, perms, names}`.
pub fn verb_info(
    store: &Store,
    obj: Objid,
    selector: &Var,
    progr: Objid,
    wizard: bool,
) -> Result<(Objid, String, String), Error> {
    let index = index_on(store, obj, selector)?;
    let v = &store.get(obj)?.verbs[index];
    if !verb_readable(v, progr, wizard) {
        return Err(Error::Perm);
    }
    Ok((v.owner, v.perms.to_string(), v.names.clone()))
}

pub fn set_verb_info(
    store: &mut Store,
    obj: Objid,
    selector: &Var,
    owner: Objid,
    perms: VerbPerms,
    names: String,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    if names.split_whitespace().next().is_none() {
        return Err(Error::InvArg);
    }
    if !wizard && owner != progr {
        return Err(Error::Perm);
    }
    let index = index_on(store, obj, selector)?;
    let v = &mut store.get_mut(obj)?.verbs[index];
    if !verb_writable(v, progr, wizard) {
        return Err(Error::Perm);
    }
    v.owner = owner;
    v.perms = perms;
    v.names = names;
    Ok(())
}

/// `verb_args` -> `{dobj, prep, iobj}` with the canonical expanded
/// preposition.
pub fn verb_args(
    store: &Store,
    obj: Objid,
    selector: &Var,
    progr: Objid,
    wizard: bool,
) -> Result<VerbArgs, Error> {
    let index = index_on(store, obj, selector)?;
    let v = &store.get(obj)?.verbs[index];
    if !verb_readable(v, progr, wizard) {
        return Err(Error::Perm);
    }
    Ok(v.args)
}

pub fn set_verb_args(
    store: &mut Store,
    obj: Objid,
    selector: &Var,
    args: VerbArgs,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    let index = index_on(store, obj, selector)?;
    let v = &mut store.get_mut(obj)?.verbs[index];
    if !verb_writable(v, progr, wizard) {
        return Err(Error::Perm);
    }
    v.args = args;
    Ok(())
}

/// `verb_code`: the stored source lines.
pub fn verb_code(
    store: &Store,
    obj: Objid,
    selector: &Var,
    progr: Objid,
    wizard: bool,
) -> Result<Vec<String>, Error> {
    let index = index_on(store, obj, selector)?;
    let v = &store.get(obj)?.verbs[index];
    if !verb_readable(v, progr, wizard) {
        return Err(Error::Perm);
    }
    Ok(v.code.clone())
}

/// `set_verb_code`: compiles first; an empty returned vector means success,
/// otherwise the parse errors are returned and the verb is untouched.
pub fn set_verb_code(
    store: &mut Store,
    obj: Objid,
    selector: &Var,
    lines: Vec<String>,
    progr: Objid,
    wizard: bool,
) -> Result<Vec<String>, Error> {
    let index = index_on(store, obj, selector)?;
    {
        let v = &store.get(obj)?.verbs[index];
        if !verb_writable(v, progr, wizard) {
            return Err(Error::Perm);
        }
    }
    let source = lines.join("\n");
    match compile(&source) {
        Ok(program) => {
            let v = &mut store.get_mut(obj)?.verbs[index];
            v.code = lines;
            v.program = Some(Arc::new(program));
            Ok(Vec::new())
        }
        Err(problems) => Ok(problems),
    }
}

/// `add_verb` -> the new verb's 1-based index.
pub fn add_verb(
    store: &mut Store,
    obj: Objid,
    owner: Objid,
    perms: VerbPerms,
    names: String,
    args: VerbArgs,
    progr: Objid,
    wizard: bool,
) -> Result<usize, Error> {
    if names.split_whitespace().next().is_none() {
        return Err(Error::InvArg);
    }
    let object = store.get(obj)?;
    if !(wizard || progr == object.owner || object.flags.has(Flags::WRITE)) {
        return Err(Error::Perm);
    }
    if !wizard && owner != progr {
        return Err(Error::Perm);
    }
    let object = store.get_mut(obj)?;
    object.verbs.push(VerbDef {
        names,
        owner,
        perms,
        args,
        code: Vec::new(),
        program: None,
    });
    Ok(object.verbs.len())
}

pub fn delete_verb(
    store: &mut Store,
    obj: Objid,
    selector: &Var,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    let index = index_on(store, obj, selector)?;
    {
        let v = &store.get(obj)?.verbs[index];
        if !verb_writable(v, progr, wizard) {
            return Err(Error::Perm);
        }
    }
    store.get_mut(obj)?.verbs.remove(index);
    Ok(())
}

/// The compiled program for a resolved verb, compiling and caching on
/// first use. Code that has never been set runs as the empty program.
pub fn program_for(store: &mut Store, loc: VerbLoc) -> Result<Arc<Program>, Error> {
    let v = &store.get(loc.definer)?.verbs[loc.index];
    if let Some(p) = &v.program {
        return Ok(p.clone());
    }
    let source = v.code.join("\n");
    let program = compile(&source).map_err(|_| Error::InvArg)?;
    let arc = Arc::new(program);
    store.get_mut(loc.definer)?.verbs[loc.index].program = Some(arc.clone());
    Ok(arc)
}
