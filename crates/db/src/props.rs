//! Properties: resolution, access and mutation
//!
//! Lookup is the depth-first, left-to-right, cycle-safe walk shared with
//! verb resolution. Permission checks use the owner and permission bits on
//! the slot the walk found (the defining site's bits, mirrored onto every
//! descendant slot), never the target object's.
//!
//! Every object materializes a slot for every property defined anywhere in
//! its ancestor chain; a slot without a value is *clear* and reads continue
//! upward. `add_property` and `delete_property` keep descendant slots in
//! step, so resolution never needs to ask "would this object have a slot".

use crate::object::{is_builtin_property, Flags, Object, PropPerms, PropertySlot};
use crate::store::{ObjRef, Store};
use byre_core::{Error, Objid, Var};
use std::collections::HashSet;

/// Where resolution found a valued slot.
pub struct Resolved {
    /// The object carrying the winning slot (the target itself or an
    /// ancestor). Anonymous targets resolve on themselves or a persistent
    /// ancestor.
    pub on: ObjRef,
    pub value: Var,
    pub owner: Objid,
    pub perms: PropPerms,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Resolve `name` on `target`, following clear slots upward.
pub fn resolve(store: &Store, target: &ObjRef, name: &str) -> Result<Resolved, Error> {
    let key = key(name);
    let obj = store.deref(target)?;
    if let Some(found) = valued_slot(obj, &key) {
        return Ok(Resolved {
            on: target.clone(),
            value: found.value.clone().unwrap(),
            owner: found.owner,
            perms: found.perms,
        });
    }
    // The target's slot (if any) is clear: continue on the persistent
    // ancestor chain. The chain walk is cycle-safe by construction.
    let mut visited = HashSet::new();
    for parent in obj.parents.clone() {
        if let Some(r) = walk(store, parent, &key, &mut visited) {
            return Ok(r);
        }
    }
    Err(Error::PropNf)
}

fn walk(store: &Store, id: Objid, key: &str, visited: &mut HashSet<Objid>) -> Option<Resolved> {
    if !visited.insert(id) {
        return None;
    }
    let obj = store.find(id)?;
    if let Some(found) = valued_slot(obj, key) {
        return Some(Resolved {
            on: ObjRef::Obj(id),
            value: found.value.clone().unwrap(),
            owner: found.owner,
            perms: found.perms,
        });
    }
    for parent in &obj.parents {
        if let Some(r) = walk(store, *parent, key, visited) {
            return Some(r);
        }
    }
    None
}

fn valued_slot<'a>(obj: &'a Object, key: &str) -> Option<&'a PropertySlot> {
    obj.props.get(key).filter(|s| !s.is_clear())
}

// ----------------------------------------------------------------------
// Read / write
// ----------------------------------------------------------------------

/// `obj.name` read: built-in attributes first, then the property table.
pub fn get_value(
    store: &Store,
    target: &ObjRef,
    name: &str,
    progr: Objid,
    wizard: bool,
) -> Result<Var, Error> {
    if let Some(v) = builtin_value(store, target, name)? {
        return Ok(v);
    }
    let found = resolve(store, target, name)?;
    if wizard || progr == found.owner || found.perms.read {
        Ok(found.value)
    } else {
        Err(Error::Perm)
    }
}

/// `obj.name = value`: writing to a clear slot populates it (un-clears).
pub fn set_value(
    store: &mut Store,
    target: &ObjRef,
    name: &str,
    value: Var,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    if is_builtin_property(name) {
        return set_builtin(store, target, name, value, progr, wizard);
    }
    let key = key(name);
    // Permission bits come from the resolved slot, but the write lands on
    // the target's own slot.
    let found = resolve_slot_perms(store, target, &key)?;
    if !(wizard || progr == found.0 || found.1.write) {
        return Err(Error::Perm);
    }
    let obj = store.deref_mut(target)?;
    let slot = obj.props.get_mut(&key).ok_or(Error::PropNf)?;
    slot.value = Some(value);
    Ok(())
}

/// The (owner, perms) governing access to `name` on `target`: the local
/// slot if present, else E_PROPNF (slots mirror the whole chain).
fn resolve_slot_perms(
    store: &Store,
    target: &ObjRef,
    key: &str,
) -> Result<(Objid, PropPerms), Error> {
    let obj = store.deref(target)?;
    match obj.props.get(key) {
        Some(slot) => Ok((slot.owner, slot.perms)),
        None => Err(Error::PropNf),
    }
}

// ----------------------------------------------------------------------
// Built-in attributes
// ----------------------------------------------------------------------

fn builtin_value(store: &Store, target: &ObjRef, name: &str) -> Result<Option<Var>, Error> {
    let obj = store.deref(target)?;
    let v = match name.to_ascii_lowercase().as_str() {
        "name" => Var::str(&obj.name),
        "owner" => Var::Obj(obj.owner),
        "location" => Var::Obj(obj.location),
        "contents" => Var::list(obj.contents.iter().map(|&o| Var::Obj(o)).collect()),
        "parents" => Var::list(obj.parents.iter().map(|&o| Var::Obj(o)).collect()),
        "children" => Var::list(obj.children.iter().map(|&o| Var::Obj(o)).collect()),
        "programmer" => Var::Int(obj.flags.has(Flags::PROGRAMMER) as i64),
        "wizard" => Var::Int(obj.flags.has(Flags::WIZARD) as i64),
        "player" => Var::Int(obj.flags.has(Flags::PLAYER) as i64),
        "r" => Var::Int(obj.flags.has(Flags::READ) as i64),
        "w" => Var::Int(obj.flags.has(Flags::WRITE) as i64),
        "f" => Var::Int(obj.flags.has(Flags::FERTILE) as i64),
        "a" => Var::Int(obj.flags.has(Flags::ANONYMOUS) as i64),
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn set_builtin(
    store: &mut Store,
    target: &ObjRef,
    name: &str,
    value: Var,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    let owner = store.deref(target)?.owner;
    let owns = wizard || progr == owner;
    let obj_name = name.to_ascii_lowercase();
    match obj_name.as_str() {
        "name" => {
            if !owns {
                return Err(Error::Perm);
            }
            let Var::Str(s) = value else { return Err(Error::Type) };
            store.deref_mut(target)?.name = s.to_string_lossy();
            Ok(())
        }
        "owner" => {
            if !wizard {
                return Err(Error::Perm);
            }
            let Var::Obj(o) = value else { return Err(Error::Type) };
            store.deref_mut(target)?.owner = o;
            Ok(())
        }
        "programmer" | "wizard" => {
            if !wizard {
                return Err(Error::Perm);
            }
            let bit = if obj_name == "programmer" {
                Flags::PROGRAMMER
            } else {
                Flags::WIZARD
            };
            store
                .deref_mut(target)?
                .flags
                .set(bit, value.is_truthy());
            Ok(())
        }
        "player" => Err(Error::Perm),
        "r" | "w" | "f" => {
            if !owns {
                return Err(Error::Perm);
            }
            let bit = match obj_name.as_str() {
                "r" => Flags::READ,
                "w" => Flags::WRITE,
                _ => Flags::FERTILE,
            };
            store
                .deref_mut(target)?
                .flags
                .set(bit, value.is_truthy());
            Ok(())
        }
        // Derived attributes change through move/chparent, never directly.
        "location" | "contents" | "parents" | "children" | "a" => Err(Error::Perm),
        _ => Err(Error::PropNf),
    }
}

// ----------------------------------------------------------------------
// Definition and info
// ----------------------------------------------------------------------

/// `add_property(obj, name, value, {owner, perms})`.
pub fn add_property(
    store: &mut Store,
    target: Objid,
    name: &str,
    value: Var,
    prop_owner: Objid,
    perms: PropPerms,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    let obj = store.get(target)?;
    if !(wizard || progr == obj.owner) {
        return Err(Error::Perm);
    }
    if !wizard && prop_owner != progr {
        return Err(Error::Perm);
    }
    if is_builtin_property(name) {
        return Err(Error::InvArg);
    }
    let key = key(name);
    // Any slot anywhere in the ancestor or descendant chain makes the name
    // ambiguous.
    if obj.props.contains_key(&key) {
        return Err(Error::InvArg);
    }
    for a in store.ancestors(target, false) {
        if store.find(a).map(|o| o.props.contains_key(&key)).unwrap_or(false) {
            return Err(Error::InvArg);
        }
    }
    let descendants = store.descendants(target);
    for d in &descendants {
        if store.find(*d).map(|o| o.props.contains_key(&key)).unwrap_or(false) {
            return Err(Error::InvArg);
        }
    }

    let obj = store.get_mut(target)?;
    obj.props.insert(
        key.clone(),
        PropertySlot {
            value: Some(value),
            owner: prop_owner,
            perms,
            defined_here: true,
        },
    );
    obj.propdefs.push(key.clone());

    // Descendants inherit a clear slot; 'c' hands each its own owner.
    for d in descendants {
        let d_owner = store.get(d)?.owner;
        let owner = if perms.chown { d_owner } else { prop_owner };
        store.get_mut(d)?.props.insert(
            key.clone(),
            PropertySlot {
                value: None,
                owner,
                perms,
                defined_here: false,
            },
        );
    }
    store.structural_change(target);
    Ok(())
}

/// `delete_property`. On the defining site the definition disappears from
/// the whole subtree; elsewhere a populated local slot reverts to clear;
/// a clear inherited slot is a no-op. E_PROPNF only when the name exists
/// nowhere in the chain.
pub fn delete_property(
    store: &mut Store,
    target: Objid,
    name: &str,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    let key = key(name);
    if is_builtin_property(name) {
        return Err(Error::Perm);
    }
    let obj = store.get(target)?;
    if !(wizard || progr == obj.owner) {
        return Err(Error::Perm);
    }
    let Some(slot) = obj.props.get(&key) else {
        return Err(Error::PropNf);
    };
    if slot.defined_here {
        let obj = store.get_mut(target)?;
        obj.props.remove(&key);
        obj.propdefs.retain(|n| *n != key);
        for d in store.descendants(target) {
            if let Some(o) = store.find_mut(d) {
                o.props.remove(&key);
            }
        }
    } else if !slot.is_clear() {
        let obj = store.get_mut(target)?;
        if let Some(slot) = obj.props.get_mut(&key) {
            slot.value = None;
        }
    }
    store.structural_change(target);
    Ok(())
}

/// `clear_property`: E_INVARG on the defining site, E_PERM on built-ins,
/// idempotent on already-clear slots.
pub fn clear_property(
    store: &mut Store,
    target: &ObjRef,
    name: &str,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    if is_builtin_property(name) {
        return Err(Error::Perm);
    }
    let key = key(name);
    let (owner, perms) = resolve_slot_perms(store, target, &key)?;
    if !(wizard || progr == owner || perms.write) {
        return Err(Error::Perm);
    }
    let obj = store.deref_mut(target)?;
    let slot = obj.props.get_mut(&key).ok_or(Error::PropNf)?;
    if slot.defined_here {
        return Err(Error::InvArg);
    }
    slot.value = None;
    Ok(())
}

/// `is_clear_property`.
pub fn is_clear_property(
    store: &Store,
    target: &ObjRef,
    name: &str,
    progr: Objid,
    wizard: bool,
) -> Result<bool, Error> {
    if is_builtin_property(name) {
        return Ok(false);
    }
    let key = key(name);
    let (owner, perms) = resolve_slot_perms(store, target, &key)?;
    if !(wizard || progr == owner || perms.read) {
        return Err(Error::Perm);
    }
    let obj = store.deref(target)?;
    Ok(obj.props.get(&key).map(|s| s.is_clear()).unwrap_or(false))
}

/// `property_info(obj, name)` -> `{owner, perms}`. Built-in attributes are
/// not properties and report E_PROPNF.
pub fn property_info(
    store: &Store,
    target: &ObjRef,
    name: &str,
    progr: Objid,
    wizard: bool,
) -> Result<(Objid, PropPerms), Error> {
    if is_builtin_property(name) {
        return Err(Error::PropNf);
    }
    let (owner, perms) = resolve_slot_perms(store, target, &key(name))?;
    if !(wizard || progr == owner || perms.read) {
        return Err(Error::Perm);
    }
    Ok((owner, perms))
}

/// `set_property_info(obj, name, {owner, perms [, new-name]})`.
///
/// Permission changes on a defining site propagate to every descendant
/// slot (owners stay put unless the slot follows 'c'). Renaming is only
/// legal on the defining site.
pub fn set_property_info(
    store: &mut Store,
    target: Objid,
    name: &str,
    new_owner: Objid,
    new_perms: PropPerms,
    new_name: Option<&str>,
    progr: Objid,
    wizard: bool,
) -> Result<(), Error> {
    if is_builtin_property(name) {
        return Err(Error::PropNf);
    }
    let key_old = key(name);
    let obj = store.get(target)?;
    let slot = obj.props.get(&key_old).ok_or(Error::PropNf)?;
    if !(wizard || progr == slot.owner) {
        return Err(Error::Perm);
    }
    let defined_here = slot.defined_here;

    if let Some(new_name) = new_name {
        if !defined_here {
            return Err(Error::InvArg);
        }
        if is_builtin_property(new_name) {
            return Err(Error::InvArg);
        }
        let key_new = key(new_name);
        if key_new != key_old {
            // Same ambiguity rules as add_property.
            let mut chain = store.ancestors(target, true);
            chain.extend(store.descendants(target));
            for o in chain {
                if store
                    .find(o)
                    .map(|o| o.props.contains_key(&key_new))
                    .unwrap_or(false)
                {
                    return Err(Error::InvArg);
                }
            }
            rename_slot(store, target, &key_old, &key_new)?;
            for d in store.descendants(target) {
                let _ = rename_slot(store, d, &key_old, &key_new);
            }
            return apply_info(store, target, &key_new, new_owner, new_perms, defined_here);
        }
    }
    apply_info(store, target, &key_old, new_owner, new_perms, defined_here)
}

fn rename_slot(store: &mut Store, id: Objid, from: &str, to: &str) -> Result<(), Error> {
    let obj = store.get_mut(id)?;
    if let Some(slot) = obj.props.remove(from) {
        obj.props.insert(to.to_string(), slot);
        for n in obj.propdefs.iter_mut() {
            if n == from {
                *n = to.to_string();
            }
        }
    }
    Ok(())
}

fn apply_info(
    store: &mut Store,
    target: Objid,
    key: &str,
    new_owner: Objid,
    new_perms: PropPerms,
    defined_here: bool,
) -> Result<(), Error> {
    {
        let obj = store.get_mut(target)?;
        let slot = obj.props.get_mut(key).ok_or(Error::PropNf)?;
        slot.owner = new_owner;
        slot.perms = new_perms;
    }
    if defined_here {
        for d in store.descendants(target) {
            if let Some(o) = store.find_mut(d) {
                if let Some(slot) = o.props.get_mut(key) {
                    slot.perms = new_perms;
                }
            }
        }
    }
    Ok(())
}

/// `properties(obj)`: the names defined on `obj`, in definition order.
/// Does not enumerate built-in attributes.
pub fn properties(
    store: &Store,
    target: &ObjRef,
    progr: Objid,
    wizard: bool,
) -> Result<Vec<String>, Error> {
    let obj = store.deref(target)?;
    if !(wizard || progr == obj.owner || obj.flags.has(Flags::READ)) {
        return Err(Error::Perm);
    }
    Ok(obj.propdefs.clone())
}
