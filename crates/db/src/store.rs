//! The object store
//!
//! A slot vector indexed by object id, plus a separate arena for anonymous
//! objects. Ids are allocated monotonically; recycled ids are not reused by
//! `create` (only by `recreate` and `renumber`). Every operation validates
//! first and mutates second, so a failure leaves no partial effects.
//!
//! Structural changes (recycle, chparent, renumber, property add/delete)
//! invalidate the anonymous children of the changed object and of every
//! descendant, per the anonymous-object lifetime contract.

use crate::object::{Flags, Object, PropertySlot};
use byre_core::value::AnonRef;
use byre_core::{Error, Objid, Var, NOTHING};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Either a persistent object or an anonymous one; property and verb
/// resolution work on both.
#[derive(Debug, Clone)]
pub enum ObjRef {
    Obj(Objid),
    Anon(Arc<AnonRef>),
}

impl ObjRef {
    pub fn from_var(v: &Var) -> Result<ObjRef, Error> {
        match v {
            Var::Obj(o) => Ok(ObjRef::Obj(*o)),
            Var::Anon(a) => Ok(ObjRef::Anon(a.clone())),
            _ => Err(Error::Type),
        }
    }

    pub fn to_var(&self) -> Var {
        match self {
            ObjRef::Obj(o) => Var::Obj(*o),
            ObjRef::Anon(a) => Var::Anon(a.clone()),
        }
    }
}

/// An anonymous object's record and the weak handle that gates its life.
#[derive(Debug)]
pub struct AnonEntry {
    pub object: Object,
    pub handle: Weak<AnonRef>,
}

#[derive(Debug, Default)]
pub struct Store {
    objects: Vec<Option<Object>>,
    anons: Vec<Option<AnonEntry>>,
    free_anons: Vec<usize>,
    /// The player list persisted in snapshots.
    pub players: Vec<Objid>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    /// A minimal world: `#0` the system object and `#1` a wizard player.
    /// Used by `byred --new` and by the test suites.
    pub fn minimal() -> Store {
        let mut store = Store::new();
        let mut system = Object::new(Objid(0));
        system.name = "System Object".to_string();
        system.owner = Objid(1);
        store.objects.push(Some(system));

        let mut wizard = Object::new(Objid(1));
        wizard.name = "Wizard".to_string();
        wizard.owner = Objid(1);
        wizard.flags.set(Flags::PLAYER, true);
        wizard.flags.set(Flags::PROGRAMMER, true);
        wizard.flags.set(Flags::WIZARD, true);
        store.objects.push(Some(wizard));
        store.players.push(Objid(1));
        store
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    /// The high-water mark of allocated ids.
    pub fn max_object(&self) -> Objid {
        Objid(self.objects.len() as i64 - 1)
    }

    pub fn is_valid(&self, id: Objid) -> bool {
        self.find(id).map(|o| !o.is_recycled()).unwrap_or(false)
    }

    pub fn find(&self, id: Objid) -> Option<&Object> {
        if id.0 < 0 {
            return None;
        }
        self.objects.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn find_mut(&mut self, id: Objid) -> Option<&mut Object> {
        if id.0 < 0 {
            return None;
        }
        self.objects.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    /// Dereference for property/verb access; invalid targets are E_INVIND.
    pub fn get(&self, id: Objid) -> Result<&Object, Error> {
        self.find(id)
            .filter(|o| !o.is_recycled())
            .ok_or(Error::InvInd)
    }

    pub fn get_mut(&mut self, id: Objid) -> Result<&mut Object, Error> {
        self.find_mut(id)
            .filter(|o| !o.is_recycled())
            .ok_or(Error::InvInd)
    }

    /// Validity of either kind of object reference, as `valid()` reports.
    pub fn is_valid_ref(&self, r: &ObjRef) -> bool {
        match r {
            ObjRef::Obj(o) => self.is_valid(*o),
            ObjRef::Anon(a) => !a.is_invalid() && self.anon_object(a).is_some(),
        }
    }

    pub fn deref(&self, r: &ObjRef) -> Result<&Object, Error> {
        match r {
            ObjRef::Obj(o) => self.get(*o),
            ObjRef::Anon(a) => {
                if a.is_invalid() {
                    return Err(Error::InvInd);
                }
                self.anon_object(a).ok_or(Error::InvInd)
            }
        }
    }

    pub fn deref_mut(&mut self, r: &ObjRef) -> Result<&mut Object, Error> {
        match r {
            ObjRef::Obj(o) => self.get_mut(*o),
            ObjRef::Anon(a) => {
                if a.is_invalid() {
                    return Err(Error::InvInd);
                }
                let slot = a.slot;
                self.anons
                    .get_mut(slot)
                    .and_then(|e| e.as_mut())
                    .map(|e| &mut e.object)
                    .ok_or(Error::InvInd)
            }
        }
    }

    fn anon_object(&self, a: &AnonRef) -> Option<&Object> {
        self.anons.get(a.slot).and_then(|e| e.as_ref()).map(|e| &e.object)
    }

    // ------------------------------------------------------------------
    // Chain walks
    // ------------------------------------------------------------------

    /// Depth-first, left-to-right, cycle-safe ancestor walk.
    pub fn ancestors(&self, id: Objid, include_self: bool) -> Vec<Objid> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        let start: Vec<Objid> = if include_self {
            vec![id]
        } else {
            self.find(id).map(|o| o.parents.clone()).unwrap_or_default()
        };
        for p in start {
            self.walk_up(p, &mut visited, &mut out);
        }
        out
    }

    fn walk_up(&self, id: Objid, visited: &mut HashSet<Objid>, out: &mut Vec<Objid>) {
        if !visited.insert(id) {
            return;
        }
        if let Some(obj) = self.find(id) {
            out.push(id);
            for p in obj.parents.clone() {
                self.walk_up(p, visited, out);
            }
        }
    }

    /// All descendants, depth-first.
    pub fn descendants(&self, id: Objid) -> Vec<Objid> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        if let Some(obj) = self.find(id) {
            for c in obj.children.clone() {
                self.walk_down(c, &mut visited, &mut out);
            }
        }
        out
    }

    fn walk_down(&self, id: Objid, visited: &mut HashSet<Objid>, out: &mut Vec<Objid>) {
        if !visited.insert(id) {
            return;
        }
        if let Some(obj) = self.find(id) {
            out.push(id);
            for c in obj.children.clone() {
                self.walk_down(c, visited, out);
            }
        }
    }

    /// The ancestor chain of an `ObjRef` (excluding the anon itself, which
    /// has no id), used by property/verb resolution.
    pub fn ref_parents(&self, r: &ObjRef) -> Result<Vec<Objid>, Error> {
        Ok(self.deref(r)?.parents.clone())
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    fn check_parents(
        &self,
        parents: &[Objid],
        progr: Objid,
        wizard: bool,
    ) -> Result<(), Error> {
        if parents.is_empty() {
            return Err(Error::InvArg);
        }
        for &p in parents {
            let obj = self.find(p).filter(|o| !o.is_recycled()).ok_or(Error::InvArg)?;
            if !wizard && !obj.is_fertile() && obj.owner != progr {
                return Err(Error::Perm);
            }
        }
        Ok(())
    }

    /// Clear slots for every property defined anywhere in the ancestor
    /// chain of `parents`. A slot with the 'c' bit takes the new owner.
    fn inherited_slots(&self, parents: &[Objid], new_owner: Objid) -> Vec<(String, PropertySlot)> {
        let mut seen = HashSet::new();
        let mut slots = Vec::new();
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        for &p in parents {
            self.walk_up(p, &mut visited, &mut chain);
        }
        for ancestor in chain {
            let Some(obj) = self.find(ancestor) else { continue };
            for name in &obj.propdefs {
                if !seen.insert(name.clone()) {
                    continue;
                }
                let def = &obj.props[name];
                let owner = if def.perms.chown { new_owner } else { def.owner };
                slots.push((
                    name.clone(),
                    PropertySlot {
                        value: None,
                        owner,
                        perms: def.perms,
                        defined_here: false,
                    },
                ));
            }
        }
        slots
    }

    /// `create(parents, owner)`: allocate `max_object() + 1`.
    pub fn create(
        &mut self,
        parents: &[Objid],
        owner: Objid,
        progr: Objid,
        wizard: bool,
    ) -> Result<Objid, Error> {
        self.check_parents(parents, progr, wizard)?;
        let id = Objid(self.objects.len() as i64);
        let obj = self.fresh_object(id, parents, owner);
        for &p in parents {
            if let Some(parent) = self.find_mut(p) {
                parent.children.push(id);
            }
        }
        self.objects.push(Some(obj));
        debug!(id = id.0, owner = owner.0, "created object");
        Ok(id)
    }

    /// `recreate(id, parents)`: reuse a recycled id in `1..=max_object()`.
    pub fn recreate(
        &mut self,
        id: Objid,
        parents: &[Objid],
        owner: Objid,
        progr: Objid,
        wizard: bool,
    ) -> Result<Objid, Error> {
        let recycled = self
            .find(id)
            .map(|o| o.is_recycled())
            .unwrap_or(false);
        if id.0 < 1 || !recycled {
            return Err(Error::InvArg);
        }
        self.check_parents(parents, progr, wizard)?;
        let obj = self.fresh_object(id, parents, owner);
        for &p in parents {
            if let Some(parent) = self.find_mut(p) {
                parent.children.push(id);
            }
        }
        self.objects[id.0 as usize] = Some(obj);
        Ok(id)
    }

    fn fresh_object(&self, id: Objid, parents: &[Objid], owner: Objid) -> Object {
        let mut obj = Object::new(id);
        obj.owner = owner;
        obj.parents = parents.to_vec();
        for (name, slot) in self.inherited_slots(parents, owner) {
            obj.props.insert(name, slot);
        }
        obj
    }

    /// Anonymous creation: same slot copying, no id, registered on each
    /// parent's back-reference list.
    pub fn create_anon(
        &mut self,
        parents: &[Objid],
        owner: Objid,
        progr: Objid,
        wizard: bool,
    ) -> Result<Arc<AnonRef>, Error> {
        self.check_parents(parents, progr, wizard)?;
        let slot = match self.free_anons.pop() {
            Some(s) => s,
            None => {
                self.anons.push(None);
                self.anons.len() - 1
            }
        };
        let handle = Arc::new(AnonRef::new(slot));
        let mut obj = self.fresh_object(NOTHING, parents, owner);
        obj.flags.set(Flags::ANONYMOUS, true);
        obj.parents = parents.to_vec();
        for &p in parents {
            if let Some(parent) = self.find_mut(p) {
                parent.anon_children.push(Arc::downgrade(&handle));
            }
        }
        self.anons[slot] = Some(AnonEntry {
            object: obj,
            handle: Arc::downgrade(&handle),
        });
        Ok(handle)
    }

    /// Sweep anonymous entries whose last strong handle has been dropped.
    pub fn collect_anons(&mut self) {
        for (i, entry) in self.anons.iter_mut().enumerate() {
            let dead = entry
                .as_ref()
                .map(|e| e.handle.upgrade().is_none())
                .unwrap_or(false);
            if dead {
                *entry = None;
                self.free_anons.push(i);
            }
        }
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// The pure part of `recycle`: the `recycle` verb has already run.
    pub fn recycle(&mut self, id: Objid) -> Result<(), Error> {
        let obj = self.get(id)?;
        let parents = obj.parents.clone();
        let children = obj.children.clone();
        let location = obj.location;

        // Reparent children onto this object's parents, reconciling their
        // property slots against the new chain.
        for child in children {
            self.reparent(child, &parents)?;
            for &p in &parents {
                if let Some(parent) = self.find_mut(p) {
                    if !parent.children.contains(&child) {
                        parent.children.push(child);
                    }
                }
            }
        }

        // Containment: out of wherever it was, and everything inside goes
        // nowhere.
        if location != NOTHING {
            if let Some(loc) = self.find_mut(location) {
                loc.contents.retain(|&o| o != id);
            }
        }
        let contents = self.get(id)?.contents.clone();
        for inside in contents {
            if let Some(o) = self.find_mut(inside) {
                o.location = NOTHING;
            }
        }

        self.structural_change(id);

        for &p in &parents {
            if let Some(parent) = self.find_mut(p) {
                parent.children.retain(|&c| c != id);
            }
        }

        let obj = self.get_mut(id)?;
        obj.parents.clear();
        obj.children.clear();
        obj.contents.clear();
        obj.location = NOTHING;
        obj.props.clear();
        obj.propdefs.clear();
        obj.verbs.clear();
        obj.flags.set(Flags::RECYCLED, true);
        obj.flags.set(Flags::INVALID, true);
        debug!(id = id.0, "recycled object");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reparenting
    // ------------------------------------------------------------------

    /// `chparents`: cycle-checked, slot-reconciling, anon-invalidating.
    pub fn chparents(&mut self, id: Objid, new_parents: &[Objid]) -> Result<(), Error> {
        self.get(id)?;
        for &p in new_parents {
            if p == id || self.descendants(id).contains(&p) {
                return Err(Error::RecMove);
            }
            if !self.is_valid(p) {
                return Err(Error::InvArg);
            }
        }
        let old_parents = self.get(id)?.parents.clone();
        for &p in &old_parents {
            if let Some(parent) = self.find_mut(p) {
                parent.children.retain(|&c| c != id);
            }
        }
        self.reparent(id, new_parents)?;
        for &p in new_parents {
            if let Some(parent) = self.find_mut(p) {
                parent.children.push(id);
            }
        }
        self.structural_change(id);
        Ok(())
    }

    /// Point `id` at `new_parents` and reconcile its property slots: slots
    /// defined by ancestors no longer reachable are dropped; properties
    /// newly reachable arrive as clear slots. Locally-defined slots are
    /// untouched.
    fn reparent(&mut self, id: Objid, new_parents: &[Objid]) -> Result<(), Error> {
        let owner = self.get(id)?.owner;
        let new_chain: HashSet<String> = self
            .inherited_slots(new_parents, owner)
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        let obj = self.get_mut(id)?;
        obj.parents = new_parents.to_vec();
        let to_drop: Vec<String> = obj
            .props
            .iter()
            .filter(|(name, slot)| !slot.defined_here && !new_chain.contains(*name))
            .map(|(name, _)| name.clone())
            .collect();
        for name in to_drop {
            obj.props.remove(&name);
        }

        let fresh = self.inherited_slots(new_parents, owner);
        let obj = self.get_mut(id)?;
        for (name, slot) in fresh {
            if !obj.props.contains_key(&name) {
                obj.props.insert(name, slot);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    /// The pure part of `move`: containment update only; `enterfunc` /
    /// `exitfunc` are the kernel's business. The (location, contents) pair
    /// changes in one step.
    pub fn move_object(&mut self, what: Objid, to: Objid) -> Result<(), Error> {
        self.get(what)?;
        if to != NOTHING {
            self.get(to).map_err(|_| Error::InvArg)?;
            if to == what || self.descendants_by_location(what).contains(&to) {
                return Err(Error::RecMove);
            }
        }
        let old = self.get(what)?.location;
        if old == to {
            return Ok(());
        }
        if old != NOTHING {
            if let Some(o) = self.find_mut(old) {
                o.contents.retain(|&c| c != what);
            }
        }
        if to != NOTHING {
            if let Some(o) = self.find_mut(to) {
                o.contents.push(what);
            }
        }
        let obj = self.get_mut(what)?;
        obj.location = to;
        obj.last_move = now_secs();
        Ok(())
    }

    /// Transitive contents, for the recursive-move check.
    fn descendants_by_location(&self, id: Objid) -> Vec<Objid> {
        let mut out = Vec::new();
        let mut queue = self.find(id).map(|o| o.contents.clone()).unwrap_or_default();
        while let Some(next) = queue.pop() {
            if out.contains(&next) {
                continue;
            }
            out.push(next);
            if let Some(o) = self.find(next) {
                queue.extend(o.contents.iter().copied());
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Renumbering
    // ------------------------------------------------------------------

    /// Move `id` to the lowest recycled id below it, rewriting every
    /// inter-object reference. Property *values* holding old ids are left
    /// alone. Returns the new id (or the old one if nothing lower is
    /// free).
    pub fn renumber(&mut self, id: Objid) -> Result<Objid, Error> {
        self.get(id)?;
        let target = (0..id.0)
            .map(Objid)
            .find(|&c| self.find(c).map(|o| o.is_recycled()).unwrap_or(false));
        let Some(new_id) = target else {
            return Ok(id);
        };
        self.structural_change(id);

        let mut obj = self.objects[id.0 as usize].take().ok_or(Error::InvArg)?;
        obj.id = new_id;
        // Leave a recycled husk at the old slot so max_object stays put.
        let mut husk = Object::new(id);
        husk.flags.set(Flags::RECYCLED, true);
        husk.flags.set(Flags::INVALID, true);
        self.objects[id.0 as usize] = Some(husk);
        self.objects[new_id.0 as usize] = Some(obj);

        for slot in self.objects.iter_mut().flatten() {
            for p in slot.parents.iter_mut() {
                if *p == id {
                    *p = new_id;
                }
            }
            for c in slot.children.iter_mut() {
                if *c == id {
                    *c = new_id;
                }
            }
            for c in slot.contents.iter_mut() {
                if *c == id {
                    *c = new_id;
                }
            }
            if slot.location == id {
                slot.location = new_id;
            }
            if slot.owner == id {
                slot.owner = new_id;
            }
        }
        for p in self.players.iter_mut() {
            if *p == id {
                *p = new_id;
            }
        }
        Ok(new_id)
    }

    /// Trim trailing recycled ids so `max_object()` drops back.
    pub fn reset_max_object(&mut self) {
        while let Some(Some(obj)) = self.objects.last() {
            if obj.is_recycled() {
                self.objects.pop();
            } else {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Anonymous invalidation
    // ------------------------------------------------------------------

    /// A structural change on `id`: invalidate the anonymous children of
    /// `id` and of every descendant (an anon dies when *any* persistent
    /// ancestor changes shape).
    pub fn structural_change(&mut self, id: Objid) {
        let mut targets = self.descendants(id);
        targets.push(id);
        for t in targets {
            if let Some(obj) = self.find_mut(t) {
                obj.invalidate_anon_children();
            }
        }
    }

    /// Raw slot insertion for the snapshot loader.
    pub fn insert_raw(&mut self, obj: Object) {
        let idx = obj.id.0 as usize;
        while self.objects.len() <= idx {
            self.objects.push(None);
        }
        self.objects[idx] = Some(obj);
    }

    pub fn all_objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter().flatten()
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wiz_create(store: &mut Store, parents: &[Objid]) -> Objid {
        store.create(parents, Objid(1), Objid(1), true).unwrap()
    }

    #[test]
    fn create_allocates_monotonically() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        let b = wiz_create(&mut store, &[Objid(0)]);
        assert_eq!(a, Objid(2));
        assert_eq!(b, Objid(3));
        assert_eq!(store.max_object(), Objid(3));
    }

    #[test]
    fn recycled_ids_are_not_reused_by_create() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        store.recycle(a).unwrap();
        let b = wiz_create(&mut store, &[Objid(0)]);
        assert!(b.0 > a.0);
        assert!(!store.is_valid(a));
    }

    #[test]
    fn recreate_requires_a_recycled_id() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        assert_eq!(
            store.recreate(a, &[Objid(0)], Objid(1), Objid(1), true),
            Err(Error::InvArg)
        );
        store.recycle(a).unwrap();
        let again = store
            .recreate(a, &[Objid(1)], Objid(1), Objid(1), true)
            .unwrap();
        assert_eq!(again, a);
        assert_eq!(store.get(a).unwrap().parents, vec![Objid(1)]);
    }

    #[test]
    fn children_and_parents_stay_bidirectional() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        let b = wiz_create(&mut store, &[a]);
        assert!(store.get(a).unwrap().children.contains(&b));
        store.chparents(b, &[Objid(0)]).unwrap();
        assert!(!store.get(a).unwrap().children.contains(&b));
        assert!(store.get(Objid(0)).unwrap().children.contains(&b));
    }

    #[test]
    fn chparents_rejects_cycles() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        let b = wiz_create(&mut store, &[a]);
        let c = wiz_create(&mut store, &[b]);
        assert_eq!(store.chparents(a, &[c]), Err(Error::RecMove));
        assert_eq!(store.chparents(a, &[a]), Err(Error::RecMove));
    }

    #[test]
    fn fertility_is_checked_for_non_wizards() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        // Non-wizard, non-owner, non-fertile parent.
        assert_eq!(
            store.create(&[a], Objid(5), Objid(5), false),
            Err(Error::Perm)
        );
        store.find_mut(a).unwrap().flags.set(Flags::FERTILE, true);
        assert!(store.create(&[a], Objid(5), Objid(5), false).is_ok());
    }

    #[test]
    fn empty_parent_list_is_invarg() {
        let mut store = Store::minimal();
        assert_eq!(store.create(&[], Objid(1), Objid(1), true), Err(Error::InvArg));
    }

    #[test]
    fn move_updates_both_sides() {
        let mut store = Store::minimal();
        let room = wiz_create(&mut store, &[Objid(0)]);
        let thing = wiz_create(&mut store, &[Objid(0)]);
        store.move_object(thing, room).unwrap();
        assert_eq!(store.get(thing).unwrap().location, room);
        assert!(store.get(room).unwrap().contents.contains(&thing));
        store.move_object(thing, NOTHING).unwrap();
        assert!(store.get(room).unwrap().contents.is_empty());
    }

    #[test]
    fn move_rejects_containment_cycles() {
        let mut store = Store::minimal();
        let bag = wiz_create(&mut store, &[Objid(0)]);
        let box_ = wiz_create(&mut store, &[Objid(0)]);
        store.move_object(box_, bag).unwrap();
        assert_eq!(store.move_object(bag, box_), Err(Error::RecMove));
        assert_eq!(store.move_object(bag, bag), Err(Error::RecMove));
    }

    #[test]
    fn recycle_reparents_children() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        let b = wiz_create(&mut store, &[a]);
        store.recycle(a).unwrap();
        assert_eq!(store.get(b).unwrap().parents, vec![Objid(0)]);
        assert!(store.get(Objid(0)).unwrap().children.contains(&b));
        let husk = store.find(a).unwrap();
        assert!(husk.is_recycled());
        assert!(husk.parents.is_empty());
        assert!(husk.props.is_empty());
    }

    #[test]
    fn anon_invalidated_by_ancestor_structural_change() {
        let mut store = Store::minimal();
        let class = wiz_create(&mut store, &[Objid(0)]);
        let sub = wiz_create(&mut store, &[class]);
        let anon = store.create_anon(&[sub], Objid(1), Objid(1), true).unwrap();
        assert!(store.is_valid_ref(&ObjRef::Anon(anon.clone())));
        // Structural change two levels up kills it.
        store.chparents(class, &[Objid(1)]).unwrap();
        assert!(anon.is_invalid());
        assert!(!store.is_valid_ref(&ObjRef::Anon(anon)));
    }

    #[test]
    fn anon_survives_value_only_changes() {
        let mut store = Store::minimal();
        let class = wiz_create(&mut store, &[Objid(0)]);
        let anon = store.create_anon(&[class], Objid(1), Objid(1), true).unwrap();
        store.find_mut(class).unwrap().name = "renamed".into();
        assert!(!anon.is_invalid());
    }

    #[test]
    fn collect_anons_reclaims_dropped_handles() {
        let mut store = Store::minimal();
        let class = wiz_create(&mut store, &[Objid(0)]);
        let anon = store.create_anon(&[class], Objid(1), Objid(1), true).unwrap();
        let slot = anon.slot;
        drop(anon);
        store.collect_anons();
        assert!(store.anons[slot].is_none());
        // The slot is reused by the next anonymous creation.
        let again = store.create_anon(&[class], Objid(1), Objid(1), true).unwrap();
        assert_eq!(again.slot, slot);
    }

    #[test]
    fn renumber_moves_to_lowest_recycled_id() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        let b = wiz_create(&mut store, &[a]);
        store.recycle(a).unwrap();
        let new_id = store.renumber(b).unwrap();
        assert_eq!(new_id, a);
        assert!(store.is_valid(new_id));
        assert_eq!(store.get(new_id).unwrap().parents, vec![Objid(0)]);
        assert!(store.get(Objid(0)).unwrap().children.contains(&new_id));
        // Old slot is a recycled husk.
        assert!(!store.is_valid(b));
    }

    #[test]
    fn reset_max_object_trims_trailing_husks() {
        let mut store = Store::minimal();
        let a = wiz_create(&mut store, &[Objid(0)]);
        let b = wiz_create(&mut store, &[Objid(0)]);
        store.recycle(b).unwrap();
        store.recycle(a).unwrap();
        store.reset_max_object();
        assert_eq!(store.max_object(), Objid(1));
    }

    #[test]
    fn ancestors_depth_first_left_to_right() {
        let mut store = Store::minimal();
        let gp1 = wiz_create(&mut store, &[Objid(0)]);
        let gp2 = wiz_create(&mut store, &[Objid(0)]);
        let p1 = wiz_create(&mut store, &[gp1]);
        let p2 = wiz_create(&mut store, &[gp2]);
        let child = store
            .create(&[p1, p2], Objid(1), Objid(1), true)
            .unwrap();
        assert_eq!(
            store.ancestors(child, false),
            vec![p1, gp1, Objid(0), p2, gp2]
        );
        assert_eq!(
            store.ancestors(child, true)[0],
            child,
            "include_self puts the object first"
        );
    }
}
