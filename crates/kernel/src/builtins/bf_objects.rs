//! Object lifecycle builtins.
//!
//! The store does the pure mutation; this layer wraps it with quota
//! accounting and the lifecycle verb calls (`initialize`, `recycle`,
//! `accept`, `exitfunc`, `enterfunc`). The store lock is never held across
//! a verb call.

use super::{need_args, want_obj, want_obj_or_list, BfFn};
use crate::vm::{eval, Activation, Raise, TaskCtx};
use byre_core::value::WaifRef;
use byre_core::{Error, Objid, Var, NOTHING};
use byre_db::store::ObjRef;
use byre_db::props;
use std::collections::HashMap;
use std::sync::Arc;

pub fn register(map: &mut HashMap<&'static str, BfFn>) {
    map.insert("create", bf_create);
    map.insert("recreate", bf_recreate);
    map.insert("recycle", bf_recycle);
    map.insert("parent", bf_parent);
    map.insert("parents", bf_parents);
    map.insert("children", bf_children);
    map.insert("ancestors", bf_ancestors);
    map.insert("descendants", bf_descendants);
    map.insert("chparent", bf_chparent);
    map.insert("chparents", bf_chparent);
    map.insert("move", bf_move);
    map.insert("max_object", bf_max_object);
    map.insert("reset_max_object", bf_reset_max_object);
    map.insert("renumber", bf_renumber);
    map.insert("object_bytes", bf_object_bytes);
    map.insert("players", bf_players);
    map.insert("new_waif", bf_new_waif);
}

/// The `ownership_quota` property drives the per-owner object-count quota;
/// owners without the property are unlimited. Wizards bypass.
fn debit_quota(ctx: &mut TaskCtx, owner: Objid, wizard: bool) -> Result<(), Raise> {
    if wizard {
        return Ok(());
    }
    ctx.world.with_store(|store| {
        let target = ObjRef::Obj(owner);
        let quota = match props::resolve(store, &target, "ownership_quota") {
            Ok(found) => found.value,
            Err(_) => return Ok(()),
        };
        let Var::Int(n) = quota else { return Ok(()) };
        if n < 1 {
            return Err(Error::Quota);
        }
        props::set_value(store, &target, "ownership_quota", Var::Int(n - 1), owner, true)
    })?;
    Ok(())
}

fn credit_quota(ctx: &mut TaskCtx, owner: Objid) {
    let _ = ctx.world.with_store(|store| {
        let target = ObjRef::Obj(owner);
        if let Ok(found) = props::resolve(store, &target, "ownership_quota") {
            if let Var::Int(n) = found.value {
                return props::set_value(
                    store,
                    &target,
                    "ownership_quota",
                    Var::Int(n + 1),
                    owner,
                    true,
                );
            }
        }
        Ok(())
    });
}

/// `create(parents [, owner])`, or `create(parents, 1)` for an anonymous
/// object. Creation is atomic in the store; the `initialize` verb runs
/// after, and its failure propagates without undoing the creation.
fn bf_create(ctx: &mut TaskCtx, act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let parents = want_obj_or_list(&args[0])?;
    let progr = ctx.progr;
    let wizard = ctx.wizardly();

    let (owner, anonymous) = match args.get(1) {
        None => (progr, false),
        Some(Var::Obj(o)) => {
            if !wizard && *o != progr {
                return Err(Raise::error(Error::Perm));
            }
            (*o, false)
        }
        Some(v @ (Var::Int(_) | Var::Bool(_))) => (progr, v.is_truthy()),
        Some(_) => return Err(Raise::error(Error::Type)),
    };

    debit_quota(ctx, owner, wizard)?;
    let created = ctx.world.with_store(|store| {
        if anonymous {
            store
                .create_anon(&parents, owner, progr, wizard)
                .map(Var::Anon)
        } else {
            store.create(&parents, owner, progr, wizard).map(Var::Obj)
        }
    });
    let new_obj = match created {
        Ok(v) => v,
        Err(e) => {
            credit_quota(ctx, owner);
            return Err(Raise::error(e));
        }
    };

    // `this = newObj, caller = creator`; errors propagate, the object
    // stays.
    eval::call_verb_if_defined(ctx, act.this.clone(), new_obj.clone(), "initialize", vec![])?;
    Ok(new_obj)
}

fn bf_recreate(ctx: &mut TaskCtx, act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(3))?;
    let id = want_obj(&args[0])?;
    let parents = want_obj_or_list(&args[1])?;
    let progr = ctx.progr;
    let wizard = ctx.wizardly();
    let owner = match args.get(2) {
        None => progr,
        Some(v) => {
            let o = want_obj(v)?;
            if !wizard && o != progr {
                return Err(Raise::error(Error::Perm));
            }
            o
        }
    };
    debit_quota(ctx, owner, wizard)?;
    let created = ctx
        .world
        .with_store(|store| store.recreate(id, &parents, owner, progr, wizard));
    let id = match created {
        Ok(id) => id,
        Err(e) => {
            credit_quota(ctx, owner);
            return Err(Raise::error(e));
        }
    };
    eval::call_verb_if_defined(ctx, act.this.clone(), Var::Obj(id), "initialize", vec![])?;
    Ok(Var::Obj(id))
}

/// `recycle(obj)`: the `recycle` verb runs first, while the object is
/// still intact; then the store tears it down.
fn bf_recycle(ctx: &mut TaskCtx, act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let progr = ctx.progr;
    let wizard = ctx.wizardly();

    match &args[0] {
        Var::Obj(id) => {
            let id = *id;
            let owner = ctx.world.with_store(|store| {
                let obj = store.get(id)?;
                if !(wizard || progr == obj.owner) {
                    return Err(Error::Perm);
                }
                Ok(obj.owner)
            })?;
            // The hook sees the object in its pre-destruction state; hook
            // failures abort the recycle.
            eval::call_verb_if_defined(
                ctx,
                act.this.clone(),
                Var::Obj(id),
                "recycle",
                vec![],
            )?;
            ctx.world.with_store(|store| store.recycle(id))?;
            credit_quota(ctx, owner);
            Ok(Var::Int(0))
        }
        Var::Anon(handle) => {
            let slot = ObjRef::Anon(handle.clone());
            ctx.world.with_store(|store| {
                let obj = store.deref(&slot)?;
                if !(wizard || progr == obj.owner) {
                    return Err(Error::Perm);
                }
                Ok(())
            })?;
            handle.invalidate();
            ctx.world.with_store(|store| store.collect_anons());
            Ok(Var::Int(0))
        }
        _ => Err(Raise::error(Error::Type)),
    }
}

fn bf_parent(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let objref = ObjRef::from_var(&args[0])?;
    let first = ctx.world.with_store(|store| store.ref_parents(&objref))?;
    Ok(Var::Obj(first.first().copied().unwrap_or(NOTHING)))
}

fn bf_parents(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let objref = ObjRef::from_var(&args[0])?;
    let parents = ctx.world.with_store(|store| store.ref_parents(&objref))?;
    Ok(Var::list(parents.into_iter().map(Var::Obj).collect()))
}

fn bf_children(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let id = want_obj(&args[0])?;
    let children = ctx
        .world
        .with_store(|store| store.get(id).map(|o| o.children.clone()))?;
    Ok(Var::list(children.into_iter().map(Var::Obj).collect()))
}

/// `ancestors(obj [, include_self])`: excludes self unless the second
/// argument is truthy.
fn bf_ancestors(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let id = want_obj(&args[0])?;
    let include_self = args.get(1).map(|v| v.is_truthy()).unwrap_or(false);
    let chain = ctx.world.with_store(|store| {
        store.get(id)?;
        Ok::<_, Error>(store.ancestors(id, include_self))
    })?;
    Ok(Var::list(chain.into_iter().map(Var::Obj).collect()))
}

fn bf_descendants(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let id = want_obj(&args[0])?;
    let chain = ctx.world.with_store(|store| {
        store.get(id)?;
        Ok::<_, Error>(store.descendants(id))
    })?;
    Ok(Var::list(chain.into_iter().map(Var::Obj).collect()))
}

/// `chparent(obj, parent)` / `chparents(obj, {parents})`.
fn bf_chparent(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let id = want_obj(&args[0])?;
    let parents = want_obj_or_list(&args[1])?;
    let progr = ctx.progr;
    let wizard = ctx.wizardly();
    ctx.world.with_store(|store| {
        let obj = store.get(id)?;
        if !(wizard || progr == obj.owner) {
            return Err(Error::Perm);
        }
        for &p in &parents {
            let parent = store.get(p).map_err(|_| Error::InvArg)?;
            if !wizard && !parent.is_fertile() && parent.owner != progr {
                return Err(Error::Perm);
            }
        }
        store.chparents(id, &parents)
    })?;
    Ok(Var::Int(0))
}

/// `move(obj, where)`: accept check, transactional containment update,
/// then `exitfunc`/`enterfunc` (whose failures propagate but do not roll
/// the move back).
fn bf_move(ctx: &mut TaskCtx, act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let what = want_obj(&args[0])?;
    let to = want_obj(&args[1])?;
    let progr = ctx.progr;
    let wizard = ctx.wizardly();

    let old = ctx.world.with_store(|store| {
        let obj = store.get(what)?;
        if !(wizard || progr == obj.owner) {
            return Err(Error::Perm);
        }
        if to != NOTHING {
            store.get(to).map_err(|_| Error::InvArg)?;
        }
        Ok(obj.location)
    })?;
    if old == to {
        return Ok(Var::Int(0));
    }

    if to != NOTHING && !wizard {
        let accepted = eval::call_verb_if_defined(
            ctx,
            act.this.clone(),
            Var::Obj(to),
            "accept",
            vec![Var::Obj(what)],
        )?;
        if !accepted.map(|v| v.is_truthy()).unwrap_or(false) {
            return Err(Raise::error(Error::Nacc));
        }
    }

    ctx.world.with_store(|store| store.move_object(what, to))?;

    if old != NOTHING {
        eval::call_verb_if_defined(
            ctx,
            act.this.clone(),
            Var::Obj(old),
            "exitfunc",
            vec![Var::Obj(what)],
        )?;
    }
    if to != NOTHING {
        eval::call_verb_if_defined(
            ctx,
            act.this.clone(),
            Var::Obj(to),
            "enterfunc",
            vec![Var::Obj(what)],
        )?;
    }
    Ok(Var::Int(0))
}

fn bf_max_object(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    Ok(Var::Obj(ctx.world.with_store(|s| s.max_object())))
}

fn bf_reset_max_object(
    ctx: &mut TaskCtx,
    _act: &mut Activation,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    if !ctx.wizardly() {
        return Err(Raise::error(Error::Perm));
    }
    ctx.world.with_store(|s| s.reset_max_object());
    Ok(Var::Int(0))
}

fn bf_renumber(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let id = want_obj(&args[0])?;
    if !ctx.wizardly() {
        return Err(Raise::error(Error::Perm));
    }
    let new_id = ctx.world.with_store(|s| s.renumber(id))?;
    Ok(Var::Obj(new_id))
}

/// A stable structural size estimate: property values, verb source, and a
/// fixed per-object overhead.
fn bf_object_bytes(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let id = want_obj(&args[0])?;
    let bytes = ctx.world.with_store(|store| {
        let obj = store.get(id)?;
        let mut total = 128usize;
        total += obj.name.len();
        for slot in obj.props.values() {
            total += 32;
            if let Some(v) = &slot.value {
                total += v.value_bytes();
            }
        }
        for verb in &obj.verbs {
            total += 64 + verb.names.len();
            total += verb.code.iter().map(|l| l.len() + 1).sum::<usize>();
        }
        Ok::<_, Error>(total as i64)
    })?;
    Ok(Var::Int(bytes))
}

fn bf_players(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    let players = ctx.world.with_store(|s| s.players.clone());
    Ok(Var::list(players.into_iter().map(Var::Obj).collect()))
}

/// `new_waif()`: a lightweight instance classed on the calling verb's
/// `this`, owned by the current programmer.
fn bf_new_waif(ctx: &mut TaskCtx, act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    let Var::Obj(class) = act.this else {
        return Err(Raise::error(Error::InvArg));
    };
    Ok(Var::Waif(Arc::new(WaifRef::new(class, ctx.progr))))
}
