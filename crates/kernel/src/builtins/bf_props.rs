//! Property builtins.

use super::{need_args, want_obj, want_str, BfFn};
use crate::vm::{Activation, Raise, TaskCtx};
use byre_core::{Error, Objid, Var};
use byre_db::props;
use byre_db::store::ObjRef;
use byre_db::PropPerms;
use std::collections::HashMap;

pub fn register(map: &mut HashMap<&'static str, BfFn>) {
    map.insert("properties", bf_properties);
    map.insert("property_info", bf_property_info);
    map.insert("set_property_info", bf_set_property_info);
    map.insert("add_property", bf_add_property);
    map.insert("delete_property", bf_delete_property);
    map.insert("clear_property", bf_clear_property);
    map.insert("is_clear_property", bf_is_clear_property);
}

fn bf_properties(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let objref = ObjRef::from_var(&args[0])?;
    let progr = ctx.progr;
    let names = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        props::properties(store, &objref, progr, wizard)
    })?;
    Ok(Var::list(names.iter().map(|n| Var::str(n)).collect()))
}

fn bf_property_info(
    ctx: &mut TaskCtx,
    _act: &mut Activation,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let objref = ObjRef::from_var(&args[0])?;
    let name = want_str(&args[1])?.to_string_lossy();
    let progr = ctx.progr;
    let (owner, perms) = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        props::property_info(store, &objref, &name, progr, wizard)
    })?;
    Ok(Var::list(vec![
        Var::Obj(owner),
        Var::str(&perms.to_string()),
    ]))
}

/// Info argument: `{owner, perms [, new-name]}`.
fn parse_info(info: &Var) -> Result<(Objid, PropPerms, Option<String>), Raise> {
    let Var::List(items) = info else {
        return Err(Raise::error(Error::Type));
    };
    if items.len() < 2 || items.len() > 3 {
        return Err(Raise::error(Error::InvArg));
    }
    let owner = want_obj(&items[0])?;
    let perms = PropPerms::parse(&want_str(&items[1])?.to_string_lossy())?;
    let new_name = match items.get(2) {
        None => None,
        Some(v) => Some(want_str(v)?.to_string_lossy()),
    };
    Ok((owner, perms, new_name))
}

fn bf_set_property_info(
    ctx: &mut TaskCtx,
    _act: &mut Activation,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    need_args(&args, 3, Some(3))?;
    let obj = want_obj(&args[0])?;
    let name = want_str(&args[1])?.to_string_lossy();
    let (owner, perms, new_name) = parse_info(&args[2])?;
    let progr = ctx.progr;
    ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        props::set_property_info(
            store,
            obj,
            &name,
            owner,
            perms,
            new_name.as_deref(),
            progr,
            wizard,
        )
    })?;
    Ok(Var::Int(0))
}

/// `add_property(obj, name, value, info)` where info is `{owner, perms}`
/// or a bare perms string (owner defaults to the caller).
fn bf_add_property(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 4, Some(4))?;
    let obj = want_obj(&args[0])?;
    let name = want_str(&args[1])?.to_string_lossy();
    let value = args[2].clone();
    let progr = ctx.progr;
    let (owner, perms) = match &args[3] {
        Var::Str(s) => (progr, PropPerms::parse(&s.to_string_lossy())?),
        Var::List(items) if items.len() == 2 => {
            let owner = want_obj(&items[0])?;
            let perms = PropPerms::parse(&want_str(&items[1])?.to_string_lossy())?;
            (owner, perms)
        }
        Var::List(_) => return Err(Raise::error(Error::InvArg)),
        _ => return Err(Raise::error(Error::Type)),
    };
    ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        // Recycled or absent targets are E_INVARG for add_property.
        if !store.is_valid(obj) {
            return Err(Error::InvArg);
        }
        props::add_property(store, obj, &name, value, owner, perms, progr, wizard)
    })?;
    Ok(Var::Int(0))
}

fn bf_delete_property(
    ctx: &mut TaskCtx,
    _act: &mut Activation,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let obj = want_obj(&args[0])?;
    let name = want_str(&args[1])?.to_string_lossy();
    let progr = ctx.progr;
    ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        props::delete_property(store, obj, &name, progr, wizard)
    })?;
    Ok(Var::Int(0))
}

fn bf_clear_property(
    ctx: &mut TaskCtx,
    _act: &mut Activation,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let objref = ObjRef::from_var(&args[0])?;
    let name = want_str(&args[1])?.to_string_lossy();
    let progr = ctx.progr;
    ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        props::clear_property(store, &objref, &name, progr, wizard)
    })?;
    Ok(Var::Int(0))
}

fn bf_is_clear_property(
    ctx: &mut TaskCtx,
    _act: &mut Activation,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let objref = ObjRef::from_var(&args[0])?;
    let name = want_str(&args[1])?.to_string_lossy();
    let progr = ctx.progr;
    let clear = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        props::is_clear_property(store, &objref, &name, progr, wizard)
    })?;
    Ok(Var::Int(clear as i64))
}
