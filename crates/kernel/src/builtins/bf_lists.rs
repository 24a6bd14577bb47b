//! List and map builtins. The heavy lifting lives in `byre_core::list` /
//! `byre_core::map`; this layer is argument plumbing and size limits.

use super::{need_args, want_int, BfFn};
use crate::vm::{Activation, Raise, TaskCtx};
use byre_core::{list, map, Error, Var};
use std::collections::HashMap;

pub fn register(map: &mut HashMap<&'static str, BfFn>) {
    map.insert("listappend", bf_listappend);
    map.insert("listinsert", bf_listinsert);
    map.insert("listdelete", bf_listdelete);
    map.insert("listset", bf_listset);
    map.insert("setadd", bf_setadd);
    map.insert("setremove", bf_setremove);
    map.insert("is_member", bf_is_member);
    map.insert("reverse", bf_reverse);
    map.insert("sort", bf_sort);
    map.insert("unique", bf_unique);
    map.insert("mapkeys", bf_mapkeys);
    map.insert("mapvalues", bf_mapvalues);
    map.insert("mapdelete", bf_mapdelete);
    map.insert("maphaskey", bf_maphaskey);
}

fn checked(ctx: &TaskCtx, v: Var) -> Result<Var, Raise> {
    ctx.check_limits(&v)?;
    Ok(v)
}

fn bf_listappend(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(3))?;
    let index = match args.get(2) {
        Some(v) => Some(want_int(v)?),
        None => None,
    };
    let v = list::listappend(args[0].clone(), args[1].clone(), index)?;
    checked(ctx, v)
}

fn bf_listinsert(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(3))?;
    let index = match args.get(2) {
        Some(v) => Some(want_int(v)?),
        None => None,
    };
    let v = list::listinsert(args[0].clone(), args[1].clone(), index)?;
    checked(ctx, v)
}

fn bf_listdelete(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    Ok(list::listdelete(args[0].clone(), want_int(&args[1])?)?)
}

fn bf_listset(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 3, Some(3))?;
    let v = list::index_set(args[0].clone(), &args[2], args[1].clone())?;
    checked(ctx, v)
}

fn bf_setadd(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let v = list::setadd(args[0].clone(), args[1].clone())?;
    checked(ctx, v)
}

fn bf_setremove(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    Ok(list::setremove(args[0].clone(), args[1].clone())?)
}

fn bf_is_member(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    Ok(Var::Int(list::is_member(&args[0], &args[1])?))
}

fn bf_reverse(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    Ok(list::reverse(args[0].clone())?)
}

/// `sort(list [, reverse])` by the cross-type total order.
fn bf_sort(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let reverse = args.get(1).map(|v| v.is_truthy()).unwrap_or(false);
    Ok(list::sort(args[0].clone(), reverse)?)
}

fn bf_unique(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    Ok(list::unique(args[0].clone())?)
}

fn want_map(v: &Var) -> Result<map::Pairs, Raise> {
    match v {
        Var::Map(m) => Ok(m.clone()),
        _ => Err(Raise::error(Error::Type)),
    }
}

fn bf_mapkeys(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    Ok(map::keys(&want_map(&args[0])?))
}

fn bf_mapvalues(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    Ok(map::values(&want_map(&args[0])?))
}

fn bf_mapdelete(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let m = map::delete(want_map(&args[0])?, &args[1])?;
    Ok(Var::Map(m))
}

fn bf_maphaskey(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    Ok(Var::Int(map::contains_key(&want_map(&args[0])?, &args[1]) as i64))
}
