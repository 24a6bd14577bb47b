//! Verb-table builtins.

use super::{need_args, want_list, want_obj, want_str, BfFn};
use crate::vm::{Activation, Raise, TaskCtx};
use byre_core::{Error, Objid, Var};
use byre_db::verbs;
use byre_db::{ArgSpec, PrepSpec, VerbArgs, VerbPerms};
use std::collections::HashMap;

pub fn register(map: &mut HashMap<&'static str, BfFn>) {
    map.insert("verbs", bf_verbs);
    map.insert("verb_info", bf_verb_info);
    map.insert("set_verb_info", bf_set_verb_info);
    map.insert("verb_args", bf_verb_args);
    map.insert("set_verb_args", bf_set_verb_args);
    map.insert("verb_code", bf_verb_code);
    map.insert("set_verb_code", bf_set_verb_code);
    map.insert("add_verb", bf_add_verb);
    map.insert("delete_verb", bf_delete_verb);
    map.insert("disassemble", bf_disassemble);
}

fn bf_verbs(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let obj = want_obj(&args[0])?;
    let progr = ctx.progr;
    let names = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::verbs(store, obj, progr, wizard)
    })?;
    Ok(Var::list(names.iter().map(|n| Var::str(n)).collect()))
}

fn bf_verb_info(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let obj = want_obj(&args[0])?;
    let progr = ctx.progr;
    let (owner, perms, names) = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::verb_info(store, obj, &args[1], progr, wizard)
    })?;
    Ok(Var::list(vec![
        Var::Obj(owner),
        Var::str(&perms),
        Var::str(&names),
    ]))
}

/// Info: `{owner, perms, names}`.
fn parse_verb_info(info: &Var) -> Result<(Objid, VerbPerms, String), Raise> {
    let items = want_list(info)?;
    if items.len() != 3 {
        return Err(Raise::error(Error::InvArg));
    }
    let owner = want_obj(&items[0])?;
    let perms = VerbPerms::parse(&want_str(&items[1])?.to_string_lossy())?;
    let names = want_str(&items[2])?.to_string_lossy();
    Ok((owner, perms, names))
}

fn bf_set_verb_info(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 3, Some(3))?;
    let obj = want_obj(&args[0])?;
    let (owner, perms, names) = parse_verb_info(&args[2])?;
    let progr = ctx.progr;
    ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::set_verb_info(store, obj, &args[1], owner, perms, names, progr, wizard)
    })?;
    Ok(Var::Int(0))
}

fn bf_verb_args(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let obj = want_obj(&args[0])?;
    let progr = ctx.progr;
    let spec = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::verb_args(store, obj, &args[1], progr, wizard)
    })?;
    Ok(Var::list(vec![
        Var::str(spec.dobj.to_str()),
        Var::str(spec.prep.to_str()),
        Var::str(spec.iobj.to_str()),
    ]))
}

/// Args: `{dobj, prep, iobj}` with a single-token preposition.
fn parse_verb_args(v: &Var) -> Result<VerbArgs, Raise> {
    let items = want_list(v)?;
    if items.len() != 3 {
        return Err(Raise::error(Error::InvArg));
    }
    Ok(VerbArgs {
        dobj: ArgSpec::parse(&want_str(&items[0])?.to_string_lossy())?,
        prep: PrepSpec::parse(&want_str(&items[1])?.to_string_lossy())?,
        iobj: ArgSpec::parse(&want_str(&items[2])?.to_string_lossy())?,
    })
}

fn bf_set_verb_args(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 3, Some(3))?;
    let obj = want_obj(&args[0])?;
    let spec = parse_verb_args(&args[2])?;
    let progr = ctx.progr;
    ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::set_verb_args(store, obj, &args[1], spec, progr, wizard)
    })?;
    Ok(Var::Int(0))
}

fn bf_verb_code(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let obj = want_obj(&args[0])?;
    let progr = ctx.progr;
    let code = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::verb_code(store, obj, &args[1], progr, wizard)
    })?;
    Ok(Var::list(code.iter().map(|l| Var::str(l)).collect()))
}

/// Returns `{}` on success, otherwise the list of compile errors.
fn bf_set_verb_code(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 3, Some(3))?;
    let obj = want_obj(&args[0])?;
    let lines: Vec<String> = want_list(&args[2])?
        .iter()
        .map(|v| match v {
            Var::Str(s) => Ok(s.to_string_lossy()),
            _ => Err(Raise::error(Error::Type)),
        })
        .collect::<Result<_, _>>()?;
    let progr = ctx.progr;
    let problems = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::set_verb_code(store, obj, &args[1], lines, progr, wizard)
    })?;
    Ok(Var::list(problems.iter().map(|p| Var::str(p)).collect()))
}

/// `add_verb(obj, {owner, perms, names}, {dobj, prep, iobj})` -> index.
fn bf_add_verb(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 3, Some(3))?;
    let obj = want_obj(&args[0])?;
    let (owner, perms, names) = parse_verb_info(&args[1])?;
    let spec = parse_verb_args(&args[2])?;
    let progr = ctx.progr;
    let index = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::add_verb(store, obj, owner, perms, names, spec, progr, wizard)
    })?;
    Ok(Var::Int(index as i64))
}

fn bf_delete_verb(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let obj = want_obj(&args[0])?;
    let progr = ctx.progr;
    ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        verbs::delete_verb(store, obj, &args[1], progr, wizard)
    })?;
    Ok(Var::Int(0))
}

/// A pseudo-instruction listing derived from the verb's AST.
fn bf_disassemble(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let obj = want_obj(&args[0])?;
    let progr = ctx.progr;
    let program = ctx.world.with_store(|store| {
        let wizard = crate::vm::is_wizard(store, progr);
        let index = verbs::index_on(store, obj, &args[1])?;
        // Reading the listing needs the same permission as the source.
        verbs::verb_code(store, obj, &args[1], progr, wizard)?;
        verbs::program_for(
            store,
            verbs::VerbLoc {
                definer: obj,
                index,
            },
        )
    })?;
    let listing = byre_compiler::disasm::listing(&program);
    Ok(Var::list(listing.iter().map(|l| Var::str(l)).collect()))
}
